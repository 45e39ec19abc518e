use log::{debug, info, warn};

use super::NegotiationState;
use crate::{
    card::{BusWidth, CardKind, SpeedMode, SwitchStatus},
    common::{ResponseType, SdCommand},
    constants::*,
    err::{CommandResult, NegotiationError, NegotiationResult},
    host::SdmmcHost,
    osa::Platform,
};

impl<P: Platform> SdmmcHost<P> {
    pub(super) fn widen_bus(&mut self) -> NegotiationResult {
        const STATE: NegotiationState = NegotiationState::BusWidth;
        let kind = self.card().kind;

        let memory_ok = !kind.has_memory() || self.card().scr().supports_4bit();
        let caps = self.card().cccr[SDIO_CCCR_CAPS as usize];
        let io_ok = !kind.has_io() || caps & SDIO_CAPS_LSC == 0 || caps & SDIO_CAPS_4BLS != 0;
        if !(memory_ok && io_ok) {
            debug!("staying on a 1-bit bus");
            return Ok(());
        }

        if kind.has_memory() {
            let cmd = SdCommand::new(SD_APP_SET_BUS_WIDTH, SD_BUS_WIDTH_4_ARG, ResponseType::R1)
                .with_retries(self.config().cmd_retries());
            self.send_app_command(&cmd)
                .map_err(|err| NegotiationError::Command(STATE, err))?;
        }
        if kind.has_io() {
            self.set_io_bus_width()
                .map_err(|err| NegotiationError::Command(STATE, err))?;
        }

        self.set_bus_width(BusWidth::Four);
        Ok(())
    }

    fn set_io_bus_width(&mut self) -> CommandResult {
        let bus_if = self.card().cccr[SDIO_CCCR_BUS_IF as usize];
        let value = (bus_if & !SDIO_BUS_WIDTH_MASK) | SDIO_BUS_WIDTH_4;
        let stored = self.write_cccr(SDIO_CCCR_BUS_IF, value)?;
        self.card_mut().cccr[SDIO_CCCR_BUS_IF as usize] = stored;
        Ok(())
    }

    pub(super) fn raise_bus_speed(&mut self) -> NegotiationResult {
        if !self.config().high_speed() {
            return Ok(());
        }
        match self.card().kind {
            CardKind::Sdio => self.raise_io_speed(),
            CardKind::Sd | CardKind::Combo => self.raise_memory_speed(),
        }
    }

    fn raise_memory_speed(&mut self) -> NegotiationResult {
        const STATE: NegotiationState = NegotiationState::BusSpeed;
        if !self.card().scr().supports_switch() {
            debug!("card predates CMD6");
            return Ok(());
        }

        let caps = self
            .switch_function(SD_SWITCH_INQUIRY)
            .map_err(|err| NegotiationError::Command(STATE, err))?;

        let (arg, function, mode) = if self.card().is_1v8
            && caps.supports(1, SD_FG1_DDR50)
            && caps.supports(4, SD_FG4_1W44)
        {
            (SD_SWITCH_DDR50, SD_FG1_DDR50, SpeedMode::Ddr50)
        } else if caps.supports(1, SD_FG1_HIGH_SPEED) {
            (SD_SWITCH_HIGH_SPEED, SD_FG1_HIGH_SPEED, SpeedMode::HighSpeed)
        } else {
            info!("no faster access mode offered ({:#06x})", caps.support(1));
            return Ok(());
        };

        let switched = self
            .switch_function(arg)
            .map_err(|err| NegotiationError::Command(STATE, err))?;
        if switched.selection(1) != function {
            warn!(
                "card refused {} (selected {:#x}), keeping default speed",
                mode,
                switched.selection(1)
            );
            return Ok(());
        }

        self.set_clock(self.config().high_speed_clock_hz(), mode == SpeedMode::Ddr50);
        self.state_mut().speed_mode = mode;
        Ok(())
    }

    /// CMD6 in inquiry or commit mode.
    fn switch_function(&self, arg: u32) -> CommandResult<SwitchStatus> {
        let mut raw = [0u8; SD_SWITCH_STATUS_LEN];
        let cmd = SdCommand::new(SD_SWITCH_FUNC, arg, ResponseType::R1)
            .with_retries(self.config().cmd_retries());
        self.read_polled(cmd, &mut raw)?;
        Ok(SwitchStatus::from_bytes(raw))
    }

    fn raise_io_speed(&mut self) -> NegotiationResult {
        const STATE: NegotiationState = NegotiationState::BusSpeed;
        let speed = self.card().cccr[SDIO_CCCR_SPEED as usize];
        if speed & SDIO_SPEED_SHS == 0 {
            debug!("I/O card has no high-speed mode");
            return Ok(());
        }

        let stored = self
            .write_cccr(SDIO_CCCR_SPEED, speed | SDIO_SPEED_EHS)
            .map_err(|err| NegotiationError::Command(STATE, err))?;
        self.card_mut().cccr[SDIO_CCCR_SPEED as usize] = stored;
        if stored & SDIO_SPEED_EHS == 0 {
            warn!("I/O card did not enable high speed");
            return Ok(());
        }

        self.set_clock(self.config().high_speed_clock_hz(), false);
        self.state_mut().speed_mode = SpeedMode::HighSpeed;
        Ok(())
    }
}
