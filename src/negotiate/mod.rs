//! Card bring-up: power cycle to transfer state, one named step at a time.

mod speed;
mod voltage;

use log::{debug, error, info, warn};

use crate::{
    card::{self, CardKind, CardState, CardStatus, SdCsd},
    common::{Response, ResponseType, SdCommand},
    constants::*,
    err::{CommandError, NegotiationError, NegotiationResult},
    host::SdmmcHost,
    osa::Platform,
    regs::*,
};

const OCR_POLL_DELAY_MS: u32 = 1;

/// Steps of card bring-up, in the order they normally run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Controller reset and supply power cycle.
    PowerCycle,
    /// CMD0.
    GoIdle,
    /// CMD8: physical layer 2.00 check.
    InterfaceCondition,
    /// CMD5: I/O functions.
    SdioProbe,
    /// ACMD41 until the memory function leaves busy.
    OperatingCondition,
    /// CMD11 and the 1.8V signalling switch.
    VoltageSwitch,
    /// CID, RCA, CSD and selection.
    Identify,
    /// SCR or CCCR.
    CardRegisters,
    BusWidth,
    BusSpeed,
    Ready,
}

/// What one attempt learns before it can be stored on the card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiationCtx {
    /// The card answered CMD8.
    pub sd_v2: bool,
    /// The card accepted 1.8V signalling.
    pub s18_accepted: bool,
}

impl<P: Platform> SdmmcHost<P> {
    /// Brings the card from power-off to `ready`.
    ///
    /// Nothing from a previous attempt is reused except the memory of a
    /// failed voltage switch.
    pub fn negotiate(&mut self) -> NegotiationResult {
        let mut ctx = NegotiationCtx::default();
        let mut state = NegotiationState::PowerCycle;
        loop {
            debug!("SDMMC{}: {:?}", self.config().iface_id() + 1, state);
            match self.step(state, &mut ctx) {
                Ok(Some(next)) => state = next,
                Ok(None) => return Ok(()),
                Err(err) => {
                    self.shared().set_ready(false);
                    error!(
                        "SDMMC{}: negotiation failed: {}",
                        self.config().iface_id() + 1,
                        err
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Runs one step and names the next, `None` once the card is ready.
    pub fn step(
        &mut self,
        state: NegotiationState,
        ctx: &mut NegotiationCtx,
    ) -> NegotiationResult<Option<NegotiationState>> {
        use NegotiationState::*;

        let next = match state {
            PowerCycle => {
                self.power_cycle()?;
                GoIdle
            }
            GoIdle => {
                let idle = SdCommand::new(SD_GO_IDLE_STATE, 0, ResponseType::None);
                self.negotiation_cmd(state, idle)?;
                InterfaceCondition
            }
            InterfaceCondition => {
                ctx.sd_v2 = self.interface_condition()?;
                SdioProbe
            }
            SdioProbe => {
                self.sdio_probe(ctx)?;
                match self.card().kind {
                    CardKind::Sdio => self.after_ocr(ctx),
                    _ => OperatingCondition,
                }
            }
            OperatingCondition => {
                self.operating_condition(ctx)?;
                self.after_ocr(ctx)
            }
            VoltageSwitch => {
                self.switch_signal_voltage()?;
                Identify
            }
            Identify => {
                self.identify()?;
                CardRegisters
            }
            CardRegisters => {
                self.read_card_registers()?;
                BusWidth
            }
            BusWidth => {
                self.widen_bus()?;
                BusSpeed
            }
            BusSpeed => {
                self.raise_bus_speed()?;
                Ready
            }
            Ready => {
                self.finish();
                return Ok(None);
            }
        };
        Ok(Some(next))
    }

    fn want_1v8(&self) -> bool {
        self.config().signal_1v8() && !self.vswitch_failed()
    }

    fn after_ocr(&self, ctx: &NegotiationCtx) -> NegotiationState {
        if ctx.s18_accepted && self.want_1v8() && !self.card().is_1v8 {
            NegotiationState::VoltageSwitch
        } else {
            NegotiationState::Identify
        }
    }

    fn negotiation_cmd(
        &self,
        state: NegotiationState,
        cmd: SdCommand,
    ) -> NegotiationResult<Response> {
        self.send_command(&cmd)
            .map_err(|err| NegotiationError::Command(state, err))
    }

    fn power_cycle(&mut self) -> NegotiationResult {
        self.forget_card();
        self.platform().reset_controller();

        let regs = self.platform();
        regs.write_reg32(SDMMC_MASK, 0);
        regs.clear_status(Status::STATIC);
        regs.write_reg32(SDMMC_DCTRL, 0);
        regs.write_reg32(SDMMC_IDMACTRL, 0);
        regs.write_reg32(SDMMC_CLKCR, 0);

        self.set_clock(self.config().ident_clock_hz(), false);
        self.set_bus_width(card::BusWidth::One);

        let supply_mv = self.config().supply_mv();
        let io_mv = self.config().default_io_mv();
        let platform = self.platform();

        platform.set_supply_voltage(0);
        if platform.set_io_voltage(io_mv) != io_mv {
            return Err(NegotiationError::PowerRail(io_mv));
        }
        platform.write_reg32(SDMMC_POWER, SDMMC_PWRCTRL_CYCLE);
        platform.delay_ms(SD_POWER_CYCLE_DELAY_MS);

        if platform.set_supply_voltage(supply_mv) != supply_mv {
            return Err(NegotiationError::PowerRail(supply_mv));
        }
        platform.delay_ms(SD_POWER_RAMP_DELAY_MS);

        platform.write_reg32(SDMMC_POWER, SDMMC_PWRCTRL_OFF);
        platform.delay_ms(SD_POWER_CYCLE_DELAY_MS);
        platform.write_reg32(SDMMC_POWER, SDMMC_PWRCTRL_ON);
        platform.delay_ms(SD_POWER_CYCLE_DELAY_MS);

        self.set_data_timeout();
        self.card_mut().is_1v8 = io_mv == SD_VOLTAGE_1V8;
        Ok(())
    }

    /// Returns whether the card speaks physical layer 2.00 or later.
    fn interface_condition(&self) -> NegotiationResult<bool> {
        let cmd =
            SdCommand::new(SD_SEND_IF_COND, SD_IF_COND_ARG, ResponseType::R7).with_retries(1);
        match self.send_command(&cmd) {
            Ok(resp) => {
                let echo = resp.as_r7() & SD_IF_COND_ECHO_MASK;
                if echo != SD_IF_COND_ARG {
                    return Err(NegotiationError::InterfaceMismatch(resp.as_r7()));
                }
                Ok(true)
            }
            Err(CommandError::Timeout) => {
                warn!("no answer to CMD8, assuming a version 1.x card");
                Ok(false)
            }
            Err(err) => Err(NegotiationError::Command(
                NegotiationState::InterfaceCondition,
                err,
            )),
        }
    }

    fn sdio_probe(&mut self, ctx: &mut NegotiationCtx) -> NegotiationResult {
        const STATE: NegotiationState = NegotiationState::SdioProbe;

        let probe = SdCommand::new(SDIO_SEND_OP_COND, 0, ResponseType::R4).with_retries(1);
        match self.send_command(&probe) {
            Ok(_) => {}
            Err(CommandError::Timeout) => {
                debug!("no I/O functions");
                self.card_mut().kind = CardKind::Sd;
                return Ok(());
            }
            Err(err) => return Err(NegotiationError::Command(STATE, err)),
        }

        let mut arg = SD_OCR_VOLTAGE_WINDOW;
        if self.want_1v8() {
            arg |= SD_OCR_S18;
        }

        let mut ocr = None;
        for _ in 0..SDIO_OCR_RETRIES {
            let op_cond = SdCommand::new(SDIO_SEND_OP_COND, arg, ResponseType::R4);
            let resp = self.negotiation_cmd(STATE, op_cond)?;
            if resp.as_r4() & SD_OCR_BUSY != 0 {
                ocr = Some(resp.as_r4());
                break;
            }
            self.platform().delay_ms(OCR_POLL_DELAY_MS);
        }
        let ocr = ocr.ok_or(NegotiationError::OcrTimeout)?;

        let functions = ((ocr >> SDIO_R4_FUNCS_SHIFT) & SDIO_R4_FUNCS_MASK) as u8;
        let memory = ocr & SDIO_R4_MEM_PRESENT != 0;
        ctx.s18_accepted = ocr & SD_OCR_S18 != 0;

        let card = self.card_mut();
        card.ocr = ocr;
        card.sdio_functions = functions;
        card.kind = match (functions, memory) {
            (0, false) => return Err(NegotiationError::NoUsableFunction),
            (0, true) => CardKind::Sd,
            (_, true) => CardKind::Combo,
            (_, false) => CardKind::Sdio,
        };
        info!("SDIO card: {} function(s), memory {}", functions, memory);
        Ok(())
    }

    fn operating_condition(&mut self, ctx: &mut NegotiationCtx) -> NegotiationResult {
        const STATE: NegotiationState = NegotiationState::OperatingCondition;
        let retries = self.config().cmd_retries();

        let inquiry = SdCommand::new(SD_APP_OP_COND, 0, ResponseType::R3).with_retries(retries);
        let ocr = self
            .send_app_command(&inquiry)
            .map_err(|err| NegotiationError::Command(STATE, err))?
            .as_r3();
        if ocr & SD_OCR_VOLTAGE_3V3 == 0 {
            return Err(NegotiationError::UnsupportedVoltage(ocr));
        }

        let mut arg = SD_OCR_VOLTAGE_WINDOW;
        if ctx.sd_v2 {
            arg |= SD_OCR_HCS;
            if self.want_1v8() {
                arg |= SD_OCR_S18;
            }
        }

        let op_cond = SdCommand::new(SD_APP_OP_COND, arg, ResponseType::R3).with_retries(retries);
        let mut ocr = None;
        for _ in 0..SD_ACMD41_RETRIES {
            let resp = self
                .send_app_command(&op_cond)
                .map_err(|err| NegotiationError::Command(STATE, err))?;
            if resp.as_r3() & SD_OCR_BUSY != 0 {
                ocr = Some(resp.as_r3());
                break;
            }
            self.platform().delay_ms(OCR_POLL_DELAY_MS);
        }
        let ocr = ocr.ok_or(NegotiationError::OcrTimeout)?;

        ctx.s18_accepted = arg & SD_OCR_S18 != 0 && ocr & SD_OCR_S18 != 0;
        let card = self.card_mut();
        card.ocr = ocr;
        card.is_hc = ctx.sd_v2 && ocr & SD_OCR_HCS != 0;
        debug!("OCR {:#010x}, high capacity {}", ocr, card.is_hc);
        Ok(())
    }

    fn identify(&mut self) -> NegotiationResult {
        const STATE: NegotiationState = NegotiationState::Identify;
        let memory = self.card().kind.has_memory();
        self.state_mut().card_present = true;

        if memory {
            let all_cid = SdCommand::new(SD_ALL_SEND_CID, 0, ResponseType::R2);
            let cid = self.negotiation_cmd(STATE, all_cid)?;
            self.card_mut().cid = cid.as_r2();
        }

        let r6 = self
            .negotiation_cmd(STATE, SdCommand::new(SD_SEND_RELATIVE_ADDR, 0, ResponseType::R6))?
            .as_r6();
        if r6 & CardStatus::R6_ERRORS != 0 {
            return Err(NegotiationError::Command(STATE, CommandError::CardError(r6)));
        }
        if memory && r6 & CardStatus::READY_FOR_DATA.bits() == 0 {
            return Err(NegotiationError::CardState(r6));
        }
        self.card_mut().rca = r6 & 0xffff_0000;

        self.set_clock(self.config().default_speed_clock_hz(), false);

        let rca = self.card().rca;
        if memory {
            self.expect_card_state(CardState::Stby)?;

            let csd = self
                .negotiation_cmd(STATE, SdCommand::new(SD_SEND_CSD, rca, ResponseType::R2))?
                .as_r2();
            let decoded = SdCsd::from_raw(csd);
            let capacity = decoded
                .capacity_bytes()
                .ok_or(NegotiationError::UnsupportedCsd(decoded.csd_structure))?;
            let card = self.card_mut();
            card.csd = csd;
            card.capacity_bytes = capacity;
        }

        self.negotiation_cmd(STATE, SdCommand::new(SD_SELECT_CARD, rca, ResponseType::R1b))?;

        if memory {
            self.expect_card_state(CardState::Tran)?;
            if !self.card().is_hc {
                self.negotiation_cmd(
                    STATE,
                    SdCommand::new(SD_SET_BLOCKLEN, SD_BLOCK_SIZE as u32, ResponseType::R1),
                )?;
            }
            info!(
                "card {} rca {:#06x}: {} bytes",
                self.card().cid(),
                self.card().rca_value(),
                self.card().capacity_bytes
            );
        } else {
            info!("I/O card rca {:#06x}", self.card().rca_value());
        }
        Ok(())
    }

    fn expect_card_state(&self, expected: CardState) -> NegotiationResult {
        let status = self
            .card_status()
            .map_err(|err| NegotiationError::Command(NegotiationState::Identify, err))?;
        if status.state() != expected {
            return Err(NegotiationError::CardState(status.bits()));
        }
        Ok(())
    }

    fn read_card_registers(&mut self) -> NegotiationResult {
        const STATE: NegotiationState = NegotiationState::CardRegisters;
        let kind = self.card().kind;

        if kind.has_memory() {
            let mut scr = [0u8; SD_SCR_LEN];
            let cmd = SdCommand::new(SD_APP_SEND_SCR, 0, ResponseType::R1);
            self.app_cmd(self.config().cmd_retries())
                .and_then(|_| self.read_polled(cmd, &mut scr))
                .map_err(|err| NegotiationError::Command(STATE, err))?;
            self.card_mut().scr = u64::from_be_bytes(scr);
            debug!("SCR {:#018x}", self.card().scr);
        }

        if kind.has_io() {
            let cccr = self
                .read_cccr_block()
                .map_err(|err| NegotiationError::Command(STATE, err))?;
            self.card_mut().cccr = cccr;
            debug!("CCCR {:02x?}", cccr);
        }
        Ok(())
    }

    fn finish(&mut self) {
        let regs = self.platform();
        regs.set_bits32(SDMMC_CLKCR, SDMMC_CLKCR_HWFC_EN);
        regs.clear_status(Status::STATIC);
        regs.write_reg32(SDMMC_MASK, Status::DATA_IRQ.bits());

        self.shared().set_capacity_bytes(self.card().capacity_bytes);
        self.shared().set_ready(true);
        info!("{}", self);
    }
}

