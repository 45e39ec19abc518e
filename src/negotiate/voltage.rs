use log::{info, warn};

use crate::{
    common::{ResponseType, SdCommand},
    constants::*,
    err::{NegotiationError, NegotiationResult},
    host::SdmmcHost,
    osa::Platform,
    regs::*,
};

impl<P: Platform> SdmmcHost<P> {
    /// CMD11 and the regulator change to 1.8V signalling.
    ///
    /// Any failure disables the switch until the host is recreated.
    pub(super) fn switch_signal_voltage(&mut self) -> NegotiationResult {
        let result = self.try_switch_signal_voltage();
        if let Err(err) = result {
            self.set_vswitch_failed();
            self.platform()
                .clear_bits32(SDMMC_POWER, SDMMC_POWER_VSWITCH | SDMMC_POWER_VSWITCHEN);
            warn!("{}, staying at 3.3V signalling", err);
        }
        result
    }

    fn try_switch_signal_voltage(&mut self) -> NegotiationResult {
        let regs = self.platform();
        regs.set_bits32(SDMMC_POWER, SDMMC_POWER_VSWITCHEN);

        let cmd = SdCommand::new(SD_VOLTAGE_SWITCH, 0, ResponseType::R1).with_retries(1);
        if let Err(err) = self.send_command(&cmd) {
            warn!("CMD11: {}", err);
            return Err(NegotiationError::VoltageSwitch);
        }

        // the card stops the clock and holds DAT0 low
        self.wait_status(Status::CKSTOP)
            .map_err(|_| NegotiationError::VoltageSwitch)?;
        regs.clear_status(Status::CKSTOP);
        if !regs.status().contains(Status::BUSYD0) {
            warn!("DAT0 high after CMD11");
            return Err(NegotiationError::VoltageSwitch);
        }

        let mv = regs.set_io_voltage(SD_VOLTAGE_1V8);
        if mv != SD_VOLTAGE_1V8 {
            warn!("I/O rail reached {} mV", mv);
            return Err(NegotiationError::VoltageSwitch);
        }
        regs.delay_ms(SD_VSWITCH_SETTLE_MS);

        regs.set_bits32(SDMMC_POWER, SDMMC_POWER_VSWITCH);
        self.wait_status(Status::VSWEND)
            .map_err(|_| NegotiationError::VoltageSwitch)?;
        regs.clear_status(Status::VSWEND);
        if regs.status().contains(Status::BUSYD0) {
            warn!("DAT0 still low after the switch");
            return Err(NegotiationError::VoltageSwitch);
        }

        regs.clear_bits32(SDMMC_POWER, SDMMC_POWER_VSWITCH | SDMMC_POWER_VSWITCHEN);
        self.card_mut().is_1v8 = true;
        info!("switched to 1.8V signalling");
        Ok(())
    }
}

