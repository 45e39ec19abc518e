use log::{debug, warn};

use super::SdmmcHost;
use crate::{
    card::{CardState, CardStatus},
    common::{ResponseType, SdCommand},
    constants::*,
    err::{CommandError, CommandResult},
    osa::Platform,
    regs::*,
};

impl<P: Platform> SdmmcHost<P> {
    /// Command argument for `start_block`: block number on high-capacity
    /// cards, byte offset otherwise. `None` if it does not fit.
    pub fn block_address(&self, start_block: u64) -> Option<u32> {
        let unit = if self.card.is_hc {
            1
        } else {
            SD_BLOCK_SIZE as u64
        };
        start_block
            .checked_mul(unit)
            .and_then(|addr| u32::try_from(addr).ok())
    }

    /// Arms the IDMA for `count` blocks at `bus_addr` and sends the read or
    /// write command. Completion is signalled by the interrupt handler.
    pub(crate) fn start_transfer(
        &mut self,
        card_addr: u32,
        count: u32,
        bus_addr: u32,
        read: bool,
    ) -> CommandResult {
        let regs = &*self.platform;
        let dir = if read { SDMMC_DCTRL_DTDIR } else { 0 };

        regs.write_reg32(SDMMC_DCTRL, 0);
        regs.write_reg32(SDMMC_DLEN, count * SD_BLOCK_SIZE as u32);
        regs.write_reg32(
            SDMMC_DCTRL,
            dir | (SD_BLOCK_SIZE_POW << SDMMC_DCTRL_DBLOCKSIZE_SHIFT),
        );
        regs.write_reg32(SDMMC_IDMABASE, bus_addr);
        regs.write_reg32(SDMMC_IDMACTRL, SDMMC_IDMACTRL_IDMAEN);

        let index = match (read, count > 1) {
            (true, false) => SD_READ_SINGLE_BLOCK,
            (true, true) => SD_READ_MULTIPLE_BLOCK,
            (false, false) => SD_WRITE_BLOCK,
            (false, true) => SD_WRITE_MULTIPLE_BLOCK,
        };
        let cmd = SdCommand::new(index, card_addr, ResponseType::R1)
            .with_data()
            .with_retries(self.config.cmd_retries());

        self.state.multi_in_progress = count > 1;
        if let Err(err) = self.send_command(&cmd) {
            self.end_transfer();
            return Err(err);
        }
        Ok(())
    }

    /// Detaches the IDMA and the data path.
    pub(crate) fn end_transfer(&self) {
        self.platform.write_reg32(SDMMC_IDMACTRL, 0);
        self.platform.write_reg32(SDMMC_DCTRL, 0);
    }

    /// Ends an open-ended multi-block transfer with CMD12.
    ///
    /// For writes the card is first polled until its buffer has drained.
    /// The stop is sent whatever the poll reports.
    pub(crate) fn stop_transmission(&mut self, write: bool) -> CommandResult {
        if write {
            self.wait_ready_for_data();
        }

        let cmd = SdCommand::new(SD_STOP_TRANSMISSION, 0, ResponseType::R1b)
            .with_retries(self.config.cmd_retries());
        let result = self.send_command(&cmd).map(|_| ());
        self.state.multi_in_progress = false;

        if let Err(err) = result {
            warn!("CMD12 failed: {}", err);
            if err.forces_reset() {
                self.shared.set_ready(false);
            }
        }
        result
    }

    fn wait_ready_for_data(&self) {
        for _ in 0..SD_STATUS_POLL_RETRIES {
            match self.card_status() {
                Ok(status)
                    if status.state() == CardState::Rcv
                        && status.contains(CardStatus::READY_FOR_DATA) =>
                {
                    return;
                }
                Ok(status) if status.state() != CardState::Rcv => {
                    debug!("card left receive state: {:#010x}", status.bits());
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("status poll before stop failed: {}", err);
                    return;
                }
            }
        }
        warn!("card still busy receiving before stop");
    }

    /// Returns the card to idle and drops both rails.
    pub(crate) fn power_off(&mut self) -> CommandResult {
        self.end_transfer();
        self.platform.write_reg32(SDMMC_MASK, 0);
        let idle = self
            .send_command(&SdCommand::new(SD_GO_IDLE_STATE, 0, ResponseType::None))
            .map(|_| ());
        if let Err(err) = idle {
            warn!("CMD0 before power off failed: {}", err);
        }

        self.platform.write_reg32(SDMMC_POWER, SDMMC_PWRCTRL_OFF);
        self.platform.set_supply_voltage(0);
        self.platform.set_io_voltage(0);
        self.forget_card();
        idle
    }

    /// Takes the card out of service if `err` left the bus in an unknown state.
    pub(crate) fn fail_transfer(&self, err: &CommandError) {
        if err.forces_reset() {
            self.shared.set_ready(false);
        }
    }
}
