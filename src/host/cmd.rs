use core::hint::spin_loop;

use log::{debug, trace, warn};

use super::SdmmcHost;
use crate::{
    card::CardStatus,
    common::{Response, ResponseType, SdCommand},
    constants::*,
    err::{CommandError, CommandResult},
    osa::Platform,
    regs::*,
};

/// Outcome of a single issuance on the CMD line.
enum Attempt {
    Done(Response),
    /// CTIMEOUT: the card did not answer, worth another try.
    NoResponse,
}

impl<P: Platform> SdmmcHost<P> {
    /// Sends `cmd` and returns its response.
    ///
    /// Missing responses are retried up to `cmd.retries` times with a linear
    /// backoff; every other failure is returned at once.
    pub fn send_command(&self, cmd: &SdCommand) -> CommandResult<Response> {
        let attempts = cmd.retries.max(1);
        for attempt in 0..attempts {
            match self.issue(cmd)? {
                Attempt::Done(resp) => return Ok(resp),
                Attempt::NoResponse => {
                    trace!("CMD{}: no response ({}/{})", cmd.index, attempt + 1, attempts);
                    if attempt + 1 < attempts {
                        self.platform.delay_ms((attempt + 1) * SD_CMD_BACKOFF_MS);
                    }
                }
            }
        }
        debug!("CMD{} arg {:#x}: timeout", cmd.index, cmd.arg);
        Err(CommandError::Timeout)
    }

    /// CMD55 followed by `cmd`.
    pub fn send_app_command(&self, cmd: &SdCommand) -> CommandResult<Response> {
        self.app_cmd(cmd.retries)?;
        self.send_command(cmd)
    }

    /// CMD55: the next command is application specific.
    ///
    /// Only APP_CMD matters here. The status may still report an error from
    /// an earlier command the card rejected, such as CMD5 on a memory card.
    pub(crate) fn app_cmd(&self, retries: u32) -> CommandResult {
        let app = SdCommand::new(SD_APP_CMD, self.card.rca, ResponseType::R1)
            .with_retries(retries)
            .ignore_status();
        let resp = self.send_command(&app)?;
        if !CardStatus::from_bits_retain(resp.as_r1()).contains(CardStatus::APP_CMD) {
            warn!("CMD55 not acknowledged: {:#010x}", resp.as_r1());
            return Err(CommandError::CardError(resp.as_r1()));
        }
        Ok(())
    }

    /// CMD13 for the selected card.
    pub fn card_status(&self) -> CommandResult<CardStatus> {
        let cmd = SdCommand::new(SD_SEND_STATUS, self.card.rca, ResponseType::R1)
            .with_retries(self.config.cmd_retries());
        let resp = self.send_command(&cmd)?;
        Ok(CardStatus::from_bits_retain(resp.as_r1()))
    }

    fn issue(&self, cmd: &SdCommand) -> CommandResult<Attempt> {
        let regs = &*self.platform;

        let sta = regs.status();
        if sta.intersects(Status::CMD_PENDING) {
            warn!(
                "CMD{}: unhandled status {:#010x}",
                cmd.index,
                (sta & Status::CMD_PENDING).bits()
            );
            return Err(CommandError::BusError);
        }
        if sta.contains(Status::CPSMACT) {
            return Err(CommandError::ArbitrationLost);
        }

        trace!(
            "CMD{} arg {:#010x} {:?} cmdr {:#x}",
            cmd.index,
            cmd.arg,
            cmd.resp_type,
            cmd.cmd_register()
        );
        regs.write_reg32(SDMMC_ARG, cmd.arg);
        regs.write_reg32(SDMMC_CMD, cmd.cmd_register());

        if cmd.resp_type == ResponseType::None {
            self.wait_status(Status::CMDSENT)?;
            regs.clear_status(Status::CMDSENT);
            return Ok(Attempt::Done(Response::default()));
        }

        let sta = self.wait_status(Status::CMDREND | Status::CCRCFAIL | Status::CTIMEOUT)?;
        if sta.contains(Status::CTIMEOUT) {
            regs.clear_status(Status::CTIMEOUT);
            return Ok(Attempt::NoResponse);
        }
        if sta.contains(Status::CCRCFAIL) && !cmd.ignore_crc {
            regs.clear_status(Status::CCRCFAIL);
            return Err(CommandError::Crc);
        }

        if cmd.resp_type.has_busy() {
            let busy = if sta.contains(Status::BUSYD0) {
                self.wait_busy_end()
            } else {
                Ok(())
            };
            regs.clear_status(Status::BUSYD0END);
            if let Err(err) = busy {
                regs.clear_status(Status::CMDREND | Status::CCRCFAIL);
                return Err(err);
            }
        }

        let mut resp = Response::default();
        if cmd.resp_type == ResponseType::R2 {
            for i in 0..4 {
                resp.raw[3 - i] = regs.read_reg32(sdmmc_resp(i as u32));
            }
        } else {
            resp.raw[0] = regs.read_reg32(SDMMC_RESP1);
        }
        let resp_cmd = regs.read_reg32(SDMMC_RESPCMD) & SDMMC_CMD_INDEX_MASK;
        regs.clear_status(Status::CMDREND | Status::CCRCFAIL);

        if cmd.resp_type.echoes_index() && resp_cmd != cmd.index as u32 {
            warn!("CMD{}: response for CMD{}", cmd.index, resp_cmd);
            return Err(CommandError::BusError);
        }
        if cmd.check_status
            && CardStatus::from_bits_retain(resp.as_r1()).intersects(CardStatus::ERRORS)
        {
            debug!("CMD{}: card status {:#010x}", cmd.index, resp.as_r1());
            return Err(CommandError::CardError(resp.as_r1()));
        }

        Ok(Attempt::Done(resp))
    }

    /// Holds until DAT0 is released after an R1b/R4b response.
    fn wait_busy_end(&self) -> CommandResult {
        let sta = self.wait_status(Status::BUSYD0END | Status::DTIMEOUT)?;
        if sta.contains(Status::DTIMEOUT) {
            self.platform.clear_status(Status::DTIMEOUT);
            return Err(CommandError::Timeout);
        }
        Ok(())
    }

    /// Polls STA until any of `flags` is raised.
    pub(crate) fn wait_status(&self, flags: Status) -> CommandResult<Status> {
        for _ in 0..SDMMC_POLL_LIMIT {
            let sta = self.platform.status();
            if sta.intersects(flags) {
                return Ok(sta);
            }
            spin_loop();
        }
        warn!("STA never raised {:#x}", flags.bits());
        Err(CommandError::Timeout)
    }
}
