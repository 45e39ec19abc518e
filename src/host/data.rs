use log::debug;

use super::SdmmcHost;
use crate::{
    common::SdCommand,
    constants::SDMMC_POLL_LIMIT,
    err::{CommandError, CommandResult},
    osa::Platform,
    regs::*,
};

impl<P: Platform> SdmmcHost<P> {
    /// Runs a short read (SCR, switch status) through the FIFO.
    ///
    /// `buf.len()` must be a power of two and a multiple of 4; it is used as
    /// the block size.
    pub(crate) fn read_polled(&self, cmd: SdCommand, buf: &mut [u8]) -> CommandResult {
        let regs = &*self.platform;
        let block_pow = buf.len().trailing_zeros();

        regs.write_reg32(SDMMC_DCTRL, 0);
        regs.write_reg32(SDMMC_DLEN, buf.len() as u32);
        regs.write_reg32(
            SDMMC_DCTRL,
            SDMMC_DCTRL_DTDIR | (block_pow << SDMMC_DCTRL_DBLOCKSIZE_SHIFT),
        );
        regs.write_reg32(SDMMC_IDMACTRL, 0);

        let result = self
            .send_command(&cmd.with_data())
            .and_then(|_| self.drain_fifo(buf));

        regs.clear_status(Status::DATAEND | Status::DBCKEND | Status::DATA_ERRORS);
        regs.write_reg32(SDMMC_DCTRL, 0);
        if let Err(err) = result {
            debug!("CMD{} data read failed: {}", cmd.index, err);
        }
        result
    }

    fn drain_fifo(&self, buf: &mut [u8]) -> CommandResult {
        let regs = &*self.platform;
        let mut words = buf.chunks_exact_mut(4);

        for _ in 0..SDMMC_POLL_LIMIT {
            let sta = regs.status();
            if sta.contains(Status::DCRCFAIL) {
                return Err(CommandError::Crc);
            }
            if sta.contains(Status::DTIMEOUT) {
                return Err(CommandError::Timeout);
            }
            if sta.contains(Status::RXOVERR) {
                return Err(CommandError::BusError);
            }

            if !sta.contains(Status::RXFIFOE) {
                let word = regs.read_reg32(SDMMC_FIFO);
                if let Some(chunk) = words.next() {
                    chunk.copy_from_slice(&word.to_le_bytes());
                }
                continue;
            }

            if sta.contains(Status::DATAEND) {
                if words.len() != 0 {
                    debug!("data ended {} words early", words.len());
                    return Err(CommandError::BusError);
                }
                return Ok(());
            }
        }
        Err(CommandError::Timeout)
    }
}
