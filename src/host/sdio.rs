use super::SdmmcHost;
use crate::{
    card::SDIO_R5_ERRORS,
    common::{ResponseType, SdCommand},
    constants::*,
    err::{CommandError, CommandResult},
    osa::Platform,
};

const CMD52_WRITE: u32 = 1 << 31;
const CMD52_FUNC_SHIFT: u32 = 28;
const CMD52_RAW: u32 = 1 << 27;
const CMD52_REG_SHIFT: u32 = 9;
const CMD52_REG_MASK: u32 = 0x1_ffff;

/// CMD52 argument. `write` carries the byte to store.
pub fn cmd52_arg(func: u8, reg: u32, write: Option<u8>, raw: bool) -> u32 {
    let mut arg = ((func as u32 & 0x7) << CMD52_FUNC_SHIFT)
        | ((reg & CMD52_REG_MASK) << CMD52_REG_SHIFT);
    if let Some(data) = write {
        arg |= CMD52_WRITE | data as u32;
        if raw {
            arg |= CMD52_RAW;
        }
    }
    arg
}

impl<P: Platform> SdmmcHost<P> {
    fn io_rw_direct(&self, arg: u32) -> CommandResult<u8> {
        let cmd = SdCommand::new(SDIO_RW_DIRECT, arg, ResponseType::R5)
            .with_retries(self.config.cmd_retries());
        let r5 = self.send_command(&cmd)?.as_r5();
        if r5 & SDIO_R5_ERRORS != 0 {
            return Err(CommandError::CardError(r5));
        }
        Ok(r5 as u8)
    }

    /// Reads one function-0 register.
    pub fn read_cccr(&self, reg: u32) -> CommandResult<u8> {
        self.io_rw_direct(cmd52_arg(0, reg, None, false))
    }

    /// Writes one function-0 register and returns what it reads back as.
    pub fn write_cccr(&self, reg: u32, value: u8) -> CommandResult<u8> {
        self.io_rw_direct(cmd52_arg(0, reg, Some(value), true))
    }

    /// Snapshot of the common control registers.
    pub(crate) fn read_cccr_block(&self) -> CommandResult<[u8; SDIO_CCCR_SIZE]> {
        let mut cccr = [0u8; SDIO_CCCR_SIZE];
        for (reg, byte) in cccr.iter_mut().enumerate() {
            *byte = self.read_cccr(reg as u32)?;
        }
        Ok(cccr)
    }
}
