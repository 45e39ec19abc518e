use crate::{constants::*, regs::*};

/// Caller memory for a block transfer.
pub enum DataBuffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl DataBuffer<'_> {
    pub fn is_read(&self) -> bool {
        matches!(self, DataBuffer::Read(_))
    }

    pub fn addr(&self) -> usize {
        match self {
            DataBuffer::Read(buf) => buf.as_ptr() as usize,
            DataBuffer::Write(buf) => buf.as_ptr() as usize,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DataBuffer::Read(buf) => buf.len(),
            DataBuffer::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    None,
    R1,
    R1b,
    R2,
    R3,
    R4,
    R4b,
    R5,
    R6,
    R7,
}

impl ResponseType {
    /// WAITRESP encoding: 0 none, 1 short, 2 short without CRC, 3 long.
    pub fn wait_resp(self) -> u32 {
        match self {
            ResponseType::None => 0,
            ResponseType::R3 | ResponseType::R4 | ResponseType::R4b => 2,
            ResponseType::R2 => 3,
            _ => 1,
        }
    }

    /// The card holds DAT0 low after the response.
    pub fn has_busy(self) -> bool {
        matches!(self, ResponseType::R1b | ResponseType::R4b)
    }

    /// Responses whose CRC field does not cover the payload.
    pub fn ignores_crc(self) -> bool {
        matches!(
            self,
            ResponseType::R2 | ResponseType::R3 | ResponseType::R4 | ResponseType::R4b
        )
    }

    /// Responses that echo the command index.
    pub fn echoes_index(self) -> bool {
        matches!(
            self,
            ResponseType::R1
                | ResponseType::R1b
                | ResponseType::R5
                | ResponseType::R6
                | ResponseType::R7
        )
    }

    /// Responses carrying the 32-bit card status.
    pub fn carries_card_status(self) -> bool {
        matches!(self, ResponseType::R1 | ResponseType::R1b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdCommand {
    pub index: u8,
    pub arg: u32,
    pub resp_type: ResponseType,
    pub ignore_crc: bool,
    /// Error bits in an R1 card status fail the command.
    pub check_status: bool,
    pub data_present: bool,
    pub retries: u32,
}

impl SdCommand {
    pub fn new(index: u8, arg: u32, resp_type: ResponseType) -> Self {
        Self {
            index,
            arg,
            resp_type,
            ignore_crc: resp_type.ignores_crc(),
            check_status: resp_type.carries_card_status(),
            data_present: false,
            retries: SD_CMD_TIMEOUT_RETRIES,
        }
    }

    /// The command starts the data path state machine.
    pub fn with_data(mut self) -> Self {
        self.data_present = true;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn ignore_crc(mut self) -> Self {
        self.ignore_crc = true;
        self
    }

    /// Accepts the response whatever error bits the card status carries.
    pub fn ignore_status(mut self) -> Self {
        self.check_status = false;
        self
    }

    /// Value written to SDMMC_CMD to send this command.
    pub fn cmd_register(&self) -> u32 {
        let mut value = (self.index as u32 & SDMMC_CMD_INDEX_MASK)
            | (self.resp_type.wait_resp() << SDMMC_CMD_WAITRESP_SHIFT)
            | SDMMC_CMD_CPSMEN;
        if self.data_present {
            value |= SDMMC_CMD_CMDTRANS;
        }
        if self.index == SD_STOP_TRANSMISSION {
            value |= SDMMC_CMD_CMDSTOP;
        }
        value
    }
}

/// Response registers, least significant word first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Response {
    pub raw: [u32; 4],
}

impl Response {
    pub fn short(value: u32) -> Self {
        Self {
            raw: [value, 0, 0, 0],
        }
    }

    pub fn as_r1(&self) -> u32 {
        self.raw[0]
    }

    /// CID or CSD; word 3 holds bits 127:96.
    pub fn as_r2(&self) -> [u32; 4] {
        self.raw
    }

    pub fn as_r3(&self) -> u32 {
        self.raw[0]
    }

    pub fn as_r4(&self) -> u32 {
        self.raw[0]
    }

    pub fn as_r5(&self) -> u32 {
        self.raw[0]
    }

    pub fn as_r6(&self) -> u32 {
        self.raw[0]
    }

    pub fn as_r7(&self) -> u32 {
        self.raw[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_resp_widths() {
        assert_eq!(ResponseType::None.wait_resp(), 0);
        assert_eq!(ResponseType::R1.wait_resp(), 1);
        assert_eq!(ResponseType::R1b.wait_resp(), 1);
        assert_eq!(ResponseType::R6.wait_resp(), 1);
        assert_eq!(ResponseType::R3.wait_resp(), 2);
        assert_eq!(ResponseType::R4.wait_resp(), 2);
        assert_eq!(ResponseType::R2.wait_resp(), 3);
    }

    #[test]
    fn crc_ignore_table() {
        assert!(SdCommand::new(SD_ALL_SEND_CID, 0, ResponseType::R2).ignore_crc);
        assert!(SdCommand::new(SD_APP_OP_COND, 0, ResponseType::R3).ignore_crc);
        assert!(SdCommand::new(SDIO_SEND_OP_COND, 0, ResponseType::R4).ignore_crc);
        assert!(!SdCommand::new(SD_SEND_STATUS, 0, ResponseType::R1).ignore_crc);
        assert!(!SdCommand::new(SDIO_RW_DIRECT, 0, ResponseType::R5).ignore_crc);
    }

    #[test]
    fn status_check_follows_response_type() {
        assert!(SdCommand::new(SD_SELECT_CARD, 0, ResponseType::R1b).check_status);
        assert!(!SdCommand::new(SD_SEND_RELATIVE_ADDR, 0, ResponseType::R6).check_status);
        assert!(!SdCommand::new(SD_APP_CMD, 0, ResponseType::R1).ignore_status().check_status);
    }

    #[test]
    fn command_register_encoding() {
        let read = SdCommand::new(SD_READ_MULTIPLE_BLOCK, 100, ResponseType::R1).with_data();
        assert_eq!(
            read.cmd_register(),
            18 | (1 << 8) | SDMMC_CMD_CPSMEN | SDMMC_CMD_CMDTRANS
        );

        let stop = SdCommand::new(SD_STOP_TRANSMISSION, 0, ResponseType::R1b);
        assert_eq!(
            stop.cmd_register(),
            12 | (1 << 8) | SDMMC_CMD_CPSMEN | SDMMC_CMD_CMDSTOP
        );

        let idle = SdCommand::new(SD_GO_IDLE_STATE, 0, ResponseType::None);
        assert_eq!(idle.cmd_register(), SDMMC_CMD_CPSMEN);
    }

    #[test]
    fn data_buffer_variants() {
        let mut block = [0u8; 512];
        let addr = block.as_ptr() as usize;
        let buf = DataBuffer::Read(&mut block);
        assert!(buf.is_read());
        assert_eq!(buf.addr(), addr);
        assert_eq!(buf.len(), 512);
    }
}
