pub mod cid;
pub mod csd;
pub mod scr;
pub mod switch;

use core::fmt;

use bitflags::bitflags;

pub use cid::SdCid;
pub use csd::{CsdVersion, SdCsd};
pub use scr::SdScr;
pub use switch::SwitchStatus;

use crate::constants::SDIO_CCCR_SIZE;

/// Card state field of the R1 status, bits 12:9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Idle = 0,
    Ready = 1,
    Ident = 2,
    Stby = 3,
    Tran = 4,
    Data = 5,
    Rcv = 6,
    Prg = 7,
    Dis = 8,
    Unknown,
}

impl CardState {
    pub fn from_status(status: u32) -> Self {
        match (status >> 9) & 0xf {
            0 => CardState::Idle,
            1 => CardState::Ready,
            2 => CardState::Ident,
            3 => CardState::Stby,
            4 => CardState::Tran,
            5 => CardState::Data,
            6 => CardState::Rcv,
            7 => CardState::Prg,
            8 => CardState::Dis,
            _ => CardState::Unknown,
        }
    }
}

bitflags! {
    /// R1 card status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CardStatus: u32 {
        const OUT_OF_RANGE = 1 << 31;
        const ADDRESS_ERROR = 1 << 30;
        const BLOCK_LEN_ERROR = 1 << 29;
        const ERASE_SEQ_ERROR = 1 << 28;
        const ERASE_PARAM = 1 << 27;
        const WP_VIOLATION = 1 << 26;
        const CARD_IS_LOCKED = 1 << 25;
        const LOCK_UNLOCK_FAILED = 1 << 24;
        const COM_CRC_ERROR = 1 << 23;
        const ILLEGAL_COMMAND = 1 << 22;
        const CARD_ECC_FAILED = 1 << 21;
        const CC_ERROR = 1 << 20;
        const ERROR = 1 << 19;
        const CSD_OVERWRITE = 1 << 16;
        const WP_ERASE_SKIP = 1 << 15;
        const CARD_ECC_DISABLED = 1 << 14;
        const ERASE_RESET = 1 << 13;
        const READY_FOR_DATA = 1 << 8;
        const FX_EVENT = 1 << 6;
        const APP_CMD = 1 << 5;
        const AKE_SEQ_ERROR = 1 << 3;
    }
}

impl CardStatus {
    pub const ERRORS: CardStatus = CardStatus::OUT_OF_RANGE
        .union(CardStatus::ADDRESS_ERROR)
        .union(CardStatus::BLOCK_LEN_ERROR)
        .union(CardStatus::ERASE_SEQ_ERROR)
        .union(CardStatus::ERASE_PARAM)
        .union(CardStatus::WP_VIOLATION)
        .union(CardStatus::LOCK_UNLOCK_FAILED)
        .union(CardStatus::COM_CRC_ERROR)
        .union(CardStatus::ILLEGAL_COMMAND)
        .union(CardStatus::CARD_ECC_FAILED)
        .union(CardStatus::CC_ERROR)
        .union(CardStatus::ERROR)
        .union(CardStatus::CSD_OVERWRITE)
        .union(CardStatus::AKE_SEQ_ERROR);

    /// Error bits of the shortened status in an R6 response (bits 15:13
    /// carry status bits 23, 22 and 19).
    pub const R6_ERRORS: u32 = 0x7 << 13;

    pub fn state(&self) -> CardState {
        CardState::from_status(self.bits())
    }
}

/// R5 response flags, bits 15:8.
pub const SDIO_R5_ERRORS: u32 = (1 << 15) | (1 << 14) | (1 << 11) | (1 << 9) | (1 << 8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    /// Memory only.
    Sd,
    /// I/O only.
    Sdio,
    /// I/O functions plus a memory function.
    Combo,
}

impl CardKind {
    pub fn has_memory(&self) -> bool {
        matches!(self, CardKind::Sd | CardKind::Combo)
    }

    pub fn has_io(&self) -> bool {
        matches!(self, CardKind::Sdio | CardKind::Combo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    One,
    Four,
}

impl fmt::Display for BusWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusWidth::One => write!(f, "1-bit"),
            BusWidth::Four => write!(f, "4-bit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedMode {
    DefaultSpeed,
    HighSpeed,
    Ddr50,
}

impl fmt::Display for SpeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedMode::DefaultSpeed => write!(f, "default speed"),
            SpeedMode::HighSpeed => write!(f, "high speed"),
            SpeedMode::Ddr50 => write!(f, "DDR50"),
        }
    }
}

/// What negotiation learned about the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardIdentity {
    pub kind: CardKind,
    pub cid: [u32; 4],
    pub csd: [u32; 4],
    pub scr: u64,
    /// Relative card address, already shifted into bits 31:16.
    pub rca: u32,
    pub ocr: u32,
    pub is_hc: bool,
    pub is_1v8: bool,
    pub sdio_functions: u8,
    pub cccr: [u8; SDIO_CCCR_SIZE],
    pub capacity_bytes: u64,
}

impl CardIdentity {
    pub fn new() -> Self {
        Self {
            kind: CardKind::Sd,
            cid: [0; 4],
            csd: [0; 4],
            scr: 0,
            rca: 0,
            ocr: 0,
            is_hc: false,
            is_1v8: false,
            sdio_functions: 0,
            cccr: [0; SDIO_CCCR_SIZE],
            capacity_bytes: 0,
        }
    }

    pub fn cid(&self) -> SdCid {
        SdCid::from_raw(self.cid)
    }

    pub fn csd(&self) -> SdCsd {
        SdCsd::from_raw(self.csd)
    }

    pub fn scr(&self) -> SdScr {
        SdScr::from_raw(self.scr)
    }

    /// RCA as the card reported it.
    pub fn rca_value(&self) -> u16 {
        (self.rca >> 16) as u16
    }

    pub fn capacity_blocks(&self) -> u64 {
        self.capacity_bytes / crate::constants::SD_BLOCK_SIZE as u64
    }
}

impl Default for CardIdentity {
    fn default() -> Self {
        Self::new()
    }
}
