use core::fmt;

use crate::{negotiate::NegotiationState, regs::Status};

/// Failure of a single command issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Response CRC check failed.
    Crc,
    /// No response within the hardware timeout, after every retry.
    Timeout,
    /// Controller status was out of step with the driver.
    BusError,
    /// The command path was still busy with another command.
    ArbitrationLost,
    /// The card answered with error bits set; carries the raw response.
    CardError(u32),
}

impl CommandError {
    /// Whether the bus is in an unknown state and the card must be renegotiated.
    pub fn forces_reset(&self) -> bool {
        matches!(
            self,
            CommandError::BusError | CommandError::ArbitrationLost | CommandError::Timeout
        )
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Crc => write!(f, "response CRC failure"),
            CommandError::Timeout => write!(f, "command timeout"),
            CommandError::BusError => write!(f, "controller status out of sync"),
            CommandError::ArbitrationLost => write!(f, "command path busy"),
            CommandError::CardError(resp) => write!(f, "card reported error {:#010x}", resp),
        }
    }
}

pub type CommandResult<T = ()> = Result<T, CommandError>;

/// Fatal failure of one negotiation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationError {
    Command(NegotiationState, CommandError),
    /// A power rail did not reach the requested voltage (mV).
    PowerRail(u32),
    /// CMD8 echoed a different check pattern.
    InterfaceMismatch(u32),
    /// The card's OCR has no overlap with the host voltage window.
    UnsupportedVoltage(u32),
    /// The card never left the busy state during CMD5/ACMD41.
    OcrTimeout,
    /// CMD13 reported an unexpected card state; carries the raw status.
    CardState(u32),
    /// The CSD structure version is reserved.
    UnsupportedCsd(u8),
    /// The signal-voltage switch did not complete.
    VoltageSwitch,
    /// Neither a memory nor an I/O function is usable.
    NoUsableFunction,
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationError::Command(state, err) => write!(f, "{:?}: {}", state, err),
            NegotiationError::PowerRail(mv) => write!(f, "power rail refused {} mV", mv),
            NegotiationError::InterfaceMismatch(resp) => {
                write!(f, "CMD8 echo mismatch {:#x}", resp)
            }
            NegotiationError::UnsupportedVoltage(ocr) => {
                write!(f, "unsupported voltage window, OCR {:#010x}", ocr)
            }
            NegotiationError::OcrTimeout => write!(f, "card stayed busy"),
            NegotiationError::CardState(status) => {
                write!(f, "unexpected card status {:#010x}", status)
            }
            NegotiationError::UnsupportedCsd(version) => {
                write!(f, "unsupported CSD structure {}", version)
            }
            NegotiationError::VoltageSwitch => write!(f, "1.8V signal switch failed"),
            NegotiationError::NoUsableFunction => write!(f, "no usable card function"),
        }
    }
}

pub type NegotiationResult<T = ()> = Result<T, NegotiationError>;

/// Controller registers captured by the interrupt handler on a data error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataFault {
    pub status: u32,
    pub dcount: u32,
    pub idma_base: u32,
    pub idma_size: u32,
    pub idma_ctrl: u32,
    pub dctrl: u32,
}

impl DataFault {
    pub fn status(&self) -> Status {
        Status::from_bits_retain(self.status)
    }

    pub fn is_crc(&self) -> bool {
        self.status().contains(Status::DCRCFAIL)
    }

    pub fn is_timeout(&self) -> bool {
        self.status().contains(Status::DTIMEOUT)
    }
}

impl fmt::Display for DataFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "STA {:#010x} DCOUNT {:#x} IDMABASE {:#010x} IDMABSIZE {:#x} IDMACTRL {:#x} DCTRL {:#x}",
            self.status, self.dcount, self.idma_base, self.idma_size, self.idma_ctrl, self.dctrl
        )
    }
}

/// The interface could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    /// The platform has no scratch block left to hand out.
    NoScratch,
    /// The scratch block lies outside the DMA master's reach.
    ScratchUnreachable,
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::NoScratch => write!(f, "scratch block already claimed"),
            SetupError::ScratchUnreachable => write!(f, "scratch block not reachable by DMA"),
        }
    }
}

/// Request queue is at capacity; nothing reached the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request queue full")
    }
}

/// Outcome of a block transfer as seen by the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// Malformed request; the hardware was not touched.
    Rejected,
    /// No negotiated card, or the interface was shut down.
    NotReady,
    /// A multi-block buffer the DMA master cannot reach.
    Unaddressable,
    QueueFull,
    Command(CommandError),
    Data(DataFault),
}

impl TransferError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Rejected | TransferError::NotReady | TransferError::Unaddressable => {
                false
            }
            TransferError::QueueFull | TransferError::Data(_) => true,
            TransferError::Command(err) => !matches!(err, CommandError::CardError(_)),
        }
    }
}

impl From<QueueFull> for TransferError {
    fn from(_: QueueFull) -> Self {
        TransferError::QueueFull
    }
}

impl From<CommandError> for TransferError {
    fn from(err: CommandError) -> Self {
        TransferError::Command(err)
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Rejected => write!(f, "request rejected"),
            TransferError::NotReady => write!(f, "card not ready"),
            TransferError::Unaddressable => write!(f, "buffer not reachable by DMA"),
            TransferError::QueueFull => write!(f, "request queue full"),
            TransferError::Command(err) => write!(f, "{}", err),
            TransferError::Data(fault) => write!(f, "data error ({})", fault),
        }
    }
}

pub type TransferResult<T = ()> = Result<T, TransferError>;
