//! Driver for the STM32 SDMMC host controller.
//!
//! One [`Sdmmc`] handle per interface is shared by clients; the matching
//! [`Worker`] runs on a dedicated thread and owns the controller, and the
//! [`IrqHandler`] is called from the interrupt line. Board services (register
//! access, regulators, cache maintenance, DMA address translation, sleeping)
//! come in through [`osa::Platform`].

#![no_std]

extern crate alloc;

pub mod card;
pub mod common;
pub mod config;
pub mod constants;
pub mod err;
pub mod host;
pub mod negotiate;
pub mod osa;
pub mod regs;
pub mod tools;
pub mod transfer;

pub use card::{CardIdentity, CardKind};
pub use common::DataBuffer;
pub use config::SdmmcConfig;
pub use err::{
    CommandError, DataFault, NegotiationError, QueueFull, SetupError, TransferError, TransferResult,
};
pub use host::SdmmcHost;
pub use negotiate::NegotiationState;
pub use transfer::{Completion, IrqHandler, Request, Sdmmc, Worker};
