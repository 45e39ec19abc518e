//! Block requests, from the submitting client to the interrupt handler.

mod client;
mod completion;
mod fallback;
mod irq;
mod queue;
mod worker;

extern crate alloc;

use alloc::sync::Arc;

pub use client::Sdmmc;
pub use completion::{Completion, HwCompletion};
pub use irq::IrqHandler;
pub use queue::RequestQueue;
pub use worker::Worker;

/// A unit of work for the worker.
///
/// Buffers are raw because the caller keeps ownership while the worker and
/// the DMA engine use them; the submitter must keep them alive and untouched
/// until the completion fires.
pub enum Request {
    Read {
        start_block: u64,
        block_count: u32,
        buf: *mut u8,
        completion: Option<Arc<Completion>>,
    },
    Write {
        start_block: u64,
        block_count: u32,
        buf: *const u8,
        completion: Option<Arc<Completion>>,
    },
    /// Park the card and stop renegotiating.
    Shutdown { completion: Option<Arc<Completion>> },
}

// The raw buffers are handed over together with the right to use them.
unsafe impl Send for Request {}

impl Request {
    /// # Safety
    ///
    /// `buf` must be valid for writes of `block_count` blocks until
    /// `completion` is signalled.
    pub unsafe fn read(
        start_block: u64,
        block_count: u32,
        buf: *mut u8,
        completion: Arc<Completion>,
    ) -> Self {
        Request::Read {
            start_block,
            block_count,
            buf,
            completion: Some(completion),
        }
    }

    /// # Safety
    ///
    /// `buf` must be valid for reads of `block_count` blocks until
    /// `completion` is signalled.
    pub unsafe fn write(
        start_block: u64,
        block_count: u32,
        buf: *const u8,
        completion: Arc<Completion>,
    ) -> Self {
        Request::Write {
            start_block,
            block_count,
            buf,
            completion: Some(completion),
        }
    }

    pub fn shutdown(completion: Arc<Completion>) -> Self {
        Request::Shutdown {
            completion: Some(completion),
        }
    }

    pub fn completion(&self) -> Option<&Arc<Completion>> {
        match self {
            Request::Read { completion, .. }
            | Request::Write { completion, .. }
            | Request::Shutdown { completion } => completion.as_ref(),
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Request::Read { .. })
    }
}

impl core::fmt::Debug for Request {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Request::Read {
                start_block,
                block_count,
                buf,
                ..
            } => write!(f, "Read({} +{} -> {:p})", start_block, block_count, *buf),
            Request::Write {
                start_block,
                block_count,
                buf,
                ..
            } => write!(f, "Write({} +{} <- {:p})", start_block, block_count, *buf),
            Request::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}
