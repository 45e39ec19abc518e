extern crate alloc;

use alloc::sync::Arc;

use log::debug;

use super::{Completion, Request, Sdmmc};
use crate::{
    common::DataBuffer,
    constants::SD_BLOCK_SIZE,
    err::{TransferError, TransferResult},
    osa::{Platform, is_dma_capable},
};

/// Caller memory as raw pointers, valid for the duration of one call.
#[derive(Clone, Copy)]
enum RawBuffer {
    Read(*mut u8),
    Write(*const u8),
}

impl RawBuffer {
    fn offset(self, bytes: usize) -> Self {
        match self {
            RawBuffer::Read(ptr) => RawBuffer::Read(ptr.wrapping_add(bytes)),
            RawBuffer::Write(ptr) => RawBuffer::Write(ptr.wrapping_add(bytes)),
        }
    }
}

fn whole_blocks(len: usize) -> TransferResult<u32> {
    if len % SD_BLOCK_SIZE != 0 {
        return Err(TransferError::Rejected);
    }
    u32::try_from(len / SD_BLOCK_SIZE).map_err(|_| TransferError::Rejected)
}

impl<P: Platform> Sdmmc<P> {
    /// Transfers `block_count` blocks and waits for the result.
    ///
    /// Buffers the DMA engine can use go out as one request, retried as a
    /// whole. Anything else is split into single blocks, each with its own
    /// `retries` budget, that the worker bounces through DMA-safe memory.
    /// A failure part way leaves the earlier blocks transferred.
    pub fn transfer_sync(
        &self,
        start_block: u64,
        block_count: u32,
        buf: DataBuffer<'_>,
        retries: u32,
    ) -> TransferResult {
        let len = (block_count as usize)
            .checked_mul(SD_BLOCK_SIZE)
            .ok_or(TransferError::Rejected)?;
        if block_count == 0 || buf.len() < len {
            return Err(TransferError::Rejected);
        }

        let addr = buf.addr();
        let raw = match buf {
            DataBuffer::Read(buf) => RawBuffer::Read(buf.as_mut_ptr()),
            DataBuffer::Write(buf) => RawBuffer::Write(buf.as_ptr()),
        };

        if is_dma_capable(&*self.platform, addr, len) {
            return self.with_retries(retries, || {
                self.transfer_once(start_block, block_count, raw)
            });
        }

        debug!(
            "{:#x}+{:#x} not DMA capable, splitting into {} blocks",
            addr, len, block_count
        );
        for i in 0..block_count {
            let block = raw.offset(i as usize * SD_BLOCK_SIZE);
            self.with_retries(retries, || {
                self.transfer_once(start_block + i as u64, 1, block)
            })?;
        }
        Ok(())
    }

    /// Reads `buf.len() / 512` blocks; `buf` must hold whole blocks.
    pub fn read_blocks(&self, start_block: u64, buf: &mut [u8], retries: u32) -> TransferResult {
        let count = whole_blocks(buf.len())?;
        self.transfer_sync(start_block, count, DataBuffer::Read(buf), retries)
    }

    /// Writes `buf.len() / 512` blocks; `buf` must hold whole blocks.
    pub fn write_blocks(&self, start_block: u64, buf: &[u8], retries: u32) -> TransferResult {
        let count = whole_blocks(buf.len())?;
        self.transfer_sync(start_block, count, DataBuffer::Write(buf), retries)
    }

    fn with_retries(
        &self,
        retries: u32,
        mut op: impl FnMut() -> TransferResult,
    ) -> TransferResult {
        let attempts = retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(()) => return Ok(()),
                Err(err) if !err.is_retryable() || attempt >= attempts => return Err(err),
                Err(err) => {
                    debug!("attempt {}/{} failed: {}", attempt, attempts, err);
                    self.platform.yield_now();
                }
            }
        }
    }

    fn transfer_once(&self, start_block: u64, block_count: u32, buf: RawBuffer) -> TransferResult {
        let completion = Arc::new(Completion::new());
        // SAFETY: the caller's buffer outlives this call and we wait for the
        // completion before returning.
        let request = unsafe {
            match buf {
                RawBuffer::Read(ptr) => {
                    Request::read(start_block, block_count, ptr, completion.clone())
                }
                RawBuffer::Write(ptr) => {
                    Request::write(start_block, block_count, ptr, completion.clone())
                }
            }
        };
        self.submit_async(request)?;
        completion.wait(&*self.platform)
    }
}
