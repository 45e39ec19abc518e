extern crate alloc;

use alloc::sync::Arc;

use log::{debug, error, info, trace, warn};

use super::{Request, RequestQueue};
use crate::{
    constants::SD_BLOCK_SIZE,
    err::{NegotiationResult, TransferError, TransferResult},
    host::SdmmcHost,
    osa::{CacheRange, Platform, ScratchBlock, is_dma_capable},
};

/// Owns the controller and serves the queue, one request at a time.
pub struct Worker<P: Platform> {
    host: SdmmcHost<P>,
    queue: Arc<RequestQueue>,
    scratch: &'static mut ScratchBlock,
    /// Bus address of `scratch`, checked when the interface was built.
    scratch_bus: u32,
}

impl<P: Platform> Worker<P> {
    pub(crate) fn new(
        host: SdmmcHost<P>,
        queue: Arc<RequestQueue>,
        scratch: &'static mut ScratchBlock,
        scratch_bus: u32,
    ) -> Self {
        Self {
            host,
            queue,
            scratch,
            scratch_bus,
        }
    }

    pub fn host(&self) -> &SdmmcHost<P> {
        &self.host
    }

    /// The worker thread's body.
    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
        }
    }

    /// One round: negotiate if needed, otherwise serve at most one request.
    /// Sleeps while the queue is empty.
    pub fn poll(&mut self) {
        if self.host.shared().is_shutdown() {
            let generation = self.queue.generation();
            while let Some(request) = self.queue.pop() {
                self.resolve(request, Err(TransferError::NotReady));
            }
            self.idle(generation);
            return;
        }

        if !self.host.is_ready() {
            if self.negotiate().is_err() {
                self.fail_pending();
                let interval = self.host.config().retry_interval_ms();
                self.host.platform().delay_ms(interval);
            }
            return;
        }

        let generation = self.queue.generation();
        match self.queue.pop() {
            Some(request) => self.service(request),
            None => self.idle(generation),
        }
    }

    /// Blocks until a request is pushed after `generation` was read.
    fn idle(&self, generation: u32) {
        self.host
            .platform()
            .wait_on(self.queue.pushes(), generation);
    }

    pub fn negotiate(&mut self) -> NegotiationResult {
        self.host.negotiate()
    }

    /// Resolves everything queued while there is no card to serve it.
    fn fail_pending(&mut self) {
        while let Some(request) = self.queue.pop() {
            match request {
                Request::Shutdown { .. } => self.service(request),
                request => self.resolve(request, Err(TransferError::NotReady)),
            }
        }
    }

    fn resolve(&self, request: Request, result: TransferResult) {
        match request.completion() {
            Some(completion) => completion.complete(result, self.host.platform()),
            None => warn!("dropping {:?}: no completion", request),
        }
    }

    fn service(&mut self, request: Request) {
        trace!("serving {:?}", request);
        if request.completion().is_none() {
            warn!("dropping {:?}: no completion", request);
            return;
        }

        let result = match request {
            Request::Read {
                start_block,
                block_count,
                buf,
                ..
            } => self.transfer(start_block, block_count, buf as usize, true),
            Request::Write {
                start_block,
                block_count,
                buf,
                ..
            } => self.transfer(start_block, block_count, buf as usize, false),
            Request::Shutdown { .. } => self.shutdown(),
        };
        if let Err(err) = &result {
            debug!("{:?}: {}", request, err);
        }
        self.resolve(request, result);
    }

    fn transfer(&mut self, start_block: u64, count: u32, addr: usize, read: bool) -> TransferResult {
        if count == 0 || addr == 0 {
            return Err(TransferError::Rejected);
        }
        let end = start_block
            .checked_add(count as u64)
            .ok_or(TransferError::Rejected)?;
        if end > self.host.card().capacity_blocks() {
            return Err(TransferError::Rejected);
        }
        let card_addr = self
            .host
            .block_address(start_block)
            .ok_or(TransferError::Rejected)?;

        let len = count as usize * SD_BLOCK_SIZE;
        let platform = self.host.platform();
        if !is_dma_capable(platform, addr, len) {
            if count > 1 {
                return Err(TransferError::Unaddressable);
            }
            return self.bounce(card_addr, addr, read);
        }
        let bus_addr = platform
            .dma_address(addr, len)
            .ok_or(TransferError::Unaddressable)?;

        let range = CacheRange::new(addr, len);
        if read {
            range.before_read(platform);
        } else {
            range.before_write(platform);
        }
        self.run_dma(card_addr, count, bus_addr, read)?;
        if read {
            range.after_read(self.host.platform());
        }
        Ok(())
    }

    /// Single block through the scratch buffer.
    fn bounce(&mut self, card_addr: u32, addr: usize, read: bool) -> TransferResult {
        let scratch = CacheRange::new(self.scratch.addr(), SD_BLOCK_SIZE);
        let bus_addr = self.scratch_bus;
        trace!("bouncing {:#x} through {:#x}", addr, bus_addr);

        if !read {
            // SAFETY: the request's constructor guarantees one readable block.
            let src = unsafe { core::slice::from_raw_parts(addr as *const u8, SD_BLOCK_SIZE) };
            self.scratch.0.copy_from_slice(src);
            scratch.before_write(self.host.platform());
            return self.run_dma(card_addr, 1, bus_addr, false);
        }

        scratch.before_read(self.host.platform());
        self.run_dma(card_addr, 1, bus_addr, true)?;
        scratch.after_read(self.host.platform());

        // SAFETY: the request's constructor guarantees one writable block.
        let dst = unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, SD_BLOCK_SIZE) };
        dst.copy_from_slice(&self.scratch.0);
        CacheRange::new(addr, SD_BLOCK_SIZE).before_write(self.host.platform());
        Ok(())
    }

    /// Starts the transfer and waits for the interrupt handler's verdict.
    fn run_dma(&mut self, card_addr: u32, count: u32, bus_addr: u32, read: bool) -> TransferResult {
        if !self.host.shared().begin_flight() {
            error!("a transfer is already in flight");
            return Err(TransferError::NotReady);
        }
        self.host.shared().hw().arm();

        let mut result = match self.host.start_transfer(card_addr, count, bus_addr, read) {
            Err(err) => {
                self.host.fail_transfer(&err);
                Err(TransferError::Command(err))
            }
            Ok(()) => {
                let done = self.host.shared().hw().wait(self.host.platform());
                self.host.end_transfer();
                done.map_err(|fault| {
                    error!("data error: {}", fault);
                    TransferError::Data(fault)
                })
            }
        };

        if count > 1 {
            let stop = self.host.stop_transmission(!read);
            result = result.and(stop.map_err(TransferError::Command));
        }

        self.host.shared().end_flight();
        result
    }

    fn shutdown(&mut self) -> TransferResult {
        info!("SDMMC{}: shutting down", self.host.config().iface_id() + 1);
        self.host.shared().set_shutdown();
        self.host.power_off()?;
        Ok(())
    }
}
