extern crate alloc;

use alloc::sync::Arc;

use log::{error, trace};

use super::{Completion, IrqHandler, Request, RequestQueue, Worker};
use crate::{
    config::SdmmcConfig,
    constants::{REQUEST_QUEUE_DEPTH, SD_BLOCK_SIZE},
    err::{DataFault, QueueFull, SetupError, TransferResult},
    host::{SdmmcHost, SharedState},
    osa::Platform,
};

/// Client handle to one SDMMC interface. Cheap to clone.
pub struct Sdmmc<P: Platform> {
    pub(super) platform: Arc<P>,
    shared: Arc<SharedState>,
    queue: Arc<RequestQueue>,
}

impl<P: Platform> Sdmmc<P> {
    /// Builds the interface. The returned worker must be run on its own
    /// thread, and `irq_handler()` wired to the controller's interrupt.
    ///
    /// Claims the platform's scratch block, which the DMA master must reach.
    pub fn new(platform: Arc<P>, config: SdmmcConfig) -> Result<(Self, Worker<P>), SetupError> {
        let scratch = platform.scratch_block().ok_or(SetupError::NoScratch)?;
        let scratch_bus = platform
            .dma_address(scratch.addr(), SD_BLOCK_SIZE)
            .ok_or_else(|| {
                error!("scratch block {:#x} not reachable by DMA", scratch.addr());
                SetupError::ScratchUnreachable
            })?;

        let shared = Arc::new(SharedState::new());
        let queue = Arc::new(RequestQueue::new(REQUEST_QUEUE_DEPTH));
        let host = SdmmcHost::new(platform.clone(), shared.clone(), config);
        let worker = Worker::new(host, queue.clone(), scratch, scratch_bus);
        Ok((
            Self {
                platform,
                shared,
                queue,
            },
            worker,
        ))
    }

    pub fn irq_handler(&self) -> IrqHandler<P> {
        IrqHandler::new(self.platform.clone(), self.shared.clone())
    }

    /// Queues `request` without waiting for it. On `QueueFull` the request
    /// is dropped and its completion never fires.
    pub fn submit_async(&self, request: Request) -> Result<(), QueueFull> {
        self.queue.push(request).map_err(|(err, request)| {
            trace!("queue full, refusing {:?}", request);
            err
        })?;
        self.platform.wake_all(self.queue.pushes());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.shared.capacity_bytes()
    }

    /// Registers captured by the most recent data-error interrupt.
    pub fn last_fault(&self) -> DataFault {
        self.shared.hw().last_fault()
    }

    /// A request has been handed to the hardware and not yet resolved.
    pub fn in_flight(&self) -> bool {
        self.shared.in_flight()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Parks the card and powers it down; later requests fail with
    /// `NotReady`.
    pub fn shutdown(&self) -> TransferResult {
        let completion = Arc::new(Completion::new());
        self.submit_async(Request::shutdown(completion.clone()))?;
        completion.wait(&*self.platform)
    }
}

impl<P: Platform> Clone for Sdmmc<P> {
    fn clone(&self) -> Self {
        Self {
            platform: self.platform.clone(),
            shared: self.shared.clone(),
            queue: self.queue.clone(),
        }
    }
}
