//! One-shot signals between the interrupt handler, the worker and clients.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use kspin::SpinNoIrq;
use log::warn;

use crate::{
    err::{DataFault, TransferResult},
    osa::Osa,
};

/// Slot value while nothing has been signalled.
const HW_PENDING: u32 = 0;
/// Success marker; error payloads are status bits, which never reach bit 31.
const HW_DONE: u32 = 1 << 31;

/// Completion of the data phase, raised from interrupt context.
///
/// The payload is the controller status itself: zero while pending,
/// `HW_DONE` on success, otherwise the error flags. The diagnostic registers
/// are published before the status with release ordering so the worker sees
/// a consistent snapshot once it observes the status.
pub struct HwCompletion {
    state: AtomicU32,
    status: AtomicU32,
    dcount: AtomicU32,
    idma_base: AtomicU32,
    idma_size: AtomicU32,
    idma_ctrl: AtomicU32,
    dctrl: AtomicU32,
}

impl HwCompletion {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(HW_PENDING),
            status: AtomicU32::new(0),
            dcount: AtomicU32::new(0),
            idma_base: AtomicU32::new(0),
            idma_size: AtomicU32::new(0),
            idma_ctrl: AtomicU32::new(0),
            dctrl: AtomicU32::new(0),
        }
    }

    /// Drops anything left over from a previous request.
    pub fn arm(&self) {
        self.state.store(HW_PENDING, Ordering::Release);
    }

    pub fn signal_done<O: Osa + ?Sized>(&self, os: &O) {
        self.state.store(HW_DONE, Ordering::Release);
        os.wake_all(&self.state);
    }

    pub fn signal_fault<O: Osa + ?Sized>(&self, fault: &DataFault, os: &O) {
        self.status.store(fault.status, Ordering::Relaxed);
        self.dcount.store(fault.dcount, Ordering::Relaxed);
        self.idma_base.store(fault.idma_base, Ordering::Relaxed);
        self.idma_size.store(fault.idma_size, Ordering::Relaxed);
        self.idma_ctrl.store(fault.idma_ctrl, Ordering::Relaxed);
        self.dctrl.store(fault.dctrl, Ordering::Relaxed);
        // a fault always carries at least one error flag
        self.state
            .store((fault.status & !HW_DONE).max(1), Ordering::Release);
        os.wake_all(&self.state);
    }

    /// Consumes the signal if one has been raised.
    pub fn take(&self) -> Option<Result<(), DataFault>> {
        match self.state.swap(HW_PENDING, Ordering::Acquire) {
            HW_PENDING => None,
            HW_DONE => Some(Ok(())),
            status => Some(Err(self.fault(status))),
        }
    }

    /// The diagnostic registers from the last fault.
    pub fn last_fault(&self) -> DataFault {
        self.fault(self.status.load(Ordering::Relaxed))
    }

    fn fault(&self, status: u32) -> DataFault {
        DataFault {
            status,
            dcount: self.dcount.load(Ordering::Relaxed),
            idma_base: self.idma_base.load(Ordering::Relaxed),
            idma_size: self.idma_size.load(Ordering::Relaxed),
            idma_ctrl: self.idma_ctrl.load(Ordering::Relaxed),
            dctrl: self.dctrl.load(Ordering::Relaxed),
        }
    }

    /// Blocks until the interrupt handler raises the signal.
    pub fn wait<O: Osa + ?Sized>(&self, os: &O) -> Result<(), DataFault> {
        loop {
            if let Some(result) = self.take() {
                return result;
            }
            os.wait_on(&self.state, HW_PENDING);
        }
    }
}

impl Default for HwCompletion {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request completion shared between the submitter and the worker.
pub struct Completion {
    claimed: AtomicBool,
    /// 0 until the result is stored, then 1.
    done: AtomicU32,
    result: SpinNoIrq<Option<TransferResult>>,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            done: AtomicU32::new(0),
            result: SpinNoIrq::new(None),
        }
    }

    /// Delivers the result and wakes the waiter. Only the first call has any
    /// effect.
    pub fn complete<O: Osa + ?Sized>(&self, result: TransferResult, os: &O) {
        if self.claimed.swap(true, Ordering::AcqRel) {
            warn!("completion signalled twice, dropping {:?}", result);
            return;
        }
        *self.result.lock() = Some(result);
        self.done.store(1, Ordering::Release);
        os.wake_all(&self.done);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire) != 0
    }

    /// The result, if delivered and not yet taken.
    pub fn try_take(&self) -> Option<TransferResult> {
        if !self.is_done() {
            return None;
        }
        self.result.lock().take()
    }

    /// Suspends the caller until the result is delivered.
    pub fn wait<O: Osa + ?Sized>(&self, os: &O) -> TransferResult {
        loop {
            if let Some(result) = self.try_take() {
                return result;
            }
            os.wait_on(&self.done, 0);
        }
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
