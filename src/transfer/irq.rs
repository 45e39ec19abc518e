extern crate alloc;

use alloc::sync::Arc;

use crate::{err::DataFault, host::SharedState, osa::Platform, regs::*};

/// The SDMMC interrupt line's top half.
///
/// Touches only STA, ICR, the data FIFO reset and the diagnostic registers;
/// everything else belongs to the worker.
pub struct IrqHandler<P: Platform> {
    platform: Arc<P>,
    shared: Arc<SharedState>,
}

impl<P: Platform> IrqHandler<P> {
    pub(crate) fn new(platform: Arc<P>, shared: Arc<SharedState>) -> Self {
        Self { platform, shared }
    }

    /// Returns whether the interrupt was ours.
    pub fn handle(&self) -> bool {
        let regs = &*self.platform;
        let sta = regs.status();

        let errors = sta & Status::DATA_ERRORS;
        if !errors.is_empty() {
            regs.set_bits32(SDMMC_DCTRL, SDMMC_DCTRL_FIFORST);
            let fault = DataFault {
                status: errors.bits(),
                dcount: regs.read_reg32(SDMMC_DCOUNT),
                idma_base: regs.read_reg32(SDMMC_IDMABASE),
                idma_size: regs.read_reg32(SDMMC_IDMABSIZE),
                idma_ctrl: regs.read_reg32(SDMMC_IDMACTRL),
                dctrl: regs.read_reg32(SDMMC_DCTRL),
            };
            self.shared.set_ready(false);
            regs.clear_status(sta & Status::DATA_IRQ);
            self.shared.hw().signal_fault(&fault, regs);
            return true;
        }

        if sta.contains(Status::DATAEND) {
            regs.clear_status(Status::DATAEND);
            self.shared.hw().signal_done(regs);
            return true;
        }

        false
    }
}

impl<P: Platform> Clone for IrqHandler<P> {
    fn clone(&self) -> Self {
        Self {
            platform: self.platform.clone(),
            shared: self.shared.clone(),
        }
    }
}
