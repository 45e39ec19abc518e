//! Services the driver borrows from the kernel and the board.

pub mod cache;
pub mod dma;
pub mod power;

pub use cache::{CACHE_LINE_SIZE, CacheOps, CacheRange};
pub use dma::{DmaOps, DmaWindow, ScratchBlock, ScratchSlot};
pub use power::PowerOps;

use core::sync::atomic::AtomicU32;

use crate::regs::SdmmcRegs;

/// Scheduler primitives.
pub trait Osa: Send + Sync {
    /// Suspends the calling thread for at least `ms` milliseconds.
    fn delay_ms(&self, ms: u32);

    /// Gives up the CPU until other runnable work has had a turn.
    fn yield_now(&self);

    /// Suspends the caller while `word` still holds `expected`.
    ///
    /// May return early; callers recheck their condition. Must not miss a
    /// `wake_all` that follows a change of `word`.
    fn wait_on(&self, word: &AtomicU32, expected: u32);

    /// Resumes every thread suspended in `wait_on` for `word`. Callable from
    /// interrupt context.
    fn wake_all(&self, word: &AtomicU32);
}

/// Everything one SDMMC interface needs from its surroundings.
pub trait Platform: SdmmcRegs + Osa + PowerOps + CacheOps + DmaOps + 'static {}

impl<T> Platform for T where T: SdmmcRegs + Osa + PowerOps + CacheOps + DmaOps + 'static {}

/// `buf` can be handed to the IDMA master as is.
pub fn is_dma_capable<P: DmaOps + ?Sized>(platform: &P, addr: usize, len: usize) -> bool {
    addr % 4 == 0 && platform.dma_address(addr, len).is_some()
}

#[cfg(target_arch = "aarch64")]
pub use board::Stm32Platform;

#[cfg(target_arch = "aarch64")]
mod board {
    use core::sync::atomic::AtomicU32;

    use super::{CacheOps, DmaOps, DmaWindow, Osa, PowerOps, ScratchBlock, ScratchSlot};
    use crate::{
        osa::{cache::DcacheOps, power::SmcPower},
        regs::{MmioRegs, SdmmcRegs},
    };

    /// Memory-mapped controller with SMC-managed rails and `dc` cache
    /// maintenance; the kernel supplies the scheduler.
    pub struct Stm32Platform<O: Osa> {
        regs: MmioRegs,
        dma: DmaWindow,
        scratch: &'static ScratchSlot,
        power: SmcPower,
        cache: DcacheOps,
        os: O,
    }

    impl<O: Osa> Stm32Platform<O> {
        /// `scratch` must live inside `dma`, typically a static placed in
        /// SRAM by the linker script.
        pub fn new(
            regs: MmioRegs,
            dma: DmaWindow,
            scratch: &'static ScratchSlot,
            power: SmcPower,
            os: O,
        ) -> Self {
            Self {
                regs,
                dma,
                scratch,
                power,
                cache: DcacheOps,
                os,
            }
        }
    }

    impl<O: Osa> SdmmcRegs for Stm32Platform<O> {
        fn read_reg32(&self, offset: u32) -> u32 {
            self.regs.read_reg32(offset)
        }

        fn write_reg32(&self, offset: u32, value: u32) {
            self.regs.write_reg32(offset, value)
        }
    }

    impl<O: Osa> Osa for Stm32Platform<O> {
        fn delay_ms(&self, ms: u32) {
            self.os.delay_ms(ms)
        }

        fn yield_now(&self) {
            self.os.yield_now()
        }

        fn wait_on(&self, word: &AtomicU32, expected: u32) {
            self.os.wait_on(word, expected)
        }

        fn wake_all(&self, word: &AtomicU32) {
            self.os.wake_all(word)
        }
    }

    impl<O: Osa> PowerOps for Stm32Platform<O> {
        fn set_supply_voltage(&self, mv: u32) -> u32 {
            self.power.set_supply_voltage(mv)
        }

        fn set_io_voltage(&self, mv: u32) -> u32 {
            self.power.set_io_voltage(mv)
        }
    }

    impl<O: Osa> CacheOps for Stm32Platform<O> {
        fn clean_range(&self, addr: usize, len: usize) {
            self.cache.clean_range(addr, len)
        }

        fn invalidate_range(&self, addr: usize, len: usize) {
            self.cache.invalidate_range(addr, len)
        }
    }

    impl<O: Osa> DmaOps for Stm32Platform<O> {
        fn dma_address(&self, addr: usize, len: usize) -> Option<u32> {
            self.dma.dma_address(addr, len)
        }

        fn scratch_block(&self) -> Option<&'static mut ScratchBlock> {
            self.scratch.claim()
        }
    }
}
