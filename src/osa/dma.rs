use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::constants::SD_BLOCK_SIZE;

/// Address translation for the IDMA bus master.
pub trait DmaOps: Send + Sync {
    /// Bus address of `addr`, or `None` when any byte of `addr..addr + len`
    /// is outside what the master can reach.
    fn dma_address(&self, addr: usize, len: usize) -> Option<u32>;

    /// Hands over the block reserved for bouncing buffers the master cannot
    /// use. `None` once it has been claimed.
    fn scratch_block(&self) -> Option<&'static mut ScratchBlock>;
}

/// One block of DMA-reachable memory for buffers the IDMA cannot use.
#[repr(C, align(64))]
pub struct ScratchBlock(pub [u8; SD_BLOCK_SIZE]);

impl ScratchBlock {
    pub const fn new() -> Self {
        Self([0; SD_BLOCK_SIZE])
    }

    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl Default for ScratchBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Statically allocated scratch block, claimable once.
///
/// ```ignore
/// #[unsafe(link_section = ".sram1")]
/// static SDMMC1_SCRATCH: ScratchSlot = ScratchSlot::new();
/// ```
pub struct ScratchSlot {
    block: UnsafeCell<ScratchBlock>,
    claimed: AtomicBool,
}

// SAFETY: the block is only reachable through the single `claim` that wins.
unsafe impl Sync for ScratchSlot {}

impl ScratchSlot {
    pub const fn new() -> Self {
        Self {
            block: UnsafeCell::new(ScratchBlock::new()),
            claimed: AtomicBool::new(false),
        }
    }

    pub fn claim(&'static self) -> Option<&'static mut ScratchBlock> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        // SAFETY: first and only claim.
        Some(unsafe { &mut *self.block.get() })
    }
}

impl Default for ScratchSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// A contiguous CPU range visible to the DMA master at a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaWindow {
    cpu_start: u64,
    size: u64,
    bus_start: u64,
}

impl DmaWindow {
    pub const fn new(cpu_start: usize, size: u64, bus_start: u32) -> Self {
        Self {
            cpu_start: cpu_start as u64,
            size,
            bus_start: bus_start as u64,
        }
    }

    /// The low 4 GiB, identity mapped.
    pub const fn low_4g() -> Self {
        Self::new(0, 1 << 32, 0)
    }

    pub fn contains(&self, addr: usize, len: usize) -> bool {
        let addr = addr as u64;
        addr >= self.cpu_start
            && addr
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.cpu_start + self.size)
    }

    pub fn dma_address(&self, addr: usize, len: usize) -> Option<u32> {
        if !self.contains(addr, len) {
            return None;
        }
        u32::try_from(addr as u64 - self.cpu_start + self.bus_start).ok()
    }
}
