use crate::tools::{align_down, align_up};

pub const CACHE_LINE_SIZE: usize = 64;

/// Data-cache maintenance by virtual address.
pub trait CacheOps: Send + Sync {
    /// Writes dirty lines covering the range back to memory.
    fn clean_range(&self, addr: usize, len: usize);

    /// Discards lines covering the range.
    fn invalidate_range(&self, addr: usize, len: usize);
}

/// The cache lines a buffer touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRange {
    addr: usize,
    len: usize,
}

impl CacheRange {
    pub fn new(addr: usize, len: usize) -> Self {
        Self { addr, len }
    }

    /// First byte of the first line touched.
    pub fn line_start(&self) -> usize {
        align_down(self.addr, CACHE_LINE_SIZE)
    }

    /// One past the last byte of the last line touched.
    pub fn line_end(&self) -> usize {
        align_up(self.addr + self.len, CACHE_LINE_SIZE)
    }

    pub fn line_len(&self) -> usize {
        self.line_end() - self.line_start()
    }

    /// Lines shared with bytes outside the buffer, at most one at each end.
    pub fn partial_lines(&self) -> impl Iterator<Item = usize> {
        let end = self.addr + self.len;
        let head = (self.len > 0 && self.addr % CACHE_LINE_SIZE != 0)
            .then(|| align_down(self.addr, CACHE_LINE_SIZE));
        let tail = (self.len > 0 && end % CACHE_LINE_SIZE != 0)
            .then(|| align_down(end, CACHE_LINE_SIZE))
            .filter(|line| Some(*line) != head);
        head.into_iter().chain(tail)
    }

    /// Prepares the lines for a device-to-memory transfer.
    ///
    /// Only lines shared with neighbouring data are cleaned: dirty bytes there
    /// would otherwise be lost by the invalidate that follows the transfer.
    pub fn before_read<C: CacheOps + ?Sized>(&self, cache: &C) {
        for line in self.partial_lines() {
            cache.clean_range(line, CACHE_LINE_SIZE);
        }
    }

    pub fn after_read<C: CacheOps + ?Sized>(&self, cache: &C) {
        cache.invalidate_range(self.line_start(), self.line_len());
    }

    pub fn before_write<C: CacheOps + ?Sized>(&self, cache: &C) {
        cache.clean_range(self.line_start(), self.line_len());
    }
}

#[cfg(target_arch = "aarch64")]
pub use dcache::DcacheOps;

#[cfg(target_arch = "aarch64")]
mod dcache {
    use aarch64_cpu::asm::barrier;

    use super::{CACHE_LINE_SIZE, CacheOps, CacheRange};

    /// Point-of-coherency maintenance with `dc cvac` / `dc ivac`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DcacheOps;

    impl CacheOps for DcacheOps {
        fn clean_range(&self, addr: usize, len: usize) {
            let range = CacheRange::new(addr, len);
            for line in (range.line_start()..range.line_end()).step_by(CACHE_LINE_SIZE) {
                unsafe { core::arch::asm!("dc cvac, {0}", in(reg) line) };
            }
            barrier::dsb(barrier::SY);
        }

        fn invalidate_range(&self, addr: usize, len: usize) {
            let range = CacheRange::new(addr, len);
            for line in (range.line_start()..range.line_end()).step_by(CACHE_LINE_SIZE) {
                unsafe { core::arch::asm!("dc ivac, {0}", in(reg) line) };
            }
            barrier::dsb(barrier::SY);
        }
    }
}
