use log::debug;

use super::SdmmcHost;
use crate::{card::BusWidth, constants::SD_CLOCK_HIGH_SPEED, osa::Platform, regs::*};

/// CLKDIV for the fastest card clock not above `target_hz`.
///
/// The controller divides by `2 * CLKDIV`, with 0 meaning no division.
pub fn clock_divider(kernel_hz: u32, target_hz: u32) -> u32 {
    let div = kernel_hz.div_ceil(target_hz.max(1));
    let div = match div {
        0 | 1 => 0,
        d if d % 2 == 1 => d / 2 + 1,
        d => d / 2,
    };
    div.min(SDMMC_CLKCR_CLKDIV_MASK)
}

/// Card clock produced by `div`.
pub fn divided_clock(kernel_hz: u32, div: u32) -> u32 {
    if div == 0 {
        kernel_hz
    } else {
        kernel_hz / (2 * div)
    }
}

/// DDR and BUSSPEED bits for a card clock of `hz`.
pub fn speed_bits(hz: u32, ddr: bool) -> u32 {
    let mut bits = 0;
    if ddr {
        bits |= SDMMC_CLKCR_DDR;
    }
    if ddr || hz >= SD_CLOCK_HIGH_SPEED {
        bits |= SDMMC_CLKCR_BUSSPEED;
    }
    bits
}

impl<P: Platform> SdmmcHost<P> {
    /// Reprograms the card clock, keeping bus width and flow control.
    pub(crate) fn set_clock(&mut self, target_hz: u32, ddr: bool) {
        let kernel = self.config.kernel_clock_hz();
        let div = clock_divider(kernel, target_hz);
        let hz = divided_clock(kernel, div);

        let mut clkcr = self.platform.read_reg32(SDMMC_CLKCR);
        clkcr &= !(SDMMC_CLKCR_CLKDIV_MASK | SDMMC_CLKCR_DDR | SDMMC_CLKCR_BUSSPEED);
        clkcr |= div | speed_bits(hz, ddr);
        self.platform.write_reg32(SDMMC_CLKCR, clkcr);

        self.state.clock_hz = hz;
        self.state.clock_period_ns = 1_000_000_000 / hz.max(1);
        debug!("card clock {} Hz (div {}, target {} Hz)", hz, div, target_hz);

        self.set_data_timeout();
    }

    /// DTIMER counts card clock cycles.
    pub(crate) fn set_data_timeout(&self) {
        let cycles = self.config.data_timeout_ns() * self.state.clock_hz as u64 / 1_000_000_000;
        self.platform
            .write_reg32(SDMMC_DTIMER, cycles.min(u32::MAX as u64) as u32);
    }

    pub(crate) fn set_bus_width(&mut self, width: BusWidth) {
        let bits = match width {
            BusWidth::One => 0,
            BusWidth::Four => SDMMC_CLKCR_WIDBUS_4,
        };
        let clkcr = self.platform.read_reg32(SDMMC_CLKCR) & !SDMMC_CLKCR_WIDBUS_MASK;
        self.platform.write_reg32(SDMMC_CLKCR, clkcr | bits);
        self.state.bus_width = width;
    }
}
