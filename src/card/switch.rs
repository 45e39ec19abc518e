use crate::{constants::SD_SWITCH_STATUS_LEN, tools::extract_bits_be};

/// The 512-bit status block returned by CMD6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchStatus {
    raw: [u8; SD_SWITCH_STATUS_LEN],
}

impl SwitchStatus {
    pub fn from_bytes(raw: [u8; SD_SWITCH_STATUS_LEN]) -> Self {
        Self { raw }
    }

    /// Maximum current for the selected functions, mA [511:496].
    pub fn max_current(&self) -> u16 {
        extract_bits_be(&self.raw, 496, 511) as u16
    }

    /// Functions supported in `group` (1..=6), one bit per function number.
    pub fn support(&self, group: u8) -> u16 {
        let low = 400 + 16 * (group as u32 - 1);
        extract_bits_be(&self.raw, low, low + 15) as u16
    }

    /// Function switched to (or that would be switched to) in `group`;
    /// 0xf means the request could not be honoured.
    pub fn selection(&self, group: u8) -> u8 {
        let low = 376 + 4 * (group as u32 - 1);
        extract_bits_be(&self.raw, low, low + 3) as u8
    }

    pub fn supports(&self, group: u8, function: u8) -> bool {
        self.support(group) & (1 << function) != 0
    }
}
