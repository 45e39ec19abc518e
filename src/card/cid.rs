use core::fmt;

use crate::tools::extract_bits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdCid {
    // Manufacturer ID [127:120]
    pub manufacturer_id: u8,
    // OEM/application ID [119:104]
    pub application_id: u16,
    // Product name [103:64]
    pub product_name: [u8; 5],
    // Product revision [63:56]
    pub product_version: u8,
    // Product serial number [55:24]
    pub serial_number: u32,
    // Manufacturing date [19:8]
    pub manufacturing_date: u16,
}

impl SdCid {
    pub fn from_raw(raw: [u32; 4]) -> Self {
        let mut product_name = [0u8; 5];
        for (i, byte) in product_name.iter_mut().enumerate() {
            let top = 103 - 8 * i as u32;
            *byte = extract_bits(&raw, top - 7, top) as u8;
        }

        Self {
            manufacturer_id: extract_bits(&raw, 120, 127) as u8,
            application_id: extract_bits(&raw, 104, 119) as u16,
            product_name,
            product_version: extract_bits(&raw, 56, 63) as u8,
            serial_number: extract_bits(&raw, 24, 55),
            manufacturing_date: extract_bits(&raw, 8, 19) as u16,
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.product_name).unwrap_or("?????")
    }

    pub fn year(&self) -> u16 {
        2000 + (self.manufacturing_date >> 4)
    }

    pub fn month(&self) -> u8 {
        (self.manufacturing_date & 0xf) as u8
    }
}

impl fmt::Display for SdCid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MID {:#04x} OID {:#06x} {} rev {}.{} SN {:#010x} {:04}-{:02}",
            self.manufacturer_id,
            self.application_id,
            self.name(),
            self.product_version >> 4,
            self.product_version & 0xf,
            self.serial_number,
            self.year(),
            self.month()
        )
    }
}
