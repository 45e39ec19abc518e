use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdScr {
    // SCR Structure [63:60]
    pub scr_structure: u8,
    // SD memory card specification version [59:56]
    pub sd_specification: u8,
    // SCR flags in ScrFlags
    pub flags: ScrFlags,
    // Security specification supported [54:52]
    pub sd_security: u8,
    // Data bus widths supported [51:48]
    pub sd_bus_widths: u8,
    // Extended security support [46:43]
    pub extended_security: u8,
    // Command support bits [33:32] 33-support CMD23, 32-support cmd20
    pub command_support: u8,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ScrFlags: u16 {
        const DATA_STATUS_AFTER_ERASE = 1 << 0; /* Data status after erases [55:55] */
        const SD_SPECIFICATION3 = 1 << 1; /* SD specification 3.00 or higher [47:47] */
    }
}

// SD_BUS_WIDTHS bits
const SCR_BUS_WIDTH_1: u8 = 1 << 0;
const SCR_BUS_WIDTH_4: u8 = 1 << 2;

impl SdScr {
    /// `raw` is the register as read off the bus, most significant byte first.
    pub fn from_raw(raw: u64) -> Self {
        let mut flags = ScrFlags::empty();
        if raw & (1 << 55) != 0 {
            flags |= ScrFlags::DATA_STATUS_AFTER_ERASE;
        }
        if raw & (1 << 47) != 0 {
            flags |= ScrFlags::SD_SPECIFICATION3;
        }

        Self {
            scr_structure: ((raw >> 60) & 0xf) as u8,
            sd_specification: ((raw >> 56) & 0xf) as u8,
            flags,
            sd_security: ((raw >> 52) & 0x7) as u8,
            sd_bus_widths: ((raw >> 48) & 0xf) as u8,
            extended_security: ((raw >> 43) & 0xf) as u8,
            command_support: ((raw >> 32) & 0x3) as u8,
        }
    }

    pub fn supports_4bit(&self) -> bool {
        let both = SCR_BUS_WIDTH_1 | SCR_BUS_WIDTH_4;
        self.sd_bus_widths & both == both
    }

    /// CMD6 exists from physical layer 1.10 on.
    pub fn supports_switch(&self) -> bool {
        self.sd_specification >= 1
    }

    pub fn supports_cmd23(&self) -> bool {
        self.command_support & 0x2 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_v3_card() {
        let scr = SdScr::from_raw(0x0235_8003_0000_0000);
        assert_eq!(scr.scr_structure, 0);
        assert_eq!(scr.sd_specification, 2);
        assert_eq!(scr.sd_security, 3);
        assert_eq!(scr.sd_bus_widths, 5);
        assert!(scr.flags.contains(ScrFlags::SD_SPECIFICATION3));
        assert!(scr.supports_4bit());
        assert!(scr.supports_switch());
        assert!(scr.supports_cmd23());
    }

    #[test]
    fn one_bit_only_card() {
        let scr = SdScr::from_raw(0x0011_0000_0000_0000);
        assert!(!scr.supports_4bit());
        assert!(!scr.supports_switch());
    }
}
