//! Card-specific data and the capacity it encodes.

use bitflags::bitflags;

use crate::tools::extract_bits;

/// CSD_STRUCTURE [127:126].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsdVersion {
    /// Standard capacity, size from C_SIZE, C_SIZE_MULT and READ_BL_LEN.
    V1,
    /// High/extended capacity, 22-bit C_SIZE in 512 KiB units.
    V2,
    /// Ultra capacity, 28-bit C_SIZE in 512 KiB units.
    V3,
}

impl CsdVersion {
    pub fn from_structure(structure: u8) -> Option<Self> {
        match structure {
            0 => Some(CsdVersion::V1),
            1 => Some(CsdVersion::V2),
            2 => Some(CsdVersion::V3),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CsdFlags: u16 {
        const READ_BLOCK_PARTIAL = 1 << 0;              /* Partial blocks for read allowed [79:79] */
        const WRITE_BLOCK_MISALIGN = 1 << 1;            /* Write block misalignment [78:78] */
        const READ_BLOCK_MISALIGN = 1 << 2;             /* Read block misalignment [77:77] */
        const DSR_IMPLEMENTED = 1 << 3;                 /* DSR implemented [76:76] */
        const ERASE_BLOCK_ENABLED = 1 << 4;             /* Erase single block enabled [46:46] */
        const WRITE_PROTECT_GROUP_ENABLED = 1 << 5;     /* Write protect group enabled [31:31] */
        const WRITE_BLOCK_PARTIAL = 1 << 6;             /* Partial blocks for write allowed [21:21] */
        const FILE_FORMAT_GROUP = 1 << 7;               /* File format group [15:15] */
        const COPY = 1 << 8;                            /* Copy flag [14:14] */
        const PERMANENT_WRITE_PROTECT = 1 << 9;         /* Permanent write protection [13:13] */
        const TEMPORARY_WRITE_PROTECT = 1 << 10;        /* Temporary write protection [12:12] */
    }
}

const CSD_FLAG_BITS: [(u32, CsdFlags); 11] = [
    (79, CsdFlags::READ_BLOCK_PARTIAL),
    (78, CsdFlags::WRITE_BLOCK_MISALIGN),
    (77, CsdFlags::READ_BLOCK_MISALIGN),
    (76, CsdFlags::DSR_IMPLEMENTED),
    (46, CsdFlags::ERASE_BLOCK_ENABLED),
    (31, CsdFlags::WRITE_PROTECT_GROUP_ENABLED),
    (21, CsdFlags::WRITE_BLOCK_PARTIAL),
    (15, CsdFlags::FILE_FORMAT_GROUP),
    (14, CsdFlags::COPY),
    (13, CsdFlags::PERMANENT_WRITE_PROTECT),
    (12, CsdFlags::TEMPORARY_WRITE_PROTECT),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdCsd {
    raw: [u32; 4],
    pub csd_structure: u8,
    pub transfer_speed: u8,
    pub card_command_classes: u16,
    pub read_block_length: u8,
    pub flags: CsdFlags,
    pub device_size: u32,
    pub device_size_multiplier: u8,
    pub write_block_length: u8,
}

impl SdCsd {
    /// `raw[3]` holds bits 127:96, as delivered by the R2 response.
    pub fn from_raw(raw: [u32; 4]) -> Self {
        let csd_structure = extract_bits(&raw, 126, 127) as u8;
        let device_size = match CsdVersion::from_structure(csd_structure) {
            Some(CsdVersion::V1) => extract_bits(&raw, 62, 73),
            Some(CsdVersion::V2) => extract_bits(&raw, 48, 69),
            Some(CsdVersion::V3) => extract_bits(&raw, 48, 75),
            None => 0,
        };

        let mut flags = CsdFlags::empty();
        for (bit, flag) in CSD_FLAG_BITS {
            if extract_bits(&raw, bit, bit) != 0 {
                flags |= flag;
            }
        }

        Self {
            raw,
            csd_structure,
            transfer_speed: extract_bits(&raw, 96, 103) as u8,
            card_command_classes: extract_bits(&raw, 84, 95) as u16,
            read_block_length: extract_bits(&raw, 80, 83) as u8,
            flags,
            device_size,
            device_size_multiplier: extract_bits(&raw, 47, 49) as u8,
            write_block_length: extract_bits(&raw, 22, 25) as u8,
        }
    }

    pub fn raw(&self) -> [u32; 4] {
        self.raw
    }

    /// Bits `start..=end` of the raw register.
    pub fn extract(&self, start: u32, end: u32) -> u32 {
        extract_bits(&self.raw, start, end)
    }

    pub fn version(&self) -> Option<CsdVersion> {
        CsdVersion::from_structure(self.csd_structure)
    }

    /// Card size in bytes, `None` for a reserved structure version.
    pub fn capacity_bytes(&self) -> Option<u64> {
        let c_size = self.device_size as u64;
        match self.version()? {
            CsdVersion::V1 => {
                let mult = 1u64 << (self.device_size_multiplier as u32 + 2);
                let block_len = 1u64 << self.read_block_length;
                Some((c_size + 1) * mult * block_len)
            }
            CsdVersion::V2 | CsdVersion::V3 => Some((c_size + 1) * 512 * 1024),
        }
    }
}
