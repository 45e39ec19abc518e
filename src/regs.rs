//! SDMMC controller register map.

use bitflags::bitflags;

#[macro_export]
macro_rules! impl_register_ops {
    ($struct_name:ident, $field_name:ident) => {
        impl $struct_name {
            #[inline]
            pub fn read_reg32(&self, offset: u32) -> u32 {
                unsafe {
                    core::ptr::read_volatile((self.$field_name + offset as usize) as *const u32)
                }
            }

            #[inline]
            pub fn write_reg32(&self, offset: u32, value: u32) {
                unsafe {
                    core::ptr::write_volatile(
                        (self.$field_name + offset as usize) as *mut u32,
                        value,
                    )
                }
            }
        }
    };
}

pub const SDMMC_POWER: u32 = 0x00;
pub const SDMMC_CLKCR: u32 = 0x04;
pub const SDMMC_ARG: u32 = 0x08;
pub const SDMMC_CMD: u32 = 0x0c;
pub const SDMMC_RESPCMD: u32 = 0x10;
pub const SDMMC_RESP1: u32 = 0x14;
pub const SDMMC_RESP2: u32 = 0x18;
pub const SDMMC_RESP3: u32 = 0x1c;
pub const SDMMC_RESP4: u32 = 0x20;
pub const SDMMC_DTIMER: u32 = 0x24;
pub const SDMMC_DLEN: u32 = 0x28;
pub const SDMMC_DCTRL: u32 = 0x2c;
pub const SDMMC_DCOUNT: u32 = 0x30;
pub const SDMMC_STA: u32 = 0x34;
pub const SDMMC_ICR: u32 = 0x38;
pub const SDMMC_MASK: u32 = 0x3c;
pub const SDMMC_IDMACTRL: u32 = 0x50;
pub const SDMMC_IDMABSIZE: u32 = 0x54;
pub const SDMMC_IDMABASE: u32 = 0x58;
pub const SDMMC_FIFO: u32 = 0x80;

/// Offset of RESPn, `n` counted from zero.
pub const fn sdmmc_resp(n: u32) -> u32 {
    SDMMC_RESP1 + 4 * n
}

// POWER
pub const SDMMC_PWRCTRL_MASK: u32 = 0x3;
pub const SDMMC_PWRCTRL_OFF: u32 = 0x0;
pub const SDMMC_PWRCTRL_CYCLE: u32 = 0x2;
pub const SDMMC_PWRCTRL_ON: u32 = 0x3;
pub const SDMMC_POWER_VSWITCH: u32 = 1 << 2;
pub const SDMMC_POWER_VSWITCHEN: u32 = 1 << 3;

// CLKCR
pub const SDMMC_CLKCR_CLKDIV_MASK: u32 = 0x3ff;
pub const SDMMC_CLKCR_WIDBUS_MASK: u32 = 0x3 << 14;
pub const SDMMC_CLKCR_WIDBUS_4: u32 = 0x1 << 14;
pub const SDMMC_CLKCR_HWFC_EN: u32 = 1 << 17;
pub const SDMMC_CLKCR_DDR: u32 = 1 << 18;
pub const SDMMC_CLKCR_BUSSPEED: u32 = 1 << 19;

// CMD
pub const SDMMC_CMD_INDEX_MASK: u32 = 0x3f;
pub const SDMMC_CMD_CMDTRANS: u32 = 1 << 6;
pub const SDMMC_CMD_CMDSTOP: u32 = 1 << 7;
pub const SDMMC_CMD_WAITRESP_SHIFT: u32 = 8;
pub const SDMMC_CMD_CPSMEN: u32 = 1 << 12;

// DCTRL
pub const SDMMC_DCTRL_DTDIR: u32 = 1 << 1;
pub const SDMMC_DCTRL_DBLOCKSIZE_SHIFT: u32 = 4;
pub const SDMMC_DCTRL_FIFORST: u32 = 1 << 13;

// IDMACTRL
pub const SDMMC_IDMACTRL_IDMAEN: u32 = 1 << 0;

bitflags! {
    /// Layout shared by STA, ICR and MASK.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        const CCRCFAIL = 1 << 0;
        const DCRCFAIL = 1 << 1;
        const CTIMEOUT = 1 << 2;
        const DTIMEOUT = 1 << 3;
        const TXUNDERR = 1 << 4;
        const RXOVERR = 1 << 5;
        const CMDREND = 1 << 6;
        const CMDSENT = 1 << 7;
        const DATAEND = 1 << 8;
        const DHOLD = 1 << 9;
        const DBCKEND = 1 << 10;
        const DABORT = 1 << 11;
        const DPSMACT = 1 << 12;
        const CPSMACT = 1 << 13;
        const TXFIFOHE = 1 << 14;
        const RXFIFOHF = 1 << 15;
        const TXFIFOF = 1 << 16;
        const RXFIFOF = 1 << 17;
        const TXFIFOE = 1 << 18;
        const RXFIFOE = 1 << 19;
        const BUSYD0 = 1 << 20;
        const BUSYD0END = 1 << 21;
        const SDIOIT = 1 << 22;
        const ACKFAIL = 1 << 23;
        const ACKTIMEOUT = 1 << 24;
        const VSWEND = 1 << 25;
        const CKSTOP = 1 << 26;
        const IDMATE = 1 << 27;
        const IDMABTC = 1 << 28;
    }
}

impl Status {
    /// Command-path flags that must be clear before a new command is issued.
    pub const CMD_PENDING: Status = Status::CCRCFAIL
        .union(Status::CTIMEOUT)
        .union(Status::CMDREND)
        .union(Status::CMDSENT)
        .union(Status::TXUNDERR)
        .union(Status::RXOVERR)
        .union(Status::BUSYD0END);

    pub const DATA_ERRORS: Status = Status::DCRCFAIL
        .union(Status::DTIMEOUT)
        .union(Status::TXUNDERR)
        .union(Status::RXOVERR);

    /// Interrupt sources unmasked once the card is ready.
    pub const DATA_IRQ: Status = Status::DATA_ERRORS.union(Status::DATAEND);

    /// Every flag ICR can clear.
    pub const STATIC: Status = Status::CCRCFAIL
        .union(Status::DCRCFAIL)
        .union(Status::CTIMEOUT)
        .union(Status::DTIMEOUT)
        .union(Status::TXUNDERR)
        .union(Status::RXOVERR)
        .union(Status::CMDREND)
        .union(Status::CMDSENT)
        .union(Status::DATAEND)
        .union(Status::DHOLD)
        .union(Status::DBCKEND)
        .union(Status::DABORT)
        .union(Status::BUSYD0END)
        .union(Status::SDIOIT)
        .union(Status::ACKFAIL)
        .union(Status::ACKTIMEOUT)
        .union(Status::VSWEND)
        .union(Status::CKSTOP)
        .union(Status::IDMATE)
        .union(Status::IDMABTC);
}

/// 32-bit register access to one SDMMC instance.
pub trait SdmmcRegs: Send + Sync {
    fn read_reg32(&self, offset: u32) -> u32;
    fn write_reg32(&self, offset: u32, value: u32);

    fn set_bits32(&self, offset: u32, bits: u32) {
        let value = self.read_reg32(offset);
        self.write_reg32(offset, value | bits);
    }

    fn clear_bits32(&self, offset: u32, bits: u32) {
        let value = self.read_reg32(offset);
        self.write_reg32(offset, value & !bits);
    }

    fn status(&self) -> Status {
        Status::from_bits_retain(self.read_reg32(SDMMC_STA))
    }

    fn clear_status(&self, flags: Status) {
        self.write_reg32(SDMMC_ICR, flags.bits());
    }
}

/// Memory-mapped SDMMC register block.
#[derive(Debug, Clone, Copy)]
pub struct MmioRegs {
    base_addr: usize,
}

impl MmioRegs {
    /// # Safety
    ///
    /// `base_addr` must be the mapped base of an SDMMC instance that nothing
    /// else drives.
    pub const unsafe fn new(base_addr: usize) -> Self {
        Self { base_addr }
    }

    pub fn base_addr(&self) -> usize {
        self.base_addr
    }
}

impl_register_ops!(MmioRegs, base_addr);

impl SdmmcRegs for MmioRegs {
    fn read_reg32(&self, offset: u32) -> u32 {
        MmioRegs::read_reg32(self, offset)
    }

    fn write_reg32(&self, offset: u32, value: u32) {
        MmioRegs::write_reg32(self, offset, value)
    }
}
