// Block geometry
pub const SD_BLOCK_SIZE: usize = 512;
pub const SD_BLOCK_SIZE_POW: u32 = 9;

// SD/SDIO command indices
pub const SD_GO_IDLE_STATE: u8 = 0;
pub const SD_ALL_SEND_CID: u8 = 2;
pub const SD_SEND_RELATIVE_ADDR: u8 = 3;
pub const SDIO_SEND_OP_COND: u8 = 5;
pub const SD_SWITCH_FUNC: u8 = 6;
pub const SD_SELECT_CARD: u8 = 7;
pub const SD_SEND_IF_COND: u8 = 8;
pub const SD_SEND_CSD: u8 = 9;
pub const SD_VOLTAGE_SWITCH: u8 = 11;
pub const SD_STOP_TRANSMISSION: u8 = 12;
pub const SD_SEND_STATUS: u8 = 13;
pub const SD_SET_BLOCKLEN: u8 = 16;
pub const SD_READ_SINGLE_BLOCK: u8 = 17;
pub const SD_READ_MULTIPLE_BLOCK: u8 = 18;
pub const SD_WRITE_BLOCK: u8 = 24;
pub const SD_WRITE_MULTIPLE_BLOCK: u8 = 25;
pub const SDIO_RW_DIRECT: u8 = 52;
pub const SD_APP_CMD: u8 = 55;

// Application commands, sent after SD_APP_CMD
pub const SD_APP_SET_BUS_WIDTH: u8 = 6;
pub const SD_APP_OP_COND: u8 = 41;
pub const SD_APP_SEND_SCR: u8 = 51;

// CMD8 argument: 2.7-3.6V, check pattern 0xaa
pub const SD_IF_COND_ARG: u32 = 0x1aa;
pub const SD_IF_COND_ECHO_MASK: u32 = 0x1ff;

// OCR (ACMD41 / CMD5)
pub const SD_OCR_BUSY: u32 = 1 << 31;
pub const SD_OCR_HCS: u32 = 1 << 30;
pub const SD_OCR_S18: u32 = 1 << 24;
pub const SD_OCR_VOLTAGE_WINDOW: u32 = 0x00ff_8000;
pub const SD_OCR_VOLTAGE_3V3: u32 = 0x0038_0000;

// SDIO R4 fields
pub const SDIO_R4_FUNCS_SHIFT: u32 = 28;
pub const SDIO_R4_FUNCS_MASK: u32 = 0x7;
pub const SDIO_R4_MEM_PRESENT: u32 = 1 << 27;

// ACMD6 argument for a 4-bit bus
pub const SD_BUS_WIDTH_4_ARG: u32 = 0x2;

// CMD6 arguments: mode bit, then groups 6..1 one nibble each (0xf keeps current)
pub const SD_SWITCH_INQUIRY: u32 = 0x00ff_ffff;
pub const SD_SWITCH_HIGH_SPEED: u32 = 0x80ff_fff1;
pub const SD_SWITCH_DDR50: u32 = 0x80ff_1ff4;
pub const SD_SWITCH_STATUS_LEN: usize = 64;
pub const SD_SCR_LEN: usize = 8;

// Function numbers inside CMD6 groups
pub const SD_FG1_HIGH_SPEED: u8 = 1;
pub const SD_FG1_DDR50: u8 = 4;
pub const SD_FG4_1W44: u8 = 1;

// SDIO CCCR
pub const SDIO_CCCR_BUS_IF: u32 = 0x07;
pub const SDIO_CCCR_CAPS: u32 = 0x08;
pub const SDIO_CCCR_SPEED: u32 = 0x13;
pub const SDIO_CCCR_SIZE: usize = 0x16;
pub const SDIO_BUS_WIDTH_MASK: u8 = 0x03;
pub const SDIO_BUS_WIDTH_4: u8 = 0x02;
pub const SDIO_CAPS_LSC: u8 = 1 << 6;
pub const SDIO_CAPS_4BLS: u8 = 1 << 7;
pub const SDIO_SPEED_SHS: u8 = 1 << 0;
pub const SDIO_SPEED_EHS: u8 = 1 << 1;

// Clocks
pub const SDMMC_KERNEL_CLOCK_HZ: u32 = 200_000_000;
pub const SD_CLOCK_IDENT: u32 = 200_000;
pub const SD_CLOCK_DEFAULT_SPEED: u32 = 25_000_000;
pub const SD_CLOCK_HIGH_SPEED: u32 = 50_000_000;

// Voltages (mV)
pub const SD_VOLTAGE_3V3: u32 = 3300;
pub const SD_VOLTAGE_1V8: u32 = 1800;

// Power-up sequencing delays (ms)
pub const SD_POWER_CYCLE_DELAY_MS: u32 = 1;
pub const SD_POWER_RAMP_DELAY_MS: u32 = 10;
pub const SD_VSWITCH_SETTLE_MS: u32 = 10;

// Retry budgets
pub const SD_CMD_TIMEOUT_RETRIES: u32 = 10;
pub const SD_CMD_BACKOFF_MS: u32 = 5;
pub const SDIO_OCR_RETRIES: u32 = 10;
pub const SD_ACMD41_RETRIES: u32 = 1000;
pub const SD_STATUS_POLL_RETRIES: u32 = 1000;

/// Upper bound on register polls while waiting for a hardware flag.
pub const SDMMC_POLL_LIMIT: u32 = 1_000_000;

pub const REQUEST_QUEUE_DEPTH: usize = 32;
