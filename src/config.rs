use crate::constants::*;

/// Per-interface settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdmmcConfig {
    iface_id: u8,
    kernel_clock_hz: u32,
    ident_clock_hz: u32,
    default_speed_clock_hz: u32,
    high_speed_clock_hz: u32,
    supply_mv: u32,
    default_io_mv: u32,
    high_speed: bool,
    signal_1v8: bool,
    data_timeout_ns: u64,
    retry_interval_ms: u32,
    cmd_retries: u32,
}

impl SdmmcConfig {
    pub fn new(iface_id: u8) -> Self {
        Self {
            iface_id,
            kernel_clock_hz: SDMMC_KERNEL_CLOCK_HZ,
            ident_clock_hz: SD_CLOCK_IDENT,
            default_speed_clock_hz: SD_CLOCK_DEFAULT_SPEED,
            high_speed_clock_hz: SD_CLOCK_HIGH_SPEED,
            supply_mv: SD_VOLTAGE_3V3,
            default_io_mv: SD_VOLTAGE_3V3,
            high_speed: true,
            signal_1v8: true,
            data_timeout_ns: 250_000_000,
            retry_interval_ms: 1000,
            cmd_retries: SD_CMD_TIMEOUT_RETRIES,
        }
    }

    /// Removable card slot on interface 0.
    pub fn sd_card() -> Self {
        Self::new(0)
    }

    /// Soldered SDIO radio on interface 1, held at 1.8V I/O by the board.
    pub fn sdio() -> Self {
        Self::new(1)
            .with_default_io_mv(SD_VOLTAGE_1V8)
            .with_signal_1v8(false)
    }

    pub fn iface_id(&self) -> u8 {
        self.iface_id
    }

    pub fn kernel_clock_hz(&self) -> u32 {
        self.kernel_clock_hz
    }

    pub fn ident_clock_hz(&self) -> u32 {
        self.ident_clock_hz
    }

    pub fn default_speed_clock_hz(&self) -> u32 {
        self.default_speed_clock_hz
    }

    pub fn high_speed_clock_hz(&self) -> u32 {
        self.high_speed_clock_hz
    }

    pub fn supply_mv(&self) -> u32 {
        self.supply_mv
    }

    pub fn default_io_mv(&self) -> u32 {
        self.default_io_mv
    }

    pub fn high_speed(&self) -> bool {
        self.high_speed
    }

    pub fn signal_1v8(&self) -> bool {
        self.signal_1v8
    }

    pub fn data_timeout_ns(&self) -> u64 {
        self.data_timeout_ns
    }

    pub fn retry_interval_ms(&self) -> u32 {
        self.retry_interval_ms
    }

    pub fn cmd_retries(&self) -> u32 {
        self.cmd_retries
    }

    pub fn with_kernel_clock_hz(mut self, hz: u32) -> Self {
        self.kernel_clock_hz = hz;
        self
    }

    pub fn with_supply_mv(mut self, mv: u32) -> Self {
        self.supply_mv = mv;
        self
    }

    pub fn with_default_io_mv(mut self, mv: u32) -> Self {
        self.default_io_mv = mv;
        self
    }

    pub fn with_high_speed(mut self, enable: bool) -> Self {
        self.high_speed = enable;
        self
    }

    pub fn with_signal_1v8(mut self, enable: bool) -> Self {
        self.signal_1v8 = enable;
        self
    }

    pub fn with_data_timeout_ns(mut self, ns: u64) -> Self {
        self.data_timeout_ns = ns;
        self
    }

    pub fn with_retry_interval_ms(mut self, ms: u32) -> Self {
        self.retry_interval_ms = ms;
        self
    }

    pub fn with_cmd_retries(mut self, retries: u32) -> Self {
        self.cmd_retries = retries.max(1);
        self
    }
}

impl Default for SdmmcConfig {
    fn default() -> Self {
        Self::sd_card()
    }
}
