/// Card supply and signalling rails.
///
/// Both setters return the voltage actually reached in mV; 0 means the rail
/// is off or the request failed.
pub trait PowerOps: Send + Sync {
    fn set_supply_voltage(&self, mv: u32) -> u32;
    fn set_io_voltage(&self, mv: u32) -> u32;

    /// Pulses the controller's peripheral reset, if the board can.
    fn reset_controller(&self) {}
}

#[cfg(target_arch = "aarch64")]
pub use smc::{PowerRail, SmcPower};

#[cfg(target_arch = "aarch64")]
mod smc {
    use log::warn;

    use super::PowerOps;

    /// SMC64 SiP fast call: x1 = rail, x2 = mV, returns achieved mV in x0.
    const SIP_SET_POWER: u32 = 0xc200_0001;

    /// Regulator outputs owned by the secure monitor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(u64)]
    pub enum PowerRail {
        SdCard = 0,
        SdCardIo = 1,
        SdioIo = 2,
    }

    /// Rails switched through the secure monitor.
    #[derive(Debug, Clone, Copy)]
    pub struct SmcPower {
        supply: Option<PowerRail>,
        io: PowerRail,
    }

    impl SmcPower {
        /// The removable card slot: separate supply and I/O rails.
        pub const fn sd_card() -> Self {
            Self {
                supply: Some(PowerRail::SdCard),
                io: PowerRail::SdCardIo,
            }
        }

        /// A soldered-down SDIO device with a fixed supply.
        pub const fn sdio() -> Self {
            Self {
                supply: None,
                io: PowerRail::SdioIo,
            }
        }

        fn set_rail(rail: PowerRail, mv: u32) -> u32 {
            let mut args = [0u64; 17];
            args[0] = rail as u64;
            args[1] = mv as u64;
            let ret = smccc::smc64(SIP_SET_POWER, args)[0] as i64;
            if ret < 0 {
                warn!("SMC set power {:?} {} mV failed: {}", rail, mv, ret);
                return 0;
            }
            ret as u32
        }
    }

    impl PowerOps for SmcPower {
        fn set_supply_voltage(&self, mv: u32) -> u32 {
            match self.supply {
                Some(rail) => Self::set_rail(rail, mv),
                None => mv,
            }
        }

        fn set_io_voltage(&self, mv: u32) -> u32 {
            Self::set_rail(self.io, mv)
        }
    }
}
