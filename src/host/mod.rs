//! Controller ownership and the primitives every layer above builds on.

mod block;
mod clock;
mod cmd;
mod data;
mod sdio;

extern crate alloc;

use alloc::sync::Arc;
use core::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

pub use clock::{clock_divider, divided_clock, speed_bits};
pub use sdio::cmd52_arg;

use crate::{
    card::{BusWidth, CardIdentity, SpeedMode},
    config::SdmmcConfig,
    osa::Platform,
    transfer::HwCompletion,
};

/// Controller settings owned by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    pub clock_hz: u32,
    pub clock_period_ns: u32,
    pub bus_width: BusWidth,
    pub speed_mode: SpeedMode,
    pub card_present: bool,
    pub multi_in_progress: bool,
}

impl ControllerState {
    pub fn new() -> Self {
        Self {
            clock_hz: 0,
            clock_period_ns: 0,
            bus_width: BusWidth::One,
            speed_mode: SpeedMode::DefaultSpeed,
            card_present: false,
            multi_in_progress: false,
        }
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

/// The only state written from more than one context.
pub struct SharedState {
    ready: AtomicBool,
    shutdown: AtomicBool,
    in_flight: AtomicBool,
    capacity: AtomicU64,
    hw: HwCompletion,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            capacity: AtomicU64::new(0),
            hw: HwCompletion::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn set_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.set_ready(false);
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn set_capacity_bytes(&self, bytes: u64) {
        self.capacity.store(bytes, Ordering::Release);
    }

    pub fn hw(&self) -> &HwCompletion {
        &self.hw
    }

    /// Marks a request as dispatched to the hardware. Returns false if one
    /// already was.
    pub fn begin_flight(&self) -> bool {
        !self.in_flight.swap(true, Ordering::AcqRel)
    }

    pub fn end_flight(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// One SDMMC interface and the card behind it.
pub struct SdmmcHost<P: Platform> {
    platform: Arc<P>,
    shared: Arc<SharedState>,
    config: SdmmcConfig,
    state: ControllerState,
    card: CardIdentity,
    vswitch_failed: bool,
}

impl<P: Platform> SdmmcHost<P> {
    pub fn new(platform: Arc<P>, shared: Arc<SharedState>, config: SdmmcConfig) -> Self {
        Self {
            platform,
            shared,
            config,
            state: ControllerState::new(),
            card: CardIdentity::new(),
            vswitch_failed: false,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn config(&self) -> &SdmmcConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn card(&self) -> &CardIdentity {
        &self.card
    }

    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    /// A 1.8V switch failed earlier; this session stays at 3.3V.
    pub fn vswitch_failed(&self) -> bool {
        self.vswitch_failed
    }

    pub(crate) fn state_mut(&mut self) -> &mut ControllerState {
        &mut self.state
    }

    pub(crate) fn card_mut(&mut self) -> &mut CardIdentity {
        &mut self.card
    }

    pub(crate) fn set_vswitch_failed(&mut self) {
        self.vswitch_failed = true;
    }

    /// Forgets everything learnt about the previous card.
    pub(crate) fn forget_card(&mut self) {
        self.shared.set_ready(false);
        self.shared.set_capacity_bytes(0);
        self.card = CardIdentity::new();
        self.state = ControllerState::new();
    }
}

impl<P: Platform> fmt::Display for SdmmcHost<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SDMMC{}: {} Hz, {} bus, {}",
            self.config.iface_id() + 1,
            self.state.clock_hz,
            self.state.bus_width,
            self.state.speed_mode
        )?;
        if self.is_ready() {
            write!(
                f,
                ", RCA {:#06x}, {} bytes",
                self.card.rca_value(),
                self.card.capacity_bytes
            )?;
        }
        Ok(())
    }
}
