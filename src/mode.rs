//! Mode-switch signalling between the button interrupt and the main loop.
//!
//! The interrupt handler only calls [`ModeSwitch::signal`]. It never touches
//! the bus. The main loop polls [`ModeSwitch::take`] once per cycle and
//! advances its [`DisplayMode`], usually through a [`ViewSelector`] so that
//! the rotation of [`DisplayMode::Auto`] always starts on the climate view.
//!
//! ```rust
//! use envmon::mode::{DisplayMode, ModeSwitch};
//!
//! static MODE_SWITCH: ModeSwitch = ModeSwitch::new();
//!
//! // interrupt handler
//! MODE_SWITCH.signal();
//!
//! // main loop
//! let mut mode = DisplayMode::default();
//! if MODE_SWITCH.take() {
//!     mode = mode.next();
//! }
//! assert_eq!(mode, DisplayMode::ParticulateView);
//! assert!(!MODE_SWITCH.take());
//! ```
//!
//! On cores without compare-and-swap, enable the `critical-section` feature
//! of `portable-atomic`.

use portable_atomic::{AtomicBool, Ordering};

/// Cycles each view stays on screen while rotating.
pub const AUTO_VIEW_TICKS: u32 = 4;

const VIEW_COUNT: u32 = 3;

/// Interrupt-to-main-loop flag.
#[derive(Debug, Default)]
pub struct ModeSwitch {
    pending: AtomicBool,
}

impl ModeSwitch {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Record a button press. Safe to call from interrupt context.
    pub fn signal(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Whether a press was recorded since the last call. Clears the flag.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

/// What the display collaborator shows.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DisplayMode {
    /// Temperature and humidity.
    #[default]
    ClimateView,
    ParticulateView,
    GasView,
    /// Rotate through the three views.
    Auto,
}

impl DisplayMode {
    /// The mode after one button press.
    pub fn next(self) -> Self {
        match self {
            DisplayMode::ClimateView => DisplayMode::ParticulateView,
            DisplayMode::ParticulateView => DisplayMode::GasView,
            DisplayMode::GasView => DisplayMode::Auto,
            DisplayMode::Auto => DisplayMode::ClimateView,
        }
    }

    /// The view to show at cycle `tick`. `Auto` advances every
    /// [`AUTO_VIEW_TICKS`] cycles.
    pub fn resolve(self, tick: u32) -> Self {
        match self {
            DisplayMode::Auto => match (tick % (AUTO_VIEW_TICKS * VIEW_COUNT)) / AUTO_VIEW_TICKS {
                0 => DisplayMode::ClimateView,
                1 => DisplayMode::ParticulateView,
                _ => DisplayMode::GasView,
            },
            view => view,
        }
    }

    /// Numeric mode as used on the display and telemetry side (0 to 3).
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Display mode plus the number of cycles spent in it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ViewSelector {
    mode: DisplayMode,
    ticks: u32,
}

impl ViewSelector {
    pub const fn new() -> Self {
        Self {
            mode: DisplayMode::ClimateView,
            ticks: 0,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Advance to the next mode and restart the rotation.
    pub fn press(&mut self) {
        self.mode = self.mode.next();
        self.ticks = 0;
    }

    /// The view for this cycle. Call once per cycle.
    pub fn tick(&mut self) -> DisplayMode {
        let view = self.mode.resolve(self.ticks);
        self.ticks = self.ticks.wrapping_add(1);
        view
    }
}
