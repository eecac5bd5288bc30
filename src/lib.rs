//! This crate provides a platform agnostic no_std acquisition pipeline for a small
//! environmental monitor, built on top of a bit-banged two-wire bus master.
//! Everything is written against the [`embedded-hal`](https://crates.io/crates/embedded-hal) 1.0 traits.
//!
//! ## Components
//!
//! | Module         | Functionality                                                      |
//! |----------------|--------------------------------------------------------------------|
//! | [`timing`]     | µs/ms busy-wait with watchdog refresh                              |
//! | [`bus`]        | START/STOP framing, byte transfer, bounded acknowledge wait, `I2c` |
//! | [`aht10`]      | Humidity/temperature transaction and bitfield decoding             |
//! | [`ads1115`]    | ADC configuration and conversion reads                             |
//! | [`dust`]       | Particulate density from the optical sensor                        |
//! | [`gas`]        | Trimmed-mean filter and gas concentration                          |
//! | [`validation`] | Plausibility checks and per-channel error flags                    |
//! | [`monitor`]    | One acquisition cycle over all channels                            |
//! | [`mode`]       | Mode-switch flag and display-mode rotation                         |
//!
//! ## Measurements
//!
//! | Measurement     | Unit            | Type  |
//! |-----------------|-----------------|-------|
//! | Temperature     | 0.1 °C          | `i16` |
//! | Humidity        | 0.1 %RH         | `u16` |
//! | Particulate     | µg/m³ (≤ 500)   | `u16` |
//! | Gas             | ppm (≤ 1000)    | `u16` |
//!
//! No floating point is used anywhere.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use envmon::bus::BitBangI2c;
//! use envmon::mode::{ModeSwitch, ViewSelector};
//! use envmon::monitor::{Monitor, MonitorConfig};
//! use envmon::timing::{FnWatchdog, Timing};
//!
//! static MODE_SWITCH: ModeSwitch = ModeSwitch::new();
//!
//! fn main() {
//!     // Platform specific setup
//!     let (scl, sda, led, delay, bus_delay, mut wdt) = board::init();
//!
//!     let mut bus = BitBangI2c::new(scl, sda, bus_delay);
//!     bus.init().unwrap();
//!
//!     let timing = Timing::new(delay, FnWatchdog(move || wdt.feed()));
//!     let mut monitor = Monitor::new(bus, timing, led, MonitorConfig::default());
//!     if let Err(e) = monitor.init() {
//!         // Not fatal: the channel is flagged by the following cycles
//!         println!("{:?}", e);
//!     }
//!
//!     let mut selector = ViewSelector::new();
//!     loop {
//!         let report = monitor.run_cycle();
//!         if MODE_SWITCH.take() {
//!             selector.press();
//!         }
//!         let view = selector.tick();
//!         display::show(view, &report);
//!         telemetry::send(&report);
//!         monitor.idle_ms(500);
//!     }
//! }
//! ```
//!
//! ## Crate features
//!
//! * `defmt`: derive `defmt::Format` and log through `defmt`
//! * `log`: log through the `log` facade (mutually exclusive with `defmt`)
//! * `serde`: derive `serde::Serialize` for the report types
//! * `std`: derive `std::error::Error` via `thiserror`
//!
//! ## Unit tests
//! To run the unit tests across the feature combinations, use the following command:
//! ```bash
//! cargo xtask test-features
//! ```
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod ads1115;
pub mod aht10;
pub mod bus;
pub mod dust;
pub mod gas;
pub mod mode;
pub mod monitor;
pub mod timing;
pub mod validation;

#[cfg(test)]
mod sim;

use embedded_hal::i2c::ErrorKind;

/// Shorthand for all functions returning an error in this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Represents any error that may happen while talking to a sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum Error {
    /// An error occurred while writing to a device.
    #[cfg_attr(
        feature = "std",
        error("An error occurred while writing to the device ({0:?})")
    )]
    Write(ErrorKind),
    /// An error occurred while reading from a device.
    #[cfg_attr(
        feature = "std",
        error("An error occurred while reading from the device ({0:?})")
    )]
    Read(ErrorKind),
    /// The excitation line of the particulate sensor could not be switched.
    #[cfg_attr(
        feature = "std",
        error("The particulate sensor emitter could not be switched")
    )]
    Excitation,
}

pub use bus::{BitBangI2c, BusError};
pub use monitor::{Monitor, MonitorConfig, Report};
pub use timing::Timing;
