//! # Acquisition cycle
//!
//! [`Monitor`] owns the bus, the watchdog-aware delay, the emitter line of
//! the particulate sensor and the per-channel state. Every call of
//! [`Monitor::run_cycle`] samples the channels in the fixed order
//! climate → particulate → gas, validates them and stores a [`Report`].
//!
//! A failing channel is flagged and reports zero for that cycle. The other
//! channels are still sampled, and the next cycle starts from scratch.
//!
//! ```rust
//! use envmon::monitor::{Monitor, MonitorConfig};
//! use envmon::timing::{NoWatchdog, Timing};
//! # use embedded_hal_mock::eh1::delay::NoopDelay;
//! # use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};
//! # use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
//! # let i2c = I2cMock::new(&[
//! #     I2cTransaction::write(0x38, vec![0xE1, 0x08, 0x00]),
//! # ]);
//! # let led = PinMock::new(&[PinTransaction::set(State::High)]);
//!
//! let timing = Timing::new(NoopDelay::new(), NoWatchdog);
//! let mut monitor = Monitor::new(i2c, timing, led, MonitorConfig::default());
//! monitor.init().unwrap();
//! # let (mut i2c, _, mut led) = monitor.release();
//! # i2c.done();
//! # led.done();
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

use crate::Result;
use crate::ads1115::Ads1115;
use crate::aht10::{Aht10, Climate};
use crate::dust::{DustConfig, DustSensor};
use crate::gas::{GasConfig, GasSensor};
use crate::timing::{Timing, Watchdog};
use crate::validation::{ErrorFlags, Limits};

/// Configuration of all channels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MonitorConfig {
    pub dust: DustConfig,
    pub gas: GasConfig,
    pub limits: Limits,
}

impl MonitorConfig {
    pub const fn new() -> Self {
        Self {
            dust: DustConfig::new(),
            gas: GasConfig::new(),
            limits: Limits::new(),
        }
    }
}

/// Result of one acquisition cycle, as handed to display and telemetry.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Report {
    /// Tenths of a degree Celsius.
    pub temperature_tenths: i16,
    /// Tenths of a percent relative humidity.
    pub humidity_tenths: u16,
    /// µg/m³
    pub particulate_ugm3: u16,
    pub gas_ppm: u16,
    pub flags: ErrorFlags,
}

/// The acquisition pipeline.
pub struct Monitor<I2C, D, W, LED> {
    i2c: I2C,
    timing: Timing<D, W>,
    climate: Aht10,
    adc: Ads1115,
    dust: DustSensor<LED>,
    gas: GasSensor,
    limits: Limits,
    latest: Report,
    cycles: u32,
}

impl<I2C, D, W, LED> Monitor<I2C, D, W, LED>
where
    I2C: I2c,
    D: DelayNs,
    W: Watchdog,
    LED: OutputPin,
{
    /// Creates the pipeline with the default sensor addresses.
    pub fn new(i2c: I2C, timing: Timing<D, W>, led: LED, config: MonitorConfig) -> Self {
        Self {
            i2c,
            timing,
            climate: Aht10::new(),
            adc: Ads1115::new(),
            dust: DustSensor::new(led, config.dust),
            gas: GasSensor::new(config.gas),
            limits: config.limits,
            latest: Report::default(),
            cycles: 0,
        }
    }

    /// Bring the sensors into a defined state.
    ///
    /// Every sensor is initialised even if an earlier one fails, and the
    /// first error is returned. A failure here is not fatal: the affected
    /// channel is simply flagged by the following cycles.
    pub fn init(&mut self) -> Result<()> {
        let dust = self.dust.init();
        if let Err(e) = dust {
            warn!("Particulate emitter init failed: {:?}", e);
        }
        let climate = self.climate.init(&mut self.i2c, &mut self.timing);
        if let Err(e) = climate {
            warn!("Climate sensor init failed: {:?}", e);
        }
        dust.and(climate)
    }

    /// Sample, filter and validate every channel once.
    pub fn run_cycle(&mut self) -> Report {
        self.timing.feed();

        let mut flags = ErrorFlags::default();

        let climate = match self.climate.read(&mut self.i2c, &mut self.timing) {
            Ok(climate) => {
                flags.climate = self.limits.climate_fault(&climate);
                climate
            }
            Err(e) => {
                warn!("Climate channel failed: {:?}", e);
                flags.climate = true;
                Climate::default()
            }
        };

        let particulate_ugm3 =
            match self.dust.measure(&mut self.adc, &mut self.i2c, &mut self.timing) {
                Ok(sample) => {
                    flags.particulate = self.limits.particulate_fault(&sample);
                    sample.ugm3
                }
                Err(e) => {
                    warn!("Particulate channel failed: {:?}", e);
                    flags.particulate = true;
                    0
                }
            };

        let gas_ppm = match self.gas.measure(&mut self.adc, &mut self.i2c, &mut self.timing) {
            Ok(sample) => {
                flags.gas = self.limits.gas_fault(&sample);
                sample.ppm
            }
            Err(e) => {
                warn!("Gas channel failed: {:?}", e);
                flags.gas = true;
                0
            }
        };

        let report = Report {
            temperature_tenths: climate.temperature_tenths,
            humidity_tenths: climate.humidity_tenths,
            particulate_ugm3,
            gas_ppm,
            flags,
        };

        debug!(
            "Cycle {}: temperature {} humidity {} particulate {} gas {} flags {}",
            self.cycles,
            report.temperature_tenths,
            report.humidity_tenths,
            report.particulate_ugm3,
            report.gas_ppm,
            report.flags.code()
        );

        self.latest = report;
        self.cycles = self.cycles.wrapping_add(1);
        report
    }

    /// The last report, without sampling.
    pub fn latest(&self) -> &Report {
        &self.latest
    }

    /// Number of completed cycles (wrapping), usable as the display tick.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Blocking wait between cycles that keeps the watchdog fed.
    pub fn idle_ms(&mut self, ms: u32) {
        self.timing.wait_ms(ms);
    }

    /// Access to the bus between cycles, e.g. to check a latched fault.
    pub fn i2c_mut(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    /// Destroys the pipeline and returns the bus, the delay and the emitter
    /// line.
    pub fn release(self) -> (I2C, Timing<D, W>, LED) {
        (self.i2c, self.timing, self.dust.release())
    }
}
