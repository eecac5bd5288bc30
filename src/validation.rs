//! Plausibility checks turning readings into per-channel error flags.
//!
//! Flags are recomputed from the current cycle's values only. One channel's
//! flag never depends on another channel.

use crate::aht10::Climate;
use crate::dust::DustSample;
use crate::gas::GasSample;

const FLAG_CLIMATE: u8 = 1 << 0;
const FLAG_PARTICULATE: u8 = 1 << 1;
const FLAG_GAS: u8 = 1 << 2;

/// Plausible ranges per channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Limits {
    /// Tenths of a degree Celsius, inclusive.
    pub temperature_min: i16,
    pub temperature_max: i16,
    /// Tenths of a percent, inclusive.
    pub humidity_min: u16,
    pub humidity_max: u16,
    /// Raw ADC codes above this are treated as noise.
    pub raw_ceiling: u16,
    /// Largest plausible particulate concentration in µg/m³.
    pub particulate_max: u16,
}

impl Limits {
    pub const fn new() -> Self {
        Self {
            temperature_min: -400,
            temperature_max: 850,
            humidity_min: 0,
            humidity_max: 1000,
            raw_ceiling: 60000,
            particulate_max: 500,
        }
    }

    /// Whether the climate reading is implausible.
    pub fn climate_fault(&self, climate: &Climate) -> bool {
        !(self.temperature_min..=self.temperature_max).contains(&climate.temperature_tenths)
            || !(self.humidity_min..=self.humidity_max).contains(&climate.humidity_tenths)
    }

    /// Whether the particulate reading is implausible.
    pub fn particulate_fault(&self, sample: &DustSample) -> bool {
        self.raw_fault(sample.raw) || sample.ugm3 > self.particulate_max
    }

    /// Whether the gas reading is implausible.
    pub fn gas_fault(&self, sample: &GasSample) -> bool {
        self.raw_fault(sample.raw)
    }

    fn raw_fault(&self, raw: u16) -> bool {
        raw == 0 || raw > self.raw_ceiling
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

/// One error flag per channel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ErrorFlags {
    pub climate: bool,
    pub particulate: bool,
    pub gas: bool,
}

impl ErrorFlags {
    /// Pack the flags as bit 0 climate, bit 1 particulate, bit 2 gas.
    pub fn code(&self) -> u8 {
        let mut code = 0;
        if self.climate {
            code |= FLAG_CLIMATE;
        }
        if self.particulate {
            code |= FLAG_PARTICULATE;
        }
        if self.gas {
            code |= FLAG_GAS;
        }
        code
    }

    /// Inverse of [`ErrorFlags::code`]; unknown bits are ignored.
    pub fn from_code(code: u8) -> Self {
        Self {
            climate: code & FLAG_CLIMATE != 0,
            particulate: code & FLAG_PARTICULATE != 0,
            gas: code & FLAG_GAS != 0,
        }
    }

    pub fn any(&self) -> bool {
        self.climate || self.particulate || self.gas
    }
}
