//! # AHT10 humidity and temperature sensor
//!
//! A measurement is a trigger command followed by a fixed conversion time and
//! a 6 byte read: one status byte and two 20 bit fields packed into the
//! remaining 5 bytes.
//!
//! ```text
//!  byte   1        2        3        4        5
//!        [hhhhhhhh|hhhhhhhh|hhhhtttt|tttttttt|tttttttt]
//! ```
//!
//! Conversion to physical units is done in integer arithmetic:
//!
//! * humidity (tenths of a percent) = `raw × 1000 / 2^20`
//! * temperature (tenths of a degree Celsius) = `raw × 2000 / 2^20 − 500`
//!
//! ```rust
//! use envmon::aht10::RawClimate;
//!
//! let raw = RawClimate::from_bytes(&[0x08, 0xB3, 0x33, 0x4B, 0x33, 0x34]);
//! let climate = raw.to_climate();
//! assert_eq!(climate.humidity_tenths, 700);
//! assert_eq!(climate.temperature_tenths, 900);
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};

use crate::{Error, Result};

/// Factory address of the sensor.
pub const DEFAULT_ADDRESS: u8 = 0x38;

const CMD_INITIALIZE: [u8; 3] = [0xE1, 0x08, 0x00];
const CMD_TRIGGER: [u8; 3] = [0xAC, 0x33, 0x00];

/// Power stabilisation after supply ramp-up.
const POWER_UP_MS: u32 = 40;
const INITIALIZE_MS: u32 = 10;
const MEASUREMENT_MS: u32 = 80;

const STATUS_BUSY: u8 = 1 << 7;
const STATUS_CALIBRATED: u8 = 1 << 3;

const FIELD_MASK: u32 = 0x000F_FFFF;
const FIELD_BITS: u32 = 20;

/// Undecoded measurement as delivered by the sensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RawClimate {
    pub status: u8,
    /// 20 bit relative humidity field.
    pub humidity: u32,
    /// 20 bit temperature field.
    pub temperature: u32,
}

impl RawClimate {
    /// Unpack the 6 byte response.
    pub fn from_bytes(bytes: &[u8; 6]) -> Self {
        let humidity =
            (bytes[1] as u32) << 12 | (bytes[2] as u32) << 4 | (bytes[3] as u32) >> 4;
        let temperature =
            ((bytes[3] & 0x0F) as u32) << 16 | (bytes[4] as u32) << 8 | bytes[5] as u32;

        Self {
            status: bytes[0],
            humidity,
            temperature,
        }
    }

    /// Pack into the 6 byte layout the sensor uses. Bits above the 20 bit
    /// fields are dropped.
    pub fn to_bytes(&self) -> [u8; 6] {
        let humidity = self.humidity & FIELD_MASK;
        let temperature = self.temperature & FIELD_MASK;
        [
            self.status,
            (humidity >> 12) as u8,
            (humidity >> 4) as u8,
            ((humidity & 0x0F) << 4) as u8 | (temperature >> 16) as u8,
            (temperature >> 8) as u8,
            temperature as u8,
        ]
    }

    /// A conversion is still in progress.
    pub fn is_busy(&self) -> bool {
        self.status & STATUS_BUSY != 0
    }

    /// The calibration coefficients are loaded.
    pub fn is_calibrated(&self) -> bool {
        self.status & STATUS_CALIBRATED != 0
    }

    /// Convert to physical units.
    pub fn to_climate(&self) -> Climate {
        let humidity = ((self.humidity & FIELD_MASK) * 1000) >> FIELD_BITS;
        let temperature = (((self.temperature & FIELD_MASK) * 2000) >> FIELD_BITS) as i32 - 500;

        Climate {
            temperature_tenths: temperature as i16,
            humidity_tenths: humidity as u16,
        }
    }
}

/// Temperature and humidity in tenths of their unit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Climate {
    /// Tenths of a degree Celsius.
    pub temperature_tenths: i16,
    /// Tenths of a percent relative humidity.
    pub humidity_tenths: u16,
}

/// Transaction decoder for the AHT10.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Aht10 {
    address: u8,
}

impl Aht10 {
    /// Sensor at the default address.
    pub const fn new() -> Self {
        Self::with_address(DEFAULT_ADDRESS)
    }

    /// Use an alternative address (the sensor's address pin pulled high).
    pub const fn with_address(address: u8) -> Self {
        Self { address }
    }

    /// 7-bit bus address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Wait for the supply to settle and enable the calibration.
    pub fn init<I2C, D>(&mut self, i2c: &mut I2C, delay: &mut D) -> Result<()>
    where
        I2C: I2c,
        D: DelayNs,
    {
        delay.delay_ms(POWER_UP_MS);
        i2c.write(self.address, &CMD_INITIALIZE)
            .map_err(|e| Error::Write(e.kind()))?;
        delay.delay_ms(INITIALIZE_MS);
        Ok(())
    }

    /// Trigger a measurement and return the undecoded response.
    pub fn read_raw<I2C, D>(&mut self, i2c: &mut I2C, delay: &mut D) -> Result<RawClimate>
    where
        I2C: I2c,
        D: DelayNs,
    {
        i2c.write(self.address, &CMD_TRIGGER)
            .map_err(|e| Error::Write(e.kind()))?;
        delay.delay_ms(MEASUREMENT_MS);

        let mut buffer = [0u8; 6];
        i2c.read(self.address, &mut buffer)
            .map_err(|e| Error::Read(e.kind()))?;

        Ok(RawClimate::from_bytes(&buffer))
    }

    /// Trigger a measurement and convert it to physical units.
    pub fn read<I2C, D>(&mut self, i2c: &mut I2C, delay: &mut D) -> Result<Climate>
    where
        I2C: I2c,
        D: DelayNs,
    {
        let raw = self.read_raw(i2c, delay)?;
        if raw.is_busy() {
            debug!("Climate sensor reports a conversion still in progress");
        }
        Ok(raw.to_climate())
    }
}

impl Default for Aht10 {
    fn default() -> Self {
        Self::new()
    }
}
