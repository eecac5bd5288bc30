//! # ADS1115 analog-to-digital converter
//!
//! 16 bit converter with four single-ended inputs and a programmable gain
//! amplifier. Every single-shot read writes the full configuration register,
//! waits for the conversion and reads the conversion register back, so no
//! channel state is cached between calls.
//!
//! Configuration register layout:
//!
//! | Bits  | Field     | Used value                                   |
//! |-------|-----------|----------------------------------------------|
//! | 15    | OS        | 1 (start a conversion)                       |
//! | 14:12 | MUX       | `100 + n` (input `n` against ground)         |
//! | 11:9  | PGA       | see [`Gain`]                                 |
//! | 8     | MODE      | 1 single-shot, 0 continuous                  |
//! | 7:5   | DR        | 128 SPS single-shot, 8 SPS continuous        |
//! | 4:0   | COMP_*    | `00011` (comparator disabled)                |

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};

use crate::{Error, Result};

/// Address with the address pin tied to ground.
pub const DEFAULT_ADDRESS: u8 = 0x48;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

/// Conversion wait after writing the configuration.
const CONVERSION_MS: u32 = 10;

const OS_START: u16 = 1 << 15;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
const RATE_8_SPS: u16 = 0x0000;
const RATE_128_SPS: u16 = 0b100 << 5;
const COMPARATOR_DISABLED: u16 = 0b0_0011;

/// Single-ended input.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    A0 = 0,
    A1 = 1,
    A2 = 2,
    A3 = 3,
}

impl Channel {
    fn mux(self) -> u16 {
        (0b100 | self as u16) << 12
    }
}

/// Full-scale range of the programmable gain amplifier.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    /// ±6.144 V
    #[default]
    Fsr6144 = 0,
    /// ±4.096 V
    Fsr4096 = 1,
    /// ±2.048 V
    Fsr2048 = 2,
    /// ±1.024 V
    Fsr1024 = 3,
    /// ±0.512 V
    Fsr512 = 4,
    /// ±0.256 V
    Fsr256 = 5,
}

impl Gain {
    /// Input voltage that maps to the full positive code, in millivolts.
    pub fn full_scale_mv(self) -> u32 {
        match self {
            Gain::Fsr6144 => 6144,
            Gain::Fsr4096 => 4096,
            Gain::Fsr2048 => 2048,
            Gain::Fsr1024 => 1024,
            Gain::Fsr512 => 512,
            Gain::Fsr256 => 256,
        }
    }

    fn pga(self) -> u16 {
        (self as u16) << 9
    }
}

/// Conversion mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// One conversion per configuration write, then power down.
    SingleShot,
    /// Convert continuously at 8 samples per second.
    Continuous,
}

/// Transaction decoder for the ADS1115.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ads1115 {
    address: u8,
    gain: Gain,
}

impl Ads1115 {
    /// Default address, ±6.144 V range.
    pub const fn new() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            gain: Gain::Fsr6144,
        }
    }

    /// Use the address selected by the ADDR pin.
    pub const fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Select the input range used for every conversion.
    pub const fn with_gain(mut self, gain: Gain) -> Self {
        self.gain = gain;
        self
    }

    /// 7-bit bus address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The configured input range.
    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// Encode the configuration register for a conversion on `channel`.
    pub fn config_word(&self, channel: Channel, mode: Mode) -> u16 {
        let base = OS_START | channel.mux() | self.gain.pga() | COMPARATOR_DISABLED;
        match mode {
            Mode::SingleShot => base | MODE_SINGLE_SHOT | RATE_128_SPS,
            Mode::Continuous => base | RATE_8_SPS,
        }
    }

    /// Run one conversion on `channel` and return the signed result code.
    pub fn read_single<I2C, D>(
        &mut self,
        i2c: &mut I2C,
        delay: &mut D,
        channel: Channel,
    ) -> Result<i16>
    where
        I2C: I2c,
        D: DelayNs,
    {
        self.write_config(i2c, self.config_word(channel, Mode::SingleShot))?;
        delay.delay_ms(CONVERSION_MS);
        self.read_conversion(i2c)
    }

    /// Put the converter into continuous mode on `channel`.
    pub fn start_continuous<I2C, D>(
        &mut self,
        i2c: &mut I2C,
        delay: &mut D,
        channel: Channel,
    ) -> Result<()>
    where
        I2C: I2c,
        D: DelayNs,
    {
        self.write_config(i2c, self.config_word(channel, Mode::Continuous))?;
        delay.delay_ms(CONVERSION_MS);
        Ok(())
    }

    /// Read the most recent result in continuous mode.
    pub fn read_continuous<I2C: I2c>(&mut self, i2c: &mut I2C) -> Result<i16> {
        self.read_conversion(i2c)
    }

    fn write_config<I2C: I2c>(&mut self, i2c: &mut I2C, config: u16) -> Result<()> {
        let [msb, lsb] = config.to_be_bytes();
        i2c.write(self.address, &[REG_CONFIG, msb, lsb])
            .map_err(|e| Error::Write(e.kind()))
    }

    /// Select the conversion register and read it in a separate transaction.
    fn read_conversion<I2C: I2c>(&mut self, i2c: &mut I2C) -> Result<i16> {
        i2c.write(self.address, &[REG_CONVERSION])
            .map_err(|e| Error::Write(e.kind()))?;

        let mut buffer = [0u8; 2];
        i2c.read(self.address, &mut buffer)
            .map_err(|e| Error::Read(e.kind()))?;

        Ok(i16::from_be_bytes(buffer))
    }
}

impl Default for Ads1115 {
    fn default() -> Self {
        Self::new()
    }
}
