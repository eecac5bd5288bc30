//! # Optical particulate sensor
//!
//! The sensor has an infrared emitter that must be switched on shortly before
//! its analog output is sampled. The output voltage rises linearly with the
//! dust density above a clean-air offset.
//!
//! The emitter line is active-low and belongs to the [`DustSensor`].

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;

use crate::ads1115::{Ads1115, Channel};
use crate::{Error, Result};

/// Largest positive ADC code.
const CODE_FULL_SCALE: u32 = 32768;

/// Parameters of the particulate channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DustConfig {
    /// Emitter on-time before the conversion is started.
    pub settle_us: u32,
    pub channel: Channel,
    /// Output voltage in clean air.
    pub zero_offset_mv: u32,
    /// Sensitivity, millivolts per µg/m³.
    pub mv_per_ugm3: u32,
    /// Upper bound of the reported concentration.
    pub max_ugm3: u16,
    /// Converter input range the codes refer to.
    pub full_scale_mv: u32,
}

impl DustConfig {
    pub const fn new() -> Self {
        Self {
            settle_us: 280,
            channel: Channel::A1,
            zero_offset_mv: 600,
            mv_per_ugm3: 6,
            max_ugm3: 500,
            full_scale_mv: 6144,
        }
    }

    /// Convert an ADC code into a concentration.
    pub fn concentration(&self, code: i16) -> DustSample {
        let raw = code.max(0) as u16;
        let mv = raw as u32 * self.full_scale_mv / CODE_FULL_SCALE;

        let ugm3 = if mv <= self.zero_offset_mv {
            0
        } else {
            let density = (mv - self.zero_offset_mv) / self.mv_per_ugm3.max(1);
            density.min(self.max_ugm3 as u32) as u16
        };

        DustSample { raw, ugm3 }
    }
}

impl Default for DustConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One particulate measurement.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DustSample {
    /// ADC code, negative codes clamped to zero.
    pub raw: u16,
    /// Concentration in µg/m³.
    pub ugm3: u16,
}

/// Particulate channel: emitter line plus conversion parameters.
#[derive(Debug)]
pub struct DustSensor<LED> {
    led: LED,
    config: DustConfig,
}

impl<LED> DustSensor<LED>
where
    LED: OutputPin,
{
    /// Takes ownership of the emitter line. Call [`DustSensor::init`] before
    /// the first measurement.
    pub fn new(led: LED, config: DustConfig) -> Self {
        Self { led, config }
    }

    /// Conversion parameters in use.
    pub fn config(&self) -> &DustConfig {
        &self.config
    }

    /// Switch the emitter off.
    pub fn init(&mut self) -> Result<()> {
        self.led.set_high().map_err(|_| Error::Excitation)
    }

    /// Pulse the emitter and sample the output.
    ///
    /// The emitter is switched off again even if the conversion failed.
    pub fn measure<I2C, D>(
        &mut self,
        adc: &mut Ads1115,
        i2c: &mut I2C,
        delay: &mut D,
    ) -> Result<DustSample>
    where
        I2C: I2c,
        D: DelayNs,
    {
        self.led.set_low().map_err(|_| Error::Excitation)?;
        delay.delay_us(self.config.settle_us);

        let code = adc.read_single(i2c, delay, self.config.channel);
        let off = self.led.set_high().map_err(|_| Error::Excitation);

        let code = code?;
        off?;
        Ok(self.config.concentration(code))
    }

    /// Destroys the channel and returns the emitter line.
    pub fn release(self) -> LED {
        self.led
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::{
        MockError,
        delay::NoopDelay as DelayMock,
        digital::{Mock as PinMock, State as PinState, Transaction as PinTransaction},
        i2c::{Mock as I2cMock, Transaction as I2cTransaction},
    };

    /// ADC code of `mv` millivolts on the ±6.144 V range.
    fn code(mv: i32) -> i16 {
        (mv * 32768 / 6144) as i16
    }

    #[test]
    fn test_concentration_below_and_at_offset() {
        let config = DustConfig::default();

        assert_eq!(config.concentration(0), DustSample { raw: 0, ugm3: 0 });
        assert_eq!(config.concentration(code(300)).ugm3, 0);
        assert_eq!(config.concentration(code(600)), DustSample { raw: 3200, ugm3: 0 });
    }

    #[test]
    fn test_concentration_above_offset() {
        let config = DustConfig::default();

        assert_eq!(config.concentration(code(606)).ugm3, 1);
        assert_eq!(config.concentration(code(1500)), DustSample { raw: 8000, ugm3: 150 });
        assert_eq!(config.concentration(code(3600)).ugm3, 500);
    }

    #[test]
    fn test_concentration_is_clamped() {
        let config = DustConfig::default();

        assert_eq!(config.concentration(i16::MAX).ugm3, 500);
        assert_eq!(config.concentration(code(4000)).ugm3, 500);
        assert_eq!(config.concentration(-1200), DustSample { raw: 0, ugm3: 0 });
    }

    #[test]
    fn test_init() {
        let mut led = PinMock::new(&[PinTransaction::set(PinState::High)]);
        let mut sensor = DustSensor::new(led.clone(), DustConfig::default());

        sensor.init().unwrap();

        led.done();
    }

    #[test]
    fn test_measure() {
        let mut led = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let expectations = [
            I2cTransaction::write(0x48, vec![0x01, 0xD1, 0x83]),
            I2cTransaction::write(0x48, vec![0x00]),
            I2cTransaction::read(0x48, vec![0x1F, 0x40]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = DelayMock::new();
        let mut adc = Ads1115::new();
        let mut sensor = DustSensor::new(led.clone(), DustConfig::default());

        let sample = sensor.measure(&mut adc, &mut i2c, &mut delay).unwrap();

        assert_eq!(sample, DustSample { raw: 8000, ugm3: 150 });
        i2c.done();
        led.done();
    }

    #[test]
    fn test_emitter_is_switched_off_after_failure() {
        let mut led = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let expectations =
            [I2cTransaction::write(0x48, vec![0x01, 0xD1, 0x83]).with_error(ErrorKind::Bus)];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = DelayMock::new();
        let mut adc = Ads1115::new();
        let mut sensor = DustSensor::new(led.clone(), DustConfig::default());

        let result = sensor.measure(&mut adc, &mut i2c, &mut delay);

        assert_eq!(result, Err(Error::Write(ErrorKind::Bus)));
        i2c.done();
        led.done();
    }

    #[test]
    fn test_emitter_failure() {
        let mut led = PinMock::new(&[PinTransaction::set(PinState::Low)
            .with_error(MockError::Io(std::io::ErrorKind::Other))]);
        let mut i2c = I2cMock::new(&[]);
        let mut delay = DelayMock::new();
        let mut adc = Ads1115::new();
        let mut sensor = DustSensor::new(led.clone(), DustConfig::default());

        let result = sensor.measure(&mut adc, &mut i2c, &mut delay);

        assert_eq!(result, Err(Error::Excitation));
        i2c.done();
        led.done();
    }
}
