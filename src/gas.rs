//! # Combustible gas sensor
//!
//! The analog output is noisy, so every sample passes a trimmed-mean filter
//! over the last four raw codes before it is converted to a concentration.
//!
//! The filter starts zero-filled: the first three outputs after power-up are
//! biased low.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use heapless::HistoryBuffer;

use crate::Result;
use crate::ads1115::{Ads1115, Channel};

/// Number of samples the filter averages over (before trimming).
pub const WINDOW_LEN: usize = 4;

/// Ring of the most recent raw gas codes.
#[derive(Clone, Debug)]
pub struct FilterWindow {
    samples: HistoryBuffer<u16, WINDOW_LEN>,
}

impl FilterWindow {
    /// Window filled with zeros.
    pub fn new() -> Self {
        Self {
            samples: HistoryBuffer::new_with(0),
        }
    }

    /// Replace the oldest sample with `value` and return the mean of the
    /// window without its largest and smallest entry.
    pub fn push(&mut self, value: u16) -> u16 {
        self.samples.write(value);

        let mut sum = 0u32;
        let mut min = u16::MAX;
        let mut max = u16::MIN;
        for &sample in self.samples.as_slice() {
            sum += sample as u32;
            min = min.min(sample);
            max = max.max(sample);
        }

        let trimmed = sum - min as u32 - max as u32;
        (trimmed / (WINDOW_LEN as u32 - 2)) as u16
    }

    /// Current contents, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &u16> {
        self.samples.oldest_ordered()
    }
}

impl Default for FilterWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters of the gas channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GasConfig {
    pub channel: Channel,
    /// Raw codes are clamped to this value before entering the filter.
    pub raw_ceiling: u16,
    /// Filtered codes at or below this count as clean air.
    pub zero_threshold: u16,
    /// Codes per concentration unit.
    pub divisor: u16,
    /// Upper bound of the reported concentration.
    pub max_ppm: u16,
}

impl GasConfig {
    pub const fn new() -> Self {
        Self {
            channel: Channel::A0,
            raw_ceiling: 32767,
            zero_threshold: 150,
            divisor: 33,
            max_ppm: 1000,
        }
    }

    /// Convert a filtered code into a concentration.
    pub fn concentration(&self, filtered: u16) -> u16 {
        if filtered <= self.zero_threshold {
            return 0;
        }
        let ppm = (filtered - self.zero_threshold) / self.divisor.max(1);
        ppm.min(self.max_ppm)
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One gas measurement.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GasSample {
    /// ADC code, negative codes clamped to zero.
    pub raw: u16,
    /// Output of the trimmed-mean filter.
    pub filtered: u16,
    pub ppm: u16,
}

/// Gas channel: filter state plus conversion parameters.
#[derive(Clone, Debug)]
pub struct GasSensor {
    window: FilterWindow,
    config: GasConfig,
}

impl GasSensor {
    /// Sensor with an empty (zero-filled) filter window.
    pub fn new(config: GasConfig) -> Self {
        Self {
            window: FilterWindow::new(),
            config,
        }
    }

    /// Conversion parameters in use.
    pub fn config(&self) -> &GasConfig {
        &self.config
    }

    /// The filter state carried across cycles.
    pub fn window(&self) -> &FilterWindow {
        &self.window
    }

    /// Sample the sensor and run the result through the filter.
    ///
    /// A failed conversion leaves the filter untouched.
    pub fn measure<I2C, D>(
        &mut self,
        adc: &mut Ads1115,
        i2c: &mut I2C,
        delay: &mut D,
    ) -> Result<GasSample>
    where
        I2C: I2c,
        D: DelayNs,
    {
        let code = adc.read_single(i2c, delay, self.config.channel)?;
        Ok(self.process(code))
    }

    /// Feed a raw code through the filter and conversion.
    pub fn process(&mut self, code: i16) -> GasSample {
        let raw = code.max(0) as u16;
        let filtered = self.window.push(raw.min(self.config.raw_ceiling));

        GasSample {
            raw,
            filtered,
            ppm: self.config.concentration(filtered),
        }
    }
}

impl Default for GasSensor {
    fn default() -> Self {
        Self::new(GasConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::{
        delay::NoopDelay as DelayMock,
        i2c::{Mock as I2cMock, Transaction as I2cTransaction},
    };

    #[test]
    fn test_trimmed_mean_drops_outliers() {
        let mut window = FilterWindow::new();
        for value in [100, 102, 101] {
            window.push(value);
        }

        assert_eq!(window.push(5000), 101);
    }

    #[test]
    fn test_window_starts_zero_filled() {
        let mut window = FilterWindow::new();
        assert!(window.samples().all(|&sample| sample == 0));

        // {0, 0, 0, 1000} -> (0 + 0) / 2
        assert_eq!(window.push(1000), 0);
        // {0, 0, 1000, 1000} -> (0 + 1000) / 2
        assert_eq!(window.push(1000), 500);
        assert_eq!(window.push(1000), 1000);
        assert_eq!(window.push(1000), 1000);
    }

    #[test]
    fn test_window_overwrites_oldest() {
        let mut window = FilterWindow::new();
        for value in [1, 2, 3, 4, 5] {
            window.push(value);
        }

        let samples: Vec<u16> = window.samples().copied().collect();
        assert_eq!(samples, vec![2, 3, 4, 5]);
        // {7, 3, 4, 5} -> (4 + 5) / 2
        assert_eq!(window.push(7), 4);
    }

    #[test]
    fn test_concentration() {
        let config = GasConfig::default();

        assert_eq!(config.concentration(0), 0);
        assert_eq!(config.concentration(150), 0);
        assert_eq!(config.concentration(182), 0);
        assert_eq!(config.concentration(183), 1);
        assert_eq!(config.concentration(3450), 100);
        assert_eq!(config.concentration(33150), 1000);
        assert_eq!(config.concentration(u16::MAX), 1000);
    }

    #[test]
    fn test_process_clamps_into_filter() {
        let config = GasConfig {
            raw_ceiling: 1000,
            ..GasConfig::default()
        };
        let mut sensor = GasSensor::new(config);

        let sample = sensor.process(-20);
        assert_eq!(sample, GasSample { raw: 0, filtered: 0, ppm: 0 });

        sensor.process(20_000);
        sensor.process(20_000);
        let sample = sensor.process(20_000);
        // The raw code is reported as read, the filter only sees the ceiling
        assert_eq!(sample.raw, 20_000);
        assert_eq!(sample.filtered, 1000);
        assert_eq!(sample.ppm, (1000 - 150) / 33);
    }

    #[test]
    fn test_measure() {
        let expectations = [
            I2cTransaction::write(0x48, vec![0x01, 0xC1, 0x83]),
            I2cTransaction::write(0x48, vec![0x00]),
            I2cTransaction::read(0x48, vec![0x0D, 0x7A]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = DelayMock::new();
        let mut adc = Ads1115::new();
        let mut sensor = GasSensor::default();

        let sample = sensor.measure(&mut adc, &mut i2c, &mut delay).unwrap();

        assert_eq!(
            sample,
            GasSample {
                raw: 3450,
                filtered: 0,
                ppm: 0,
            }
        );
        i2c.done();
    }

    #[test]
    fn test_failed_measurement_leaves_filter_untouched() {
        let expectations =
            [I2cTransaction::write(0x48, vec![0x01, 0xC1, 0x83]).with_error(ErrorKind::Bus)];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = DelayMock::new();
        let mut adc = Ads1115::new();
        let mut sensor = GasSensor::default();
        sensor.process(400);

        let result = sensor.measure(&mut adc, &mut i2c, &mut delay);

        assert_eq!(result, Err(Error::Write(ErrorKind::Bus)));
        let samples: Vec<u16> = sensor.window().samples().copied().collect();
        assert_eq!(samples, vec![0, 0, 0, 400]);
        i2c.done();
    }
}
