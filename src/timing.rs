//! # Timing primitive
//!
//! Busy-wait delays at microsecond and millisecond granularity on top of any
//! [`DelayNs`] implementation, coupled to a deadman timer.
//!
//! [`Timing::wait_ms`] refreshes the watchdog at the start of every
//! millisecond it waits, so any delay built from it may run for arbitrarily
//! long. [`Timing::wait_us`] never refreshes and is therefore capped at
//! [`MAX_WAIT_US`].
//!
//! `Timing` implements [`DelayNs`] itself. Whole milliseconds are routed
//! through `wait_ms`, so handing a `Timing` to a sensor decoder makes every
//! wait the decoder performs watchdog-safe.
//!
//! ```rust
//! use envmon::timing::{FnWatchdog, Timing};
//! use embedded_hal::delay::DelayNs;
//! # use embedded_hal_mock::eh1::delay::NoopDelay;
//!
//! let mut feeds = 0;
//! let mut timing = Timing::new(NoopDelay::new(), FnWatchdog(|| feeds += 1));
//! timing.delay_ms(3);
//! drop(timing);
//! assert_eq!(feeds, 3);
//! ```

use embedded_hal::delay::DelayNs;

/// Longest microsecond busy-wait that is allowed without a watchdog refresh.
///
/// The deadman period of the target is around 16 ms.
pub const MAX_WAIT_US: u32 = 1_000;

/// A deadman timer that has to be refreshed periodically.
pub trait Watchdog {
    /// Refresh the countdown.
    fn feed(&mut self);
}

/// Watchdog stand-in for platforms (and tests) without a deadman timer.
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn feed(&mut self) {}
}

/// Adapts a closure into a [`Watchdog`].
pub struct FnWatchdog<F>(pub F);

impl<F: FnMut()> Watchdog for FnWatchdog<F> {
    fn feed(&mut self) {
        (self.0)()
    }
}

impl<W: Watchdog + ?Sized> Watchdog for &mut W {
    fn feed(&mut self) {
        (**self).feed()
    }
}

/// Calibrated busy-wait delay with an integrated watchdog refresh.
#[derive(Debug)]
pub struct Timing<D, W = NoWatchdog> {
    /// Source of the raw busy-wait.
    delay: D,

    /// Deadman timer refreshed by `wait_ms`.
    watchdog: W,
}

impl<D, W> Timing<D, W>
where
    D: DelayNs,
    W: Watchdog,
{
    /// Creates a timing primitive from a raw delay and a watchdog.
    pub fn new(delay: D, watchdog: W) -> Self {
        Self { delay, watchdog }
    }

    /// Block for approximately `us` microseconds.
    ///
    /// Requests above [`MAX_WAIT_US`] are clamped to it.
    pub fn wait_us(&mut self, us: u32) {
        let us = if us > MAX_WAIT_US {
            warn!("Clamping {} us busy-wait to {} us", us, MAX_WAIT_US);
            MAX_WAIT_US
        } else {
            us
        };
        self.delay.delay_us(us);
    }

    /// Block for approximately `ms` milliseconds, refreshing the watchdog
    /// once per millisecond.
    pub fn wait_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.watchdog.feed();
            self.delay.delay_us(1_000);
        }
    }

    /// Refresh the watchdog outside of a delay.
    pub fn feed(&mut self) {
        self.watchdog.feed();
    }

    /// Destroys the primitive and returns the raw delay and the watchdog.
    pub fn release(self) -> (D, W) {
        (self.delay, self.watchdog)
    }
}

impl<D, W> DelayNs for Timing<D, W>
where
    D: DelayNs,
    W: Watchdog,
{
    fn delay_ns(&mut self, ns: u32) {
        self.wait_ms(ns / 1_000_000);
        let rest = ns % 1_000_000;
        if rest > 0 {
            self.delay.delay_ns(rest);
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.wait_ms(us / 1_000);
        let rest = us % 1_000;
        if rest > 0 {
            self.wait_us(rest);
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.wait_ms(ms);
    }
}
