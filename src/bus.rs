//! # Two-wire bus master
//!
//! A bit-banged bus master that toggles the clock and data lines directly
//! through the `embedded-hal` digital traits. No bus peripheral is required.
//!
//! The data line has to behave like an open-drain pin: driving it high
//! releases it to the pull-up, and reading it samples the wire (which a
//! responder may be holding low).
//!
//! The engine can be driven byte by byte through [`BitBangI2c::start`],
//! [`BitBangI2c::write_byte`], [`BitBangI2c::read_byte`] and
//! [`BitBangI2c::stop`], through a [`BusSession`] guard that guarantees the
//! STOP, or through the [`embedded_hal::i2c::I2c`] trait like any other bus.
//!
//! ## Acknowledge handling
//!
//! After the eighth bit of a written byte the data line is released and
//! polled up to [`BusConfig::ack_poll_limit`] times while the clock is high:
//!
//! * the line never goes low: [`Ack::TimedOut`], a bus-level fault that
//!   latches [`BitBangI2c::fault_latched`];
//! * the line goes low and is still low at the sample that follows:
//!   [`Ack::Acked`];
//! * the line goes low but was released again at the sample:
//!   [`Ack::NotAcked`].
//!
//! A timeout only aborts the byte. The caller still has to close the
//! transaction with a STOP.
//!
//! ## Example
//!
//! ```rust
//! use envmon::bus::BitBangI2c;
//! use embedded_hal::i2c::I2c;
//! # use embedded_hal_mock::eh1::delay::NoopDelay;
//! # use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};
//! # let scl = PinMock::new(&[Transaction::set(State::High)]);
//! # let sda = PinMock::new(&[Transaction::set(State::High)]);
//!
//! let mut bus = BitBangI2c::new(scl, sda, NoopDelay::new());
//! bus.init().unwrap();
//! // `bus` can now be handed to any embedded-hal I2C driver
//! # let (mut scl, mut sda, _) = bus.release();
//! # scl.done();
//! # sda.done();
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};

use crate::timing::{NoWatchdog, Timing};

/// Data setup time before a rising clock edge, in microseconds.
const SETUP_US: u32 = 2;

/// Clock high time, and START/STOP hold time, in microseconds.
const HOLD_US: u32 = 5;

/// Default number of polls of the data line while waiting for an acknowledge.
pub const DEFAULT_ACK_POLL_LIMIT: u16 = 200;

/// Shorthand for all functions of the bus engine.
type BusResult<T> = core::result::Result<T, BusError>;

/// Tunables of the bus engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// How often the data line is polled for an acknowledge before the
    /// transfer counts as timed out. At least 1.
    pub ack_poll_limit: u16,
}

impl BusConfig {
    /// Default configuration.
    pub const fn new() -> Self {
        Self {
            ack_poll_limit: DEFAULT_ACK_POLL_LIMIT,
        }
    }

    /// Replace the acknowledge poll limit (values below 1 are raised to 1).
    pub const fn with_ack_poll_limit(mut self, limit: u16) -> Self {
        self.ack_poll_limit = if limit == 0 { 1 } else { limit };
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Framing state of the engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    /// Both lines released, no transaction in flight.
    Idle,
    /// A START has been issued and the bus is held until the next STOP.
    Started,
}

/// Acknowledge outcome of a single byte transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    /// The receiver pulled the data line low.
    Acked,
    /// The receiver declined the byte.
    NotAcked,
    /// The acknowledge never arrived within the bounded wait.
    TimedOut,
}

impl Ack {
    /// Whether the byte was acknowledged.
    pub fn is_acked(self) -> bool {
        self == Ack::Acked
    }
}

/// Outcome of one byte transfer: the 8 bits moved and the acknowledge.
///
/// For reads, `ack` records what the master sent back.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
    pub byte: u8,
    pub ack: Ack,
}

/// Represents any error of the bus engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum BusError {
    /// One of the lines could not be driven or sampled.
    #[cfg_attr(feature = "std", error("A bus line could not be driven or sampled"))]
    Line,
    /// A byte was explicitly not acknowledged.
    #[cfg_attr(feature = "std", error("The device did not acknowledge ({0:?})"))]
    NoAcknowledge(NoAcknowledgeSource),
    /// The acknowledge never arrived within the bounded wait.
    #[cfg_attr(feature = "std", error("Timed out waiting for an acknowledge"))]
    Timeout,
    /// The operation is not allowed in the current framing state.
    #[cfg_attr(
        feature = "std",
        error("The bus is in a state that does not permit this operation")
    )]
    InvalidState,
}

impl i2c::Error for BusError {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::Line | BusError::Timeout => ErrorKind::Bus,
            BusError::NoAcknowledge(source) => ErrorKind::NoAcknowledge(*source),
            BusError::InvalidState => ErrorKind::Other,
        }
    }
}

/// Represents a bit-banged two-wire bus master.
#[derive(Debug)]
pub struct BitBangI2c<SCL, SDA, D> {
    /// Clock line (output only, no clock stretching).
    scl: SCL,

    /// Open-drain data line.
    sda: SDA,

    /// Short edge-to-edge waits, never longer than a few microseconds.
    timing: Timing<D, NoWatchdog>,

    config: BusConfig,

    state: BusState,

    /// Sticky bus-fault indicator, raised by acknowledge timeouts.
    fault: bool,
}

impl<SCL, SDA, D> BitBangI2c<SCL, SDA, D>
where
    SCL: OutputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    /// Creates a bus master with the default configuration.
    pub fn new(scl: SCL, sda: SDA, delay: D) -> Self {
        Self::with_config(scl, sda, delay, BusConfig::default())
    }

    /// Creates a bus master with an explicit configuration.
    pub fn with_config(scl: SCL, sda: SDA, delay: D, config: BusConfig) -> Self {
        Self {
            scl,
            sda,
            timing: Timing::new(delay, NoWatchdog),
            config,
            state: BusState::Idle,
            fault: false,
        }
    }

    /// Release both lines to their idle-high level.
    pub fn init(&mut self) -> BusResult<()> {
        self.sda_high()?;
        self.scl_high()?;
        self.state = BusState::Idle;
        Ok(())
    }

    /// Current framing state.
    pub fn state(&self) -> BusState {
        self.state
    }

    /// Whether an acknowledge timeout happened since the last `clear_fault`.
    pub fn fault_latched(&self) -> bool {
        self.fault
    }

    /// Reset the sticky bus-fault indicator.
    pub fn clear_fault(&mut self) {
        self.fault = false;
    }

    /// Issue a START and return a guard that issues the STOP.
    pub fn session(&mut self) -> BusResult<BusSession<'_, SCL, SDA, D>> {
        match self.start() {
            Ok(()) => Ok(BusSession {
                bus: self,
                open: true,
            }),
            // Someone else's bracket, leave it alone
            Err(BusError::InvalidState) => Err(BusError::InvalidState),
            Err(e) => {
                let _ = self.stop();
                Err(e)
            }
        }
    }

    /// Issue a START condition.
    ///
    /// The bus counts as held from the first edge on, so `stop` has to be
    /// called even if this returns an error.
    pub fn start(&mut self) -> BusResult<()> {
        if self.state != BusState::Idle {
            return Err(BusError::InvalidState);
        }
        self.state = BusState::Started;
        self.start_condition()
    }

    /// Issue a repeated START within a held transaction.
    fn restart(&mut self) -> BusResult<()> {
        self.check_started()?;
        self.start_condition()
    }

    fn start_condition(&mut self) -> BusResult<()> {
        self.sda_high()?;
        self.scl_high()?;
        self.timing.wait_us(HOLD_US);

        // Data falls while the clock is high
        self.sda_low()?;
        self.timing.wait_us(HOLD_US);

        self.scl_low()
    }

    /// Issue a STOP condition and return to `Idle`. Does nothing when idle.
    pub fn stop(&mut self) -> BusResult<()> {
        if self.state == BusState::Idle {
            return Ok(());
        }
        // A failing line must not keep the engine out of `start` forever
        self.state = BusState::Idle;

        self.sda_low()?;
        self.scl_high()?;
        self.timing.wait_us(HOLD_US);

        // Data rises while the clock is high
        self.sda_high()?;
        self.timing.wait_us(HOLD_US);
        Ok(())
    }

    /// Send the 7-bit `address` followed by the direction bit.
    pub fn write_address(&mut self, address: u8, read: bool) -> BusResult<Transfer> {
        self.write_byte((address << 1) | read as u8)
    }

    /// Clock out one byte, most significant bit first, and sample the
    /// acknowledge.
    pub fn write_byte(&mut self, byte: u8) -> BusResult<Transfer> {
        self.check_started()?;

        for bit in (0..8).rev() {
            self.set_sda(byte & (1 << bit) != 0)?;
            self.timing.wait_us(SETUP_US);
            self.scl_high()?;
            self.timing.wait_us(HOLD_US);
            self.scl_low()?;
        }

        // Hand the data line to the receiver
        self.sda_high()?;
        self.timing.wait_us(SETUP_US);
        self.scl_high()?;
        let ack = self.sample_ack()?;
        self.timing.wait_us(HOLD_US);
        self.scl_low()?;

        if ack == Ack::TimedOut {
            warn!("Acknowledge timed out for byte {}", byte);
            self.fault = true;
        }

        Ok(Transfer { byte, ack })
    }

    /// Clock in one byte, most significant bit first, and answer with an
    /// acknowledge (`send_ack`) or a not-acknowledge for the last byte.
    pub fn read_byte(&mut self, send_ack: bool) -> BusResult<Transfer> {
        self.check_started()?;

        self.sda_high()?;
        let mut byte = 0u8;
        for _ in 0..8 {
            self.timing.wait_us(SETUP_US);
            self.scl_high()?;
            byte <<= 1;
            if self.sda.is_high().map_err(|_| BusError::Line)? {
                byte |= 0x01;
            }
            self.timing.wait_us(HOLD_US);
            self.scl_low()?;
        }

        // Low acknowledges, high declines
        self.set_sda(!send_ack)?;
        self.timing.wait_us(SETUP_US);
        self.scl_high()?;
        self.timing.wait_us(HOLD_US);
        self.scl_low()?;
        self.sda_high()?;

        let ack = if send_ack { Ack::Acked } else { Ack::NotAcked };
        Ok(Transfer { byte, ack })
    }

    /// Destroys the engine and returns the clock line, the data line and the
    /// delay.
    pub fn release(self) -> (SCL, SDA, D) {
        let (delay, _) = self.timing.release();
        (self.scl, self.sda, delay)
    }

    /// Poll the released data line for the receiver's acknowledge.
    fn sample_ack(&mut self) -> BusResult<Ack> {
        let mut asserted = false;
        for _ in 0..self.config.ack_poll_limit {
            if self.sda.is_low().map_err(|_| BusError::Line)? {
                asserted = true;
                break;
            }
        }

        if !asserted {
            return Ok(Ack::TimedOut);
        }

        if self.sda.is_low().map_err(|_| BusError::Line)? {
            Ok(Ack::Acked)
        } else {
            Ok(Ack::NotAcked)
        }
    }

    fn check_started(&self) -> BusResult<()> {
        if self.state != BusState::Started {
            return Err(BusError::InvalidState);
        }
        Ok(())
    }

    fn run_operations(&mut self, address: u8, operations: &mut [Operation<'_>]) -> BusResult<()> {
        let mut previous: Option<bool> = None;

        for index in 0..operations.len() {
            let is_read = matches!(operations[index], Operation::Read(_));
            let read_follows = matches!(operations.get(index + 1), Some(Operation::Read(_)));

            if previous != Some(is_read) {
                if previous.is_none() {
                    self.start()?;
                } else {
                    self.restart()?;
                }
                let transfer = self.write_address(address, is_read)?;
                check_ack(transfer.ack, NoAcknowledgeSource::Address)?;
            }

            match &mut operations[index] {
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        let transfer = self.write_byte(byte)?;
                        check_ack(transfer.ack, NoAcknowledgeSource::Data)?;
                    }
                }
                Operation::Read(buffer) => {
                    let len = buffer.len();
                    for (position, slot) in buffer.iter_mut().enumerate() {
                        // Only the very last byte before a direction change or STOP is declined
                        let send_ack = read_follows || position + 1 < len;
                        *slot = self.read_byte(send_ack)?.byte;
                    }
                }
            }

            previous = Some(is_read);
        }

        Ok(())
    }

    fn set_sda(&mut self, high: bool) -> BusResult<()> {
        if high { self.sda_high() } else { self.sda_low() }
    }

    fn sda_high(&mut self) -> BusResult<()> {
        self.sda.set_high().map_err(|_| BusError::Line)
    }

    fn sda_low(&mut self) -> BusResult<()> {
        self.sda.set_low().map_err(|_| BusError::Line)
    }

    fn scl_high(&mut self) -> BusResult<()> {
        self.scl.set_high().map_err(|_| BusError::Line)
    }

    fn scl_low(&mut self) -> BusResult<()> {
        self.scl.set_low().map_err(|_| BusError::Line)
    }
}

/// Map an acknowledge outcome to the bus error it implies.
fn check_ack(ack: Ack, source: NoAcknowledgeSource) -> BusResult<()> {
    match ack {
        Ack::Acked => Ok(()),
        Ack::NotAcked => Err(BusError::NoAcknowledge(source)),
        Ack::TimedOut => Err(BusError::Timeout),
    }
}

impl<SCL, SDA, D> i2c::ErrorType for BitBangI2c<SCL, SDA, D> {
    type Error = BusError;
}

impl<SCL, SDA, D> I2c<SevenBitAddress> for BitBangI2c<SCL, SDA, D>
where
    SCL: OutputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> BusResult<()> {
        // Someone else's bracket, leave it alone
        if self.state != BusState::Idle {
            return Err(BusError::InvalidState);
        }
        let result = self.run_operations(address, operations);
        // The bus is released no matter how the operations went
        let stopped = self.stop();
        result.and(stopped)
    }
}

/// One START…STOP bracket on the bus.
///
/// Dropping the session without calling [`BusSession::close`] still issues
/// the STOP (ignoring line errors).
pub struct BusSession<'a, SCL, SDA, D>
where
    SCL: OutputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    bus: &'a mut BitBangI2c<SCL, SDA, D>,
    open: bool,
}

impl<SCL, SDA, D> BusSession<'_, SCL, SDA, D>
where
    SCL: OutputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    /// See [`BitBangI2c::write_address`].
    pub fn write_address(&mut self, address: u8, read: bool) -> BusResult<Transfer> {
        self.bus.write_address(address, read)
    }

    /// See [`BitBangI2c::write_byte`].
    pub fn write_byte(&mut self, byte: u8) -> BusResult<Transfer> {
        self.bus.write_byte(byte)
    }

    /// See [`BitBangI2c::read_byte`].
    pub fn read_byte(&mut self, send_ack: bool) -> BusResult<Transfer> {
        self.bus.read_byte(send_ack)
    }

    /// Issue the STOP and end the session.
    pub fn close(mut self) -> BusResult<()> {
        self.open = false;
        self.bus.stop()
    }
}

impl<SCL, SDA, D> Drop for BusSession<'_, SCL, SDA, D>
where
    SCL: OutputPin,
    SDA: OutputPin + InputPin,
    D: DelayNs,
{
    fn drop(&mut self) {
        if self.open {
            let _ = self.bus.stop();
        }
    }
}
