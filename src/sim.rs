//! Simulated two-wire responder used to test the bus engine at bit level.
//!
//! Both pins share one [`Responder`] that watches clock edges, decodes
//! START/STOP conditions and answers like a real device would.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// How the responder acknowledges bytes it receives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AckBehaviour {
    /// Pull the data line low right after the eighth bit.
    Immediate,
    /// Keep the line released for the first `n` polls of the acknowledge.
    Delayed(u32),
    /// Never acknowledge.
    Never,
    /// Pull low for a single poll only.
    Glitch,
}

#[derive(Debug)]
pub struct Responder {
    scl: bool,
    sda_master: bool,
    sda_pull: bool,

    active: bool,
    clock: u8,
    shift: u8,
    address_frame: bool,
    reading: bool,
    selected: bool,
    ack_window: bool,
    ack_polls: u32,
    sending: Option<u8>,

    pub address: u8,
    pub ack: AckBehaviour,
    /// Bytes returned to the master, `0xFF` once exhausted.
    pub tx: VecDeque<u8>,

    /// Every byte the responder acknowledged, address bytes included.
    pub received: Vec<u8>,
    /// Data line level at every rising clock edge.
    pub trace: Vec<bool>,
    /// Acknowledges the master sent for bytes it read.
    pub master_acks: Vec<bool>,
    pub starts: usize,
    pub stops: usize,
}

impl Responder {
    fn new(address: u8) -> Self {
        Self {
            scl: true,
            sda_master: true,
            sda_pull: false,
            active: false,
            clock: 0,
            shift: 0,
            address_frame: false,
            reading: false,
            selected: false,
            ack_window: false,
            ack_polls: 0,
            sending: None,
            address,
            ack: AckBehaviour::Immediate,
            tx: VecDeque::new(),
            received: Vec::new(),
            trace: Vec::new(),
            master_acks: Vec::new(),
            starts: 0,
            stops: 0,
        }
    }

    /// Wired-AND of master and responder.
    fn sda(&self) -> bool {
        self.sda_master && !self.sda_pull
    }

    /// Both lines released and no transaction open.
    pub fn is_idle(&self) -> bool {
        !self.active && self.scl && self.sda()
    }

    fn receiving(&self) -> bool {
        self.address_frame || !self.reading
    }

    fn sending_data(&self) -> bool {
        !self.address_frame && self.reading
    }

    fn drive_sda(&mut self, level: bool) {
        let before = self.sda();
        self.sda_master = level;
        let after = self.sda();
        if self.scl && before != after {
            if !after {
                self.on_start();
            } else if self.active {
                self.on_stop();
            }
        }
    }

    fn drive_scl(&mut self, level: bool) {
        if level == self.scl {
            return;
        }
        self.scl = level;
        if !self.active {
            return;
        }
        if level {
            self.on_rising();
        } else {
            self.on_falling();
        }
    }

    fn on_start(&mut self) {
        self.starts += 1;
        self.active = true;
        self.clock = 0;
        self.shift = 0;
        self.address_frame = true;
        self.selected = false;
        self.ack_window = false;
        self.sending = None;
        self.sda_pull = false;
    }

    fn on_stop(&mut self) {
        self.stops += 1;
        self.active = false;
        self.ack_window = false;
        self.sending = None;
        self.sda_pull = false;
    }

    fn on_rising(&mut self) {
        let bit = self.sda();
        self.trace.push(bit);
        if self.clock < 8 {
            if self.receiving() {
                self.shift = (self.shift << 1) | bit as u8;
            }
        } else if self.clock == 8 && self.sending_data() {
            self.master_acks.push(!bit);
        }
        self.clock += 1;
    }

    fn on_falling(&mut self) {
        match self.clock {
            // completes a START
            0 => {}
            1..=7 => {
                if self.sending_data() {
                    self.drive_bit();
                }
            }
            8 => {
                if self.receiving() {
                    self.complete_byte();
                } else {
                    // the master acknowledges
                    self.sda_pull = false;
                    self.sending = None;
                }
            }
            _ => {
                self.ack_window = false;
                self.sda_pull = false;
                let keep_sending = if self.address_frame {
                    self.reading && self.selected
                } else {
                    self.reading && self.master_acks.last() == Some(&true)
                };
                self.address_frame = false;
                self.clock = 0;
                if keep_sending {
                    self.sending = Some(self.tx.pop_front().unwrap_or(0xFF));
                    self.drive_bit();
                }
            }
        }
    }

    fn complete_byte(&mut self) {
        let byte = self.shift;
        self.shift = 0;
        if self.address_frame {
            self.selected = byte >> 1 == self.address;
            self.reading = byte & 0x01 != 0;
        }
        if !self.selected {
            return;
        }
        self.received.push(byte);
        self.ack_window = true;
        self.ack_polls = 0;
        if self.ack == AckBehaviour::Immediate {
            self.sda_pull = true;
        }
    }

    fn drive_bit(&mut self) {
        if let Some(byte) = self.sending {
            self.sda_pull = byte & (0x80 >> self.clock) == 0;
        }
    }

    /// The master samples the data line.
    fn sample(&mut self) -> bool {
        if self.ack_window && self.scl {
            self.ack_polls += 1;
            match self.ack {
                AckBehaviour::Immediate | AckBehaviour::Never => {}
                AckBehaviour::Delayed(n) => {
                    if self.ack_polls > n {
                        self.sda_pull = true;
                    }
                }
                AckBehaviour::Glitch => self.sda_pull = self.ack_polls == 1,
            }
        }
        self.sda()
    }
}

pub struct SimScl(Rc<RefCell<Responder>>);

pub struct SimSda(Rc<RefCell<Responder>>);

/// A responder at `address` and the two pins connected to it.
pub fn bus(address: u8) -> (Rc<RefCell<Responder>>, SimScl, SimSda) {
    let wire = Rc::new(RefCell::new(Responder::new(address)));
    (wire.clone(), SimScl(wire.clone()), SimSda(wire))
}

impl ErrorType for SimScl {
    type Error = Infallible;
}

impl OutputPin for SimScl {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().drive_scl(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().drive_scl(true);
        Ok(())
    }
}

impl ErrorType for SimSda {
    type Error = Infallible;
}

impl OutputPin for SimSda {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().drive_sda(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().drive_sda(true);
        Ok(())
    }
}

impl InputPin for SimSda {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.borrow_mut().sample())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow_mut().sample())
    }
}
