//! DL11 asynchronous serial lines. Unit 0 is the console.
//!
//! Each unit has a receiver CSR/buffer pair and a transmitter CSR/buffer
//! pair, with DONE in bit 7 and IE in bit 6 of each CSR. The receive vector
//! is the unit's base vector; transmit is base + 4. Input characters arriving
//! while the receiver buffer is still full are refused.

use crate::bus::Terminal;
use crate::interrupts::{Hook, InterruptQueue};

pub const DL11_CONSOLE_VECTOR: u16 = 0o60;
pub const DL11_LEVEL: u8 = 4;

const CSR_IE: u16 = 0o100;
const CSR_DONE: u16 = 0o200;

const XMIT_DELAY: u32 = 8;

#[derive(Default)]
struct DlUnit {
    rcsr: u16,
    rbuf: u16,
    xcsr: u16,
}

pub struct Dl11 {
    units: Vec<DlUnit>,
}

/// Receive vector for a unit; transmit is this plus 4.
pub fn vector(unit: usize) -> u16 {
    if unit == 0 {
        DL11_CONSOLE_VECTOR
    } else {
        0o300 + ((unit as u16 - 1) << 3)
    }
}

impl Dl11 {
    pub fn new(unit_count: usize) -> Self {
        let mut dl = Self {
            units: (0..unit_count.max(1)).map(|_| DlUnit::default()).collect(),
        };
        dl.reset();
        dl
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn reset(&mut self) {
        for unit in &mut self.units {
            unit.rcsr = 0;
            unit.rbuf = 0;
            unit.xcsr = CSR_DONE;
        }
    }

    /// Register index: 0 RCSR, 1 RBUF, 2 XCSR, 3 XBUF.
    pub fn peek(&self, unit: usize, reg: usize) -> u16 {
        let u = &self.units[unit];
        match reg {
            0 => u.rcsr,
            1 => u.rbuf,
            2 => u.xcsr,
            _ => 0,
        }
    }

    pub fn read(&mut self, unit: usize, reg: usize) -> u16 {
        match reg {
            1 => {
                self.units[unit].rcsr &= !CSR_DONE;
                self.units[unit].rbuf
            }
            _ => self.peek(unit, reg),
        }
    }

    pub fn write(
        &mut self,
        unit: usize,
        reg: usize,
        value: u16,
        term: &mut dyn Terminal,
        irq: &mut InterruptQueue,
    ) {
        let u = &mut self.units[unit];
        match reg {
            0 => {
                let enabling = value & CSR_IE != 0 && u.rcsr & CSR_IE == 0;
                u.rcsr = (u.rcsr & !CSR_IE) | (value & CSR_IE);
                if enabling && u.rcsr & CSR_DONE != 0 {
                    irq.arm(DL11_LEVEL, vector(unit));
                }
            }
            1 => {} // receiver buffer is read-only
            2 => {
                let enabling = value & CSR_IE != 0 && u.xcsr & CSR_IE == 0;
                u.xcsr = (u.xcsr & !CSR_IE) | (value & CSR_IE);
                if enabling && u.xcsr & CSR_DONE != 0 {
                    irq.arm(DL11_LEVEL, vector(unit) + 4);
                }
            }
            3 => {
                let ch = (value & 0x7F) as u8;
                if (8..127).contains(&ch) {
                    term.put(unit, ch);
                }
                u.xcsr &= !CSR_DONE;
                irq.request(
                    XMIT_DELAY,
                    DL11_LEVEL,
                    vector(unit) + 4,
                    unit as u8,
                    Some(Hook::DlXmitReady),
                );
            }
            _ => {}
        }
    }

    /// External character arrival (`dl11_input`). Returns `false` and drops
    /// the character when the receiver buffer is still full.
    pub fn input(&mut self, unit: usize, ch: u8, irq: &mut InterruptQueue) -> bool {
        if unit >= self.units.len() {
            return false;
        }
        let u = &mut self.units[unit];
        if u.rcsr & CSR_DONE != 0 {
            return false;
        }
        u.rbuf = u16::from(ch);
        u.rcsr |= CSR_DONE;
        if u.rcsr & CSR_IE != 0 {
            irq.arm(DL11_LEVEL, vector(unit));
        }
        true
    }

    /// Transmitter caught up ([`Hook::DlXmitReady`]).
    pub fn xmit_ready(&mut self, unit: u8) -> bool {
        let u = &mut self.units[unit as usize];
        u.xcsr |= CSR_DONE;
        u.xcsr & CSR_IE != 0
    }
}

impl Default for Dl11 {
    fn default() -> Self {
        Self::new(5)
    }
}
