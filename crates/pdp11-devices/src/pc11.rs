//! PC11 paper-tape reader.
//!
//! One byte per GO: the reader pulls the next byte of a user-named tape
//! image through the transfer engine (op 5) and latches it in the buffer.
//! Running off the end of the tape reads past the image and the fetch fails,
//! which sets ERROR.

use crate::drive::{DeviceKind, Drive, FetchResult};
use crate::interrupts::Hook;
use crate::xfer::{self, IoStart, Transfer, XferCode, XferOp};
use crate::DeviceCtx;

pub const PC11_VECTOR: u16 = 0o70;
pub const PC11_LEVEL: u8 = 4;

const PRS_GO: u16 = 0o1;
const PRS_IE: u16 = 0o100;
const PRS_DONE: u16 = 0o200;
const PRS_BUSY: u16 = 0o4000;
const PRS_ERROR: u16 = 0o100000;

pub struct Pc11 {
    pub prs: u16,
    pub prb: u16,
    tape: Option<Drive>,
}

impl Pc11 {
    pub fn new() -> Self {
        Self {
            prs: 0,
            prb: 0,
            tape: None,
        }
    }

    pub fn reset(&mut self) {
        self.prs = 0;
        self.prb = 0;
        if let Some(tape) = &mut self.tape {
            tape.abort();
        }
    }

    /// Load a tape by image name and rewind. Clears ERROR.
    pub fn set_tape(&mut self, name: &str) {
        let mut tape = Drive::new(DeviceKind::Ptr, 0, "tap", false);
        tape.url = name.to_string();
        self.tape = Some(tape);
        self.prs &= !PRS_ERROR;
    }

    pub fn tape(&mut self) -> Option<&mut Drive> {
        self.tape.as_mut()
    }

    pub fn peek(&self, reg: usize) -> u16 {
        match reg {
            0 => self.prs,
            1 => self.prb,
            _ => 0,
        }
    }

    pub fn read(&mut self, reg: usize) -> u16 {
        match reg {
            0 => self.prs,
            1 => {
                self.prs &= !PRS_DONE;
                self.prb
            }
            _ => 0,
        }
    }

    pub fn write(&mut self, reg: usize, value: u16, ctx: &mut DeviceCtx) {
        match reg {
            0 => {
                self.prs = (self.prs & !PRS_IE) | (value & PRS_IE);
                if value & PRS_GO != 0 && self.prs & (PRS_ERROR | PRS_BUSY) == 0 {
                    self.go(ctx);
                }
            }
            1 => {} // reader buffer is read-only
            _ => {}
        }
    }

    fn go(&mut self, ctx: &mut DeviceCtx) {
        let Some(tape) = self.tape.as_mut() else {
            self.prs |= PRS_ERROR;
            return;
        };
        self.prs = (self.prs & !PRS_DONE) | PRS_BUSY;
        let xfer = Transfer {
            op: XferOp::ReadByte,
            position: tape.position,
            address: 0,
            count: 1,
        };
        match xfer::start_io(DeviceKind::Ptr, tape, xfer, ctx) {
            IoStart::Complete(code, xfer) => self.end(code, xfer, ctx),
            IoStart::Suspended => {}
        }
    }

    fn end(&mut self, code: XferCode, xfer: Transfer, ctx: &mut DeviceCtx) {
        self.prs &= !PRS_BUSY;
        self.prs |= PRS_DONE;
        match code {
            XferCode::Ok => {
                self.prb = (xfer.address & 0xFF) as u16;
                if let Some(tape) = self.tape.as_mut() {
                    tape.position = xfer.position;
                }
            }
            _ => self.prs |= PRS_ERROR,
        }
        ctx.irq
            .request(0, PC11_LEVEL, PC11_VECTOR, 0, Some(Hook::PtrIntr));
    }

    /// Byte-ready interrupt gate ([`Hook::PtrIntr`]).
    pub fn intr(&self) -> bool {
        self.prs & PRS_IE != 0
    }

    pub fn fetch_complete(&mut self, result: &FetchResult, ctx: &mut DeviceCtx) {
        let Some(tape) = self.tape.as_mut() else {
            return;
        };
        if let Some((code, xfer)) = xfer::finish_fetch(DeviceKind::Ptr, tape, result, ctx) {
            self.end(code, xfer, ctx);
        }
    }
}

impl Default for Pc11 {
    fn default() -> Self {
        Self::new()
    }
}
