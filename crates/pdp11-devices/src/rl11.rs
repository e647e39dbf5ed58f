//! RL11 cartridge disk controller (RL01/RL02 drives).
//!
//! Four units, 40 sectors per track, 256-byte sectors, two surfaces. The
//! drive type is configured per unit by cylinder count (RL01 256, RL02 512).
//! A function starts when the CSR is written with CRDY clear while the
//! controller is ready; errors accumulate in the CSR until a get-status
//! command with the reset flag clears them.

use crate::drive::{DeviceKind, Drive, FetchResult};
use crate::interrupts::Hook;
use crate::xfer::{self, IoStart, Transfer, XferCode, XferOp};
use crate::DeviceCtx;

pub const RL11_VECTOR: u16 = 0o160;
pub const RL11_LEVEL: u8 = 5;

pub const SECTORS_PER_TRACK: u16 = 40;
pub const SECTOR_BYTES: u32 = 256;
pub const RL01_CYLINDERS: u16 = 256;
pub const RL02_CYLINDERS: u16 = 512;

const RLCS_DRDY: u16 = 0o1;
const RLCS_FN: u16 = 0o16;
const RLCS_BA: u16 = 0o60; // address bits 17:16
const RLCS_IE: u16 = 0o100;
const RLCS_CRDY: u16 = 0o200;
const RLCS_DS: u16 = 0o1400; // unit select
const RLCS_OPI: u16 = 0o2000;
const RLCS_DCRC: u16 = 0o4000;
const RLCS_HNF: u16 = 0o10000;
const RLCS_NXM: u16 = 0o20000;
const RLCS_ERRS: u16 = 0o76000; // bits 14:10
const RLCS_ERR: u16 = 0o100000;

// Get-status drive state: lock on, brush home, heads out; head select in
// bit 6, drive type in bit 7.
const RL_STATUS_READY: u16 = 0o35;
const RL_STATUS_RL02: u16 = 0o200;

const FN_NOP: u16 = 0;
const FN_WRITE_CHECK: u16 = 1;
const FN_GET_STATUS: u16 = 2;
const FN_SEEK: u16 = 3;
const FN_READ_HEADER: u16 = 4;
const FN_WRITE: u16 = 5;
const FN_READ: u16 = 6;
const FN_READ_NO_HEADER: u16 = 7;

// DAR fields for data functions: cylinder/head in 15:6, sector in 5:0.
// Seek uses the difference format: direction in bit 2, head in bit 4,
// cylinder difference in 15:7.
const DAR_SECTOR: u16 = 0o77;
const DAR_SEEK_DIR: u16 = 0o4;
const DAR_SEEK_HEAD: u16 = 0o20;

pub struct Rl11 {
    pub csr: u16,
    pub bar: u16,
    pub dar: u16,
    pub mpr: u16,
    /// Cylinder count per unit; zero marks a non-existent drive.
    cylinders: [u16; 4],
    /// Current head position per unit, in visible-DAR layout
    /// (cylinder << 7 | head << 6). Distinct from the programmed `dar`.
    head_position: [u16; 4],
    drives: [Option<Drive>; 4],
}

impl Rl11 {
    pub fn new(cylinders: [u16; 4]) -> Self {
        let mut rl = Self {
            csr: 0,
            bar: 0,
            dar: 0,
            mpr: 0,
            cylinders,
            head_position: [0; 4],
            drives: Default::default(),
        };
        rl.reset();
        rl
    }

    pub fn reset(&mut self) {
        self.csr = RLCS_CRDY;
        self.bar = 0;
        self.dar = 0;
        self.mpr = 0;
        for drive in self.drives.iter_mut().flatten() {
            drive.abort();
        }
    }

    pub fn drive(&mut self, unit: usize) -> &mut Drive {
        self.drives[unit].get_or_insert_with(|| Drive::new(DeviceKind::Rl, unit, "dsk", true))
    }

    fn selected_unit(&self) -> usize {
        ((self.csr & RLCS_DS) >> 8) as usize
    }

    fn set_error(&mut self, bit: u16) {
        self.csr |= bit | RLCS_ERR;
    }

    pub fn peek(&self, reg: usize) -> u16 {
        match reg {
            0 => {
                let drdy = if self.cylinders[self.selected_unit()] > 0 {
                    RLCS_DRDY
                } else {
                    0
                };
                (self.csr & !RLCS_DRDY) | drdy
            }
            1 => self.bar,
            2 => self.dar,
            3 => self.mpr,
            _ => 0,
        }
    }

    pub fn read(&mut self, reg: usize) -> u16 {
        self.peek(reg)
    }

    pub fn write(&mut self, reg: usize, value: u16, ctx: &mut DeviceCtx) {
        match reg {
            0 => {
                let was_ready = self.csr & RLCS_CRDY != 0;
                self.csr = (self.csr & (RLCS_ERRS | RLCS_ERR | RLCS_DRDY)) | (value & 0o1776);
                if was_ready && value & RLCS_CRDY == 0 {
                    self.execute(ctx);
                }
            }
            1 => self.bar = value & !1,
            2 => self.dar = value,
            3 => self.mpr = value,
            _ => {}
        }
    }

    fn execute(&mut self, ctx: &mut DeviceCtx) {
        let func = (self.csr & RLCS_FN) >> 1;
        let unit = self.selected_unit();
        tracing::debug!(func, unit, dar = self.dar, "rl11 command");

        match func {
            FN_NOP => self.finish(ctx),
            FN_GET_STATUS => {
                let head = (self.head_position[unit] >> 6) & 1;
                let kind = if self.cylinders[unit] >= RL02_CYLINDERS {
                    RL_STATUS_RL02
                } else {
                    0
                };
                if self.mpr & 0o10 != 0 {
                    self.csr &= !(RLCS_ERRS | RLCS_ERR);
                }
                self.mpr = RL_STATUS_READY | (head << 6) | kind;
                self.finish(ctx);
            }
            FN_SEEK => {
                let diff = self.dar >> 7;
                let head = (self.dar & DAR_SEEK_HEAD) >> 4;
                let cylinder = self.head_position[unit] >> 7;
                let max = self.cylinders[unit].saturating_sub(1);
                let new = if self.dar & DAR_SEEK_DIR != 0 {
                    (cylinder + diff).min(max)
                } else {
                    cylinder.saturating_sub(diff)
                };
                self.head_position[unit] = (new << 7) | (head << 6);
                self.finish(ctx);
            }
            FN_READ_HEADER => {
                self.mpr = self.head_position[unit];
                self.finish(ctx);
            }
            FN_WRITE_CHECK | FN_WRITE | FN_READ | FN_READ_NO_HEADER => {
                if self.cylinders[unit] == 0 {
                    self.set_error(RLCS_OPI);
                    self.finish(ctx);
                    return;
                }
                let sector = self.dar & DAR_SECTOR;
                let track = self.dar >> 6;
                if sector >= SECTORS_PER_TRACK || (self.dar >> 7) >= self.cylinders[unit] {
                    self.set_error(RLCS_HNF);
                    self.finish(ctx);
                    return;
                }
                let words = (0x10000 - u32::from(self.mpr)) & 0xFFFF;
                let op = match func {
                    FN_WRITE_CHECK => XferOp::WriteCheck,
                    FN_WRITE => XferOp::WriteMedia,
                    _ => XferOp::ReadMedia,
                };
                let xfer = Transfer {
                    op,
                    position: (u64::from(track) * u64::from(SECTORS_PER_TRACK)
                        + u64::from(sector))
                        * u64::from(SECTOR_BYTES),
                    address: (u32::from(self.csr & RLCS_BA) << 12) | u32::from(self.bar),
                    count: words * 2,
                };
                match xfer::start_io(DeviceKind::Rl, self.drive(unit), xfer, ctx) {
                    IoStart::Complete(code, xfer) => self.end(code, xfer, ctx),
                    IoStart::Suspended => {}
                }
            }
            _ => panic!("rl11: impossible function code {func}"),
        }
    }

    fn finish(&mut self, ctx: &mut DeviceCtx) {
        self.csr |= RLCS_CRDY;
        ctx.irq
            .request(0, RL11_LEVEL, RL11_VECTOR, 0, Some(Hook::RlIntr));
    }

    /// Command-end interrupt gate ([`Hook::RlIntr`]).
    pub fn intr(&self) -> bool {
        self.csr & RLCS_IE != 0
    }

    fn end(&mut self, code: XferCode, xfer: Transfer, ctx: &mut DeviceCtx) {
        let unit = self.selected_unit();

        self.bar = (xfer.address & 0xFFFF) as u16;
        self.csr = (self.csr & !RLCS_BA) | (((xfer.address >> 12) as u16) & RLCS_BA);
        self.mpr = ((0x10000 - (xfer.count / 2)) & 0xFFFF) as u16;

        let sectors_total = xfer.position / u64::from(SECTOR_BYTES);
        let track = sectors_total / u64::from(SECTORS_PER_TRACK);
        let sector = sectors_total % u64::from(SECTORS_PER_TRACK);
        self.dar = ((track as u16) << 6) | sector as u16;
        self.head_position[unit] = (track as u16) << 6;

        match code {
            XferCode::Ok => {}
            XferCode::ReadError => self.set_error(RLCS_OPI),
            XferCode::Nxm => self.set_error(RLCS_NXM),
            XferCode::Compare => self.set_error(RLCS_DCRC),
        }
        self.finish(ctx);
    }

    pub fn fetch_complete(&mut self, unit: usize, result: &FetchResult, ctx: &mut DeviceCtx) {
        let drive = self.drive(unit);
        if let Some((code, xfer)) = xfer::finish_fetch(DeviceKind::Rl, drive, result, ctx) {
            self.end(code, xfer, ctx);
        }
    }
}

impl Default for Rl11 {
    fn default() -> Self {
        Self::new([RL02_CYLINDERS; 4])
    }
}
