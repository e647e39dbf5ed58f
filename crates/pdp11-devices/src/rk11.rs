//! RK11 moving-head disk controller (RK05 drives).
//!
//! Eight units, 12 sectors per track, 512-byte sectors; an 18-bit Unibus DMA
//! address split between RKBA and RKCS bits 4-5. New work latched by a GO
//! write is dispatched through a zero-delay queue entry rather than inline:
//! the CSR write must return before the transfer starts or DOS-11
//! mis-sequences its driver.

use crate::drive::{DeviceKind, Drive, FetchResult};
use crate::interrupts::Hook;
use crate::xfer::{self, IoStart, Transfer, XferCode, XferOp};
use crate::DeviceCtx;

pub const RK11_VECTOR: u16 = 0o220;
pub const RK11_LEVEL: u8 = 5;

pub const SECTORS_PER_TRACK: u16 = 12;
pub const SECTOR_BYTES: u32 = 512;
/// Tracks per RK05 cartridge (203 cylinders x 2 surfaces).
pub const RK05_TRACKS: u16 = 406;

// RKCS bits. DONE and the error summaries are read-only; GO is momentary.
const RKCS_GO: u16 = 0o1;
const RKCS_FN: u16 = 0o16;
const RKCS_MEX: u16 = 0o60; // address bits 17:16
const RKCS_IE: u16 = 0o100;
const RKCS_RDY: u16 = 0o200;
const RKCS_SCP: u16 = 0o20000;
const RKCS_HE: u16 = 0o40000;
const RKCS_ERR: u16 = 0o100000;
const RKCS_RO: u16 = 0o170200; // bits 15:12 and RDY

// RKER bits.
const RKER_WCE: u16 = 0o1;
const RKER_NXS: u16 = 0o40;
const RKER_NXC: u16 = 0o100;
const RKER_NXD: u16 = 0o200;
const RKER_TE: u16 = 0o400;
const RKER_NXM: u16 = 0o2000;
const RKER_WLO: u16 = 0o20000;
const RKER_HARD: u16 = 0o177740; // everything above the soft CRC/WCE bits

// RKDS: drive id in 15:13, ready bits, sector counter in 3:0.
const RKDS_READY: u16 = 0o4700;
const RKDS_WPS: u16 = 0o20;

const FN_CONTROL_RESET: u16 = 0;
const FN_WRITE: u16 = 1;
const FN_READ: u16 = 2;
const FN_WRITE_CHECK: u16 = 3;
const FN_SEEK: u16 = 4;
const FN_READ_CHECK: u16 = 5;
const FN_DRIVE_RESET: u16 = 6;
const FN_WRITE_LOCK: u16 = 7;

const SEEK_DELAY: u32 = 16;

pub struct Rk11 {
    pub rkds: u16,
    pub rker: u16,
    pub rkcs: u16,
    pub rkwc: u16,
    pub rkba: u16,
    pub rkda: u16,
    /// Track count per unit; zero marks a non-existent drive.
    tracks: [u16; 8],
    write_locked: [bool; 8],
    drives: [Option<Drive>; 8],
}

impl Rk11 {
    pub fn new(tracks: [u16; 8]) -> Self {
        let mut rk = Self {
            rkds: 0,
            rker: 0,
            rkcs: 0,
            rkwc: 0,
            rkba: 0,
            rkda: 0,
            tracks,
            write_locked: [false; 8],
            drives: Default::default(),
        };
        rk.reset();
        rk
    }

    pub fn reset(&mut self) {
        self.rkds = RKDS_READY;
        self.rker = 0;
        self.rkcs = RKCS_RDY;
        self.rkwc = 0;
        self.rkba = 0;
        self.rkda = 0;
        for drive in self.drives.iter_mut().flatten() {
            drive.abort();
        }
    }

    pub fn drive(&mut self, unit: usize) -> &mut Drive {
        self.drives[unit].get_or_insert_with(|| Drive::new(DeviceKind::Rk, unit, "dsk", true))
    }

    fn selected_unit(&self) -> usize {
        ((self.rkda >> 13) & 7) as usize
    }

    pub fn peek(&self, reg: usize) -> u16 {
        match reg {
            0 => self.rkds,
            1 => self.rker,
            2 => self.rkcs,
            3 => self.rkwc,
            4 => self.rkba,
            5 => self.rkda,
            _ => 0,
        }
    }

    pub fn read(&mut self, reg: usize) -> u16 {
        self.peek(reg)
    }

    pub fn write(&mut self, reg: usize, value: u16, ctx: &mut DeviceCtx) {
        match reg {
            0 | 1 => {} // RKDS and RKER are read-only
            2 => {
                self.rkcs = (self.rkcs & RKCS_RO) | (value & !RKCS_RO & !RKCS_GO);
                if value & RKCS_GO != 0 && self.rkcs & RKCS_RDY != 0 {
                    // Busy until the deferred dispatch runs.
                    self.rkcs &= !(RKCS_RDY | RKCS_SCP);
                    ctx.irq
                        .request(0, RK11_LEVEL, RK11_VECTOR, 0, Some(Hook::RkStart));
                }
            }
            3 => self.rkwc = value,
            4 => self.rkba = value,
            5 => self.rkda = value,
            _ => {}
        }
    }

    /// Deferred GO dispatch ([`Hook::RkStart`]).
    pub fn service(&mut self, ctx: &mut DeviceCtx) -> bool {
        let func = (self.rkcs & RKCS_FN) >> 1;
        let unit = self.selected_unit();
        tracing::debug!(func, unit, rkda = self.rkda, "rk11 command");

        if func == FN_CONTROL_RESET {
            let ie = self.rkcs & RKCS_IE != 0;
            self.reset();
            ctx.irq.cancel_vector(RK11_VECTOR);
            return ie;
        }

        if self.tracks[unit] == 0 {
            return self.command_error(RKER_NXD);
        }

        let sector = self.rkda & 0o17;
        let track = (self.rkda >> 4) & 0o777;
        match func {
            FN_WRITE | FN_READ | FN_WRITE_CHECK => {
                if func == FN_WRITE && self.write_locked[unit] {
                    return self.command_error(RKER_WLO);
                }
                if sector >= SECTORS_PER_TRACK {
                    return self.command_error(RKER_NXS);
                }
                if track >= self.tracks[unit] {
                    return self.command_error(RKER_NXC);
                }
                let words = (0x10000 - u32::from(self.rkwc)) & 0xFFFF;
                let op = match func {
                    FN_WRITE => XferOp::WriteMedia,
                    FN_READ => XferOp::ReadMedia,
                    _ => XferOp::WriteCheck,
                };
                let position = (u64::from(track) * u64::from(SECTORS_PER_TRACK)
                    + u64::from(sector))
                    * u64::from(SECTOR_BYTES);
                let xfer = Transfer {
                    op,
                    position,
                    address: (u32::from(self.rkcs & RKCS_MEX) << 12) | u32::from(self.rkba),
                    count: words * 2,
                };
                match xfer::start_io(DeviceKind::Rk, self.drive(unit), xfer, ctx) {
                    IoStart::Complete(code, xfer) => self.end(code, xfer, ctx),
                    IoStart::Suspended => {}
                }
                false
            }
            FN_SEEK | FN_DRIVE_RESET => {
                let track = if func == FN_DRIVE_RESET { 0 } else { track };
                if track >= self.tracks[unit] {
                    return self.command_error(RKER_NXC);
                }
                self.rkcs |= RKCS_RDY;
                ctx.irq.request(
                    SEEK_DELAY,
                    RK11_LEVEL,
                    RK11_VECTOR,
                    unit as u8,
                    Some(Hook::RkSeekDone),
                );
                self.rkcs & RKCS_IE != 0
            }
            FN_READ_CHECK => {
                // No data path to verify against; complete immediately.
                self.rkcs |= RKCS_RDY;
                self.rkcs & RKCS_IE != 0
            }
            FN_WRITE_LOCK => {
                self.write_locked[unit] = true;
                self.rkds |= RKDS_WPS;
                self.rkcs |= RKCS_RDY;
                self.rkcs & RKCS_IE != 0
            }
            _ => panic!("rk11: impossible function code {func}"),
        }
    }

    fn command_error(&mut self, bit: u16) -> bool {
        self.rker |= bit;
        self.rkcs |= RKCS_ERR;
        if bit & RKER_HARD != 0 {
            self.rkcs |= RKCS_HE;
        }
        self.rkcs |= RKCS_RDY;
        self.rkcs & RKCS_IE != 0
    }

    /// Seek reached its cylinder ([`Hook::RkSeekDone`]).
    pub fn seek_done(&mut self, unit: u8) -> bool {
        self.rkcs |= RKCS_SCP;
        self.rkds = (u16::from(unit) << 13) | RKDS_READY | self.wps(unit as usize);
        self.rkcs & RKCS_IE != 0
    }

    /// Command-end interrupt gate ([`Hook::RkIntr`]).
    pub fn intr(&self) -> bool {
        self.rkcs & RKCS_IE != 0
    }

    fn wps(&self, unit: usize) -> u16 {
        if self.write_locked[unit] {
            RKDS_WPS
        } else {
            0
        }
    }

    fn end(&mut self, code: XferCode, xfer: Transfer, ctx: &mut DeviceCtx) {
        let unit = self.selected_unit();

        self.rkba = (xfer.address & 0xFFFF) as u16;
        self.rkcs = (self.rkcs & !RKCS_MEX) | (((xfer.address >> 12) as u16) & RKCS_MEX);
        self.rkwc = ((0x10000 - (xfer.count / 2)) & 0xFFFF) as u16;

        let sectors_total = xfer.position / u64::from(SECTOR_BYTES);
        let track = sectors_total / u64::from(SECTORS_PER_TRACK);
        let sector = sectors_total % u64::from(SECTORS_PER_TRACK);
        self.rkda = ((unit as u16) << 13) | ((track as u16) << 4) | sector as u16;
        self.rkds = ((unit as u16) << 13) | RKDS_READY | self.wps(unit) | sector as u16;

        match code {
            XferCode::Ok => {}
            XferCode::ReadError => {
                self.rker |= RKER_TE;
            }
            XferCode::Nxm => {
                self.rker |= RKER_NXM;
            }
            XferCode::Compare => {
                self.rker |= RKER_WCE;
            }
        }
        if self.rker != 0 {
            self.rkcs |= RKCS_ERR;
        }
        if self.rker & RKER_HARD != 0 {
            self.rkcs |= RKCS_HE;
        }

        self.rkcs |= RKCS_RDY | RKCS_SCP;
        ctx.irq
            .request(0, RK11_LEVEL, RK11_VECTOR, unit as u8, Some(Hook::RkIntr));
    }

    pub fn fetch_complete(&mut self, unit: usize, result: &FetchResult, ctx: &mut DeviceCtx) {
        let drive = self.drive(unit);
        if let Some((code, xfer)) = xfer::finish_fetch(DeviceKind::Rk, drive, result, ctx) {
            self.end(code, xfer, ctx);
        }
    }
}

impl Default for Rk11 {
    fn default() -> Self {
        Self::new([RK05_TRACKS; 8])
    }
}
