//! TM11 magnetic tape controller (SIMH-compatible `.tap` images).
//!
//! A `.tap` record is `length (32-bit LE) | data (padded to even) | length`;
//! a zero length is a tape mark, and a length with the sign bit set (or
//! all-ones) is end of medium. Reads run in two phases: a record-length
//! header decode, then the data transfer clipped to the smaller of the
//! record and the requested count. Spacing walks record framing without
//! touching memory, one record per byte-record-count increment.

use crate::drive::{DeviceKind, Drive, FetchResult};
use crate::interrupts::Hook;
use crate::xfer::{self, IoStart, Transfer, XferCode, XferOp};
use crate::DeviceCtx;

pub const TM11_VECTOR: u16 = 0o224;
pub const TM11_LEVEL: u8 = 5;

// MTS bits (read-only register).
const MTS_TUR: u16 = 0o1;
const MTS_WRL: u16 = 0o4;
const MTS_BOT: u16 = 0o20;
const MTS_SELR: u16 = 0o40;
const MTS_NXM: u16 = 0o200;
const MTS_BTE: u16 = 0o400;
const MTS_RLE: u16 = 0o1000;
const MTS_EOT: u16 = 0o2000;
const MTS_EOF: u16 = 0o40000;
const MTS_ILC: u16 = 0o100000;
const MTS_ERRS: u16 = 0o177600; // bits 15:7
const MTS_RESET: u16 = MTS_SELR | MTS_BOT | MTS_WRL | MTS_TUR;

// MTC bits.
const MTC_GO: u16 = 0o1;
const MTC_FN: u16 = 0o16;
const MTC_XBA: u16 = 0o60; // address bits 17:16
const MTC_IE: u16 = 0o100;
const MTC_RDY: u16 = 0o200;
const MTC_UNIT: u16 = 0o3400;
const MTC_DEN: u16 = 0o60000;
const MTC_ERR: u16 = 0o100000;
const MTC_WRITABLE: u16 = MTC_FN | MTC_XBA | MTC_IE | MTC_UNIT | MTC_DEN;
const MTC_RESET: u16 = MTC_DEN | MTC_RDY;

const FN_OFFLINE: u16 = 0;
const FN_READ: u16 = 1;
const FN_WRITE: u16 = 2;
const FN_WRITE_EOF: u16 = 3;
const FN_SPACE_FORWARD: u16 = 4;
const FN_SPACE_REVERSE: u16 = 5;
const FN_WRITE_IRG: u16 = 6;
const FN_REWIND: u16 = 7;

const HEADER_BYTES: u64 = 4;

/// What the in-flight transfer means to the tape state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Record-length header decode for a read.
    ReadHeader,
    /// Data phase of a read; the record framing is already known.
    ReadData { record_start: u64, length: u32 },
    /// Data phase of a write.
    WriteData { record_start: u64, length: u32 },
    /// Header decode while spacing.
    SpaceForward,
    SpaceReverse,
}

struct TapeUnit {
    meta: Drive,
    phase: Phase,
}

impl TapeUnit {
    fn new(unit: usize) -> Self {
        Self {
            meta: Drive::new(DeviceKind::Tm, unit, "tap", false),
            phase: Phase::Idle,
        }
    }
}

pub struct Tm11 {
    pub mts: u16,
    pub mtc: u16,
    pub mtbrc: u16,
    pub mtcma: u16,
    pub mtd: u16,
    pub mtrd: u16,
    unit_count: usize,
    units: Vec<Option<TapeUnit>>,
}

fn is_tape_mark(length: u32) -> bool {
    length == 0 || length & 0x8000_0000 != 0
}

fn padded(length: u32) -> u64 {
    u64::from(length + 1) & !1
}

impl Tm11 {
    pub fn new(unit_count: usize) -> Self {
        let mut units = Vec::new();
        units.resize_with(unit_count.max(1), || None);
        let mut tm = Self {
            mts: 0,
            mtc: 0,
            mtbrc: 0,
            mtcma: 0,
            mtd: 0,
            mtrd: 0,
            unit_count: unit_count.max(1),
            units,
        };
        tm.reset();
        tm
    }

    pub fn reset(&mut self) {
        self.mts = MTS_RESET;
        self.mtc = MTC_RESET;
        self.mtbrc = 0;
        self.mtcma = 0;
        self.mtd = 0;
        self.mtrd = 0;
        for unit in self.units.iter_mut().flatten() {
            unit.meta.abort();
            unit.phase = Phase::Idle;
        }
    }

    fn selected_unit(&self) -> usize {
        ((self.mtc & MTC_UNIT) >> 8) as usize
    }

    fn unit(&mut self, unit: usize) -> &mut TapeUnit {
        self.units[unit].get_or_insert_with(|| TapeUnit::new(unit))
    }

    pub fn position(&self, unit: usize) -> u64 {
        self.units[unit]
            .as_ref()
            .map(|u| u.meta.position)
            .unwrap_or(0)
    }

    pub fn drive(&mut self, unit: usize) -> &mut Drive {
        &mut self.unit(unit).meta
    }

    pub fn peek(&self, reg: usize) -> u16 {
        match reg {
            0 => {
                let unit = self.selected_unit();
                let mut mts = self.mts & !(MTS_BOT | MTS_SELR | MTS_TUR);
                if unit < self.unit_count {
                    mts |= MTS_SELR | MTS_TUR;
                    if self.position(unit) == 0 {
                        mts |= MTS_BOT;
                    }
                }
                mts
            }
            1 => {
                let errs = if self.peek(0) & MTS_ERRS != 0 {
                    MTC_ERR
                } else {
                    0
                };
                (self.mtc & !MTC_ERR) | errs
            }
            2 => self.mtbrc,
            3 => self.mtcma,
            4 => self.mtd,
            5 => self.mtrd,
            _ => 0,
        }
    }

    pub fn read(&mut self, reg: usize) -> u16 {
        self.peek(reg)
    }

    pub fn write(&mut self, reg: usize, value: u16, ctx: &mut DeviceCtx) {
        match reg {
            0 => {} // MTS is read-only
            1 => {
                self.mtc = (self.mtc & !MTC_WRITABLE) | (value & MTC_WRITABLE);
                if value & MTC_GO != 0 && self.mtc & MTC_RDY != 0 {
                    self.mtc &= !MTC_RDY;
                    self.mts &= !MTS_ERRS;
                    self.execute(ctx);
                }
            }
            2 => self.mtbrc = value,
            3 => self.mtcma = value & !1,
            4 => self.mtd = value,
            5 => self.mtrd = value,
            _ => {}
        }
    }

    fn dma_address(&self) -> u32 {
        (u32::from(self.mtc & MTC_XBA) << 12) | u32::from(self.mtcma)
    }

    fn requested_bytes(&self) -> u32 {
        (0x10000 - u32::from(self.mtbrc)) & 0xFFFF
    }

    fn execute(&mut self, ctx: &mut DeviceCtx) {
        let unit = self.selected_unit();
        let func = (self.mtc & MTC_FN) >> 1;
        tracing::debug!(func, unit, "tm11 command");

        if unit >= self.unit_count {
            self.mts |= MTS_ILC;
            self.finish(ctx);
            return;
        }

        match func {
            FN_OFFLINE => self.finish(ctx),
            FN_READ => self.read_header(unit, Phase::ReadHeader, ctx),
            FN_WRITE => {
                let length = self.requested_bytes();
                if length == 0 {
                    self.finish(ctx);
                    return;
                }
                let record_start = self.position(unit);
                let address = self.dma_address();
                let drive = self.drive(unit);
                drive
                    .cache
                    .write_through(record_start, &length.to_le_bytes());
                self.unit(unit).phase = Phase::WriteData {
                    record_start,
                    length,
                };
                let xfer = Transfer {
                    op: XferOp::WriteMedia,
                    position: record_start + HEADER_BYTES,
                    address,
                    count: (length + 1) & !1,
                };
                self.run(unit, xfer, ctx);
            }
            FN_WRITE_EOF => {
                let position = self.position(unit);
                let drive = self.drive(unit);
                drive.cache.write_through(position, &0u32.to_le_bytes());
                drive.position = position + HEADER_BYTES;
                self.finish(ctx);
            }
            FN_SPACE_FORWARD => self.read_header(unit, Phase::SpaceForward, ctx),
            FN_SPACE_REVERSE => {
                if self.position(unit) < HEADER_BYTES {
                    self.finish(ctx);
                    return;
                }
                self.read_header(unit, Phase::SpaceReverse, ctx);
            }
            FN_WRITE_IRG => {
                // Inter-record gaps have no representation in .tap images.
                self.finish(ctx);
            }
            FN_REWIND => {
                self.drive(unit).position = 0;
                self.finish(ctx);
            }
            _ => panic!("tm11: impossible function code {func}"),
        }
    }

    /// Start a 4-byte record-length decode at the phase's header position.
    fn read_header(&mut self, unit: usize, phase: Phase, ctx: &mut DeviceCtx) {
        let position = match phase {
            Phase::SpaceReverse => self.position(unit) - HEADER_BYTES,
            _ => self.position(unit),
        };
        self.unit(unit).phase = phase;
        let xfer = Transfer {
            op: XferOp::RecordLength,
            position,
            address: 0,
            count: HEADER_BYTES as u32,
        };
        self.run(unit, xfer, ctx);
    }

    fn run(&mut self, unit: usize, xfer: Transfer, ctx: &mut DeviceCtx) {
        match xfer::start_io(DeviceKind::Tm, self.drive(unit), xfer, ctx) {
            IoStart::Complete(code, xfer) => self.end(unit, code, xfer, ctx),
            IoStart::Suspended => {}
        }
    }

    fn finish(&mut self, ctx: &mut DeviceCtx) {
        self.mtc |= MTC_RDY;
        ctx.irq
            .request(0, TM11_LEVEL, TM11_VECTOR, 0, Some(Hook::TmIntr));
    }

    /// Command-end interrupt gate ([`Hook::TmIntr`]).
    pub fn intr(&self) -> bool {
        self.mtc & MTC_IE != 0
    }

    fn end(&mut self, unit: usize, code: XferCode, xfer: Transfer, ctx: &mut DeviceCtx) {
        let phase = self.unit(unit).phase;

        if code != XferCode::Ok {
            match code {
                XferCode::Nxm => self.mts |= MTS_NXM,
                _ => self.mts |= MTS_BTE,
            }
            self.unit(unit).phase = Phase::Idle;
            self.finish(ctx);
            return;
        }

        match phase {
            Phase::Idle => self.finish(ctx),
            Phase::ReadHeader => {
                let length = xfer.address;
                if is_tape_mark(length) {
                    self.mts |= MTS_EOF;
                    if length != 0 {
                        self.mts |= MTS_EOT;
                    }
                    self.drive(unit).position = xfer.position - HEADER_BYTES + 2;
                    self.unit(unit).phase = Phase::Idle;
                    self.finish(ctx);
                    return;
                }
                let record_start = xfer.position - HEADER_BYTES;
                let requested = self.requested_bytes();
                if length > requested {
                    self.mts |= MTS_RLE;
                }
                let count = requested.min(length);
                self.unit(unit).phase = Phase::ReadData {
                    record_start,
                    length,
                };
                let data = Transfer {
                    op: XferOp::ReadMedia,
                    position: xfer.position,
                    address: self.dma_address(),
                    count,
                };
                self.run(unit, data, ctx);
            }
            Phase::ReadData {
                record_start,
                length,
            } => {
                let transferred = self.requested_bytes().min(length) - xfer.count;
                self.mtbrc = self.mtbrc.wrapping_add(transferred as u16);
                self.mtcma = (xfer.address & 0xFFFF) as u16;
                self.mtc = (self.mtc & !MTC_XBA) | (((xfer.address >> 12) as u16) & MTC_XBA);
                self.drive(unit).position =
                    record_start + 2 * HEADER_BYTES + padded(length);
                self.unit(unit).phase = Phase::Idle;
                self.finish(ctx);
            }
            Phase::WriteData {
                record_start,
                length,
            } => {
                let trailer = record_start + HEADER_BYTES + padded(length);
                let drive = self.drive(unit);
                drive.cache.write_through(trailer, &length.to_le_bytes());
                drive.position = trailer + HEADER_BYTES;
                self.mtbrc = 0;
                self.mtcma = (xfer.address & 0xFFFF) as u16;
                self.unit(unit).phase = Phase::Idle;
                self.finish(ctx);
            }
            Phase::SpaceForward => {
                let length = xfer.address;
                if is_tape_mark(length) {
                    self.mts |= MTS_EOF;
                    self.drive(unit).position = xfer.position - HEADER_BYTES + 2;
                    self.unit(unit).phase = Phase::Idle;
                    self.finish(ctx);
                    return;
                }
                let record_start = xfer.position - HEADER_BYTES;
                self.drive(unit).position = record_start + 2 * HEADER_BYTES + padded(length);
                self.mtbrc = self.mtbrc.wrapping_add(1);
                if self.mtbrc == 0 {
                    self.unit(unit).phase = Phase::Idle;
                    self.finish(ctx);
                } else {
                    self.read_header(unit, Phase::SpaceForward, ctx);
                }
            }
            Phase::SpaceReverse => {
                let length = xfer.address;
                let trailer_start = xfer.position - HEADER_BYTES;
                if is_tape_mark(length) {
                    self.mts |= MTS_EOF;
                    self.drive(unit).position = trailer_start + 2;
                    self.unit(unit).phase = Phase::Idle;
                    self.finish(ctx);
                    return;
                }
                let record_start = trailer_start
                    .saturating_sub(padded(length))
                    .saturating_sub(HEADER_BYTES);
                self.drive(unit).position = record_start;
                self.mtbrc = self.mtbrc.wrapping_add(1);
                if self.mtbrc == 0 || record_start < HEADER_BYTES {
                    self.unit(unit).phase = Phase::Idle;
                    self.finish(ctx);
                } else {
                    self.read_header(unit, Phase::SpaceReverse, ctx);
                }
            }
        }
    }

    pub fn fetch_complete(&mut self, unit: usize, result: &FetchResult, ctx: &mut DeviceCtx) {
        let drive = self.drive(unit);
        if let Some((code, xfer)) = xfer::finish_fetch(DeviceKind::Tm, drive, result, ctx) {
            self.end(unit, code, xfer, ctx);
        }
    }
}

impl Default for Tm11 {
    fn default() -> Self {
        Self::new(8)
    }
}
