//! RP11 Massbus disk controller (RP04/RP06/RM03 drives).
//!
//! Controller registers (CS1/WC/BA/CS2/BAE/CS3) are shared; the rest of the
//! register file is per drive and only visible while the selected drive has
//! DVA. DMA addresses are 22-bit: BA plus the bus-address extension, with
//! BAE bits 1:0 mirrored in CS1 bits 9:8.

use crate::drive::{DeviceKind, Drive, FetchResult};
use crate::interrupts::Hook;
use crate::xfer::{self, IoStart, Transfer, XferCode, XferOp};
use crate::DeviceCtx;

pub const RP11_VECTOR: u16 = 0o254;
pub const RP11_LEVEL: u8 = 5;

pub const SECTOR_BYTES: u32 = 512;

/// Drive geometry, selected per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpType {
    Rp04,
    Rp06,
    Rm03,
}

impl RpType {
    pub fn cylinders(self) -> u16 {
        match self {
            RpType::Rp04 => 411,
            RpType::Rp06 => 815,
            RpType::Rm03 => 823,
        }
    }

    pub fn surfaces(self) -> u16 {
        match self {
            RpType::Rp04 | RpType::Rp06 => 19,
            RpType::Rm03 => 5,
        }
    }

    pub fn sectors(self) -> u16 {
        match self {
            RpType::Rp04 | RpType::Rp06 => 22,
            RpType::Rm03 => 32,
        }
    }

    fn drive_type_code(self) -> u16 {
        match self {
            RpType::Rp04 => 0o20020,
            RpType::Rp06 => 0o20022,
            RpType::Rm03 => 0o20024,
        }
    }
}

// CS1 bits.
const CS1_GO: u16 = 0o1;
const CS1_FN: u16 = 0o76;
const CS1_IE: u16 = 0o100;
const CS1_RDY: u16 = 0o200;
const CS1_A16_17: u16 = 0o1400;
const CS1_DVA: u16 = 0o4000;
const CS1_TRE: u16 = 0o40000;
const CS1_SC: u16 = 0o100000;

// CS2 bits.
const CS2_UNIT: u16 = 0o7;
const CS2_CLR: u16 = 0o40;
const CS2_NEM: u16 = 0o4000;
const CS2_NED: u16 = 0o10000;
const CS2_WCE: u16 = 0o40000;

// Drive status bits.
const DS_VV: u16 = 0o100;
const DS_DRY: u16 = 0o200;
const DS_DPR: u16 = 0o400;
const DS_MOL: u16 = 0o10000;
const DS_PIP: u16 = 0o20000;
const DS_ERR: u16 = 0o40000;
const DS_ATA: u16 = 0o100000;
const DS_READY: u16 = DS_MOL | DS_DPR | DS_DRY;

// ER1 bits.
const ER1_IAE: u16 = 0o2000;
const ER1_DCK: u16 = 0o100000;

// Function codes, including GO in bit 0.
const FN_NOP: u16 = 0o01;
const FN_UNLOAD: u16 = 0o03;
const FN_SEEK: u16 = 0o05;
const FN_RECALIBRATE: u16 = 0o07;
const FN_DRIVE_CLEAR: u16 = 0o11;
const FN_RELEASE: u16 = 0o13;
const FN_OFFSET: u16 = 0o15;
const FN_RETURN: u16 = 0o17;
const FN_READ_IN_PRESET: u16 = 0o21;
const FN_PACK_ACK: u16 = 0o23;
const FN_SEARCH: u16 = 0o31;
const FN_WRITE_CHECK: u16 = 0o51;
const FN_WRITE: u16 = 0o61;
const FN_READ: u16 = 0o71;

const POSITION_DELAY: u32 = 16;

/// Per-drive register file.
struct RpDrive {
    typ: RpType,
    meta: Option<Drive>,
    da: u16,
    ds: u16,
    er1: u16,
    mr: u16,
    of: u16,
    dc: u16,
    cc: u16,
}

impl RpDrive {
    fn new(typ: RpType) -> Self {
        Self {
            typ,
            meta: None,
            da: 0,
            ds: DS_READY,
            er1: 0,
            mr: 0,
            of: 0,
            dc: 0,
            cc: 0,
        }
    }

    fn reset(&mut self) {
        self.da = 0;
        self.ds = DS_READY;
        self.er1 = 0;
        self.mr = 0;
        self.of = 0;
        self.dc = 0;
        self.cc = 0;
        if let Some(meta) = &mut self.meta {
            meta.abort();
        }
    }
}

pub struct Rp11 {
    pub cs1: u16,
    pub wc: u16,
    pub ba: u16,
    pub cs2: u16,
    pub bae: u16,
    pub cs3: u16,
    drives: [Option<RpDrive>; 8],
}

impl Rp11 {
    pub fn new(types: [Option<RpType>; 8]) -> Self {
        let mut drives: [Option<RpDrive>; 8] = Default::default();
        for (slot, typ) in drives.iter_mut().zip(types) {
            *slot = typ.map(RpDrive::new);
        }
        let mut rp = Self {
            cs1: 0,
            wc: 0,
            ba: 0,
            cs2: 0,
            bae: 0,
            cs3: 0,
            drives,
        };
        rp.reset();
        rp
    }

    pub fn reset(&mut self) {
        self.cs1 = CS1_RDY;
        self.wc = 0;
        self.ba = 0;
        self.cs2 = 0;
        self.bae = 0;
        self.cs3 = 0;
        for drive in self.drives.iter_mut().flatten() {
            drive.reset();
        }
    }

    fn selected_unit(&self) -> usize {
        (self.cs2 & CS2_UNIT) as usize
    }

    pub fn drive_cache(&mut self, unit: usize) -> &mut Drive {
        let slot = self.drives[unit]
            .as_mut()
            .expect("drive_cache on non-existent drive");
        slot.meta
            .get_or_insert_with(|| Drive::new(DeviceKind::Rp, unit, "dsk", false))
    }

    fn attention_summary(&self) -> u16 {
        let mut summary = 0;
        for (i, drive) in self.drives.iter().enumerate() {
            if let Some(d) = drive {
                if d.ds & DS_ATA != 0 {
                    summary |= 1 << i;
                }
            }
        }
        summary
    }

    /// Register index by word offset from the base (CS1 = 0, CS3 = 21).
    pub fn peek(&self, reg: usize) -> u16 {
        let unit = self.selected_unit();
        let drive = self.drives[unit].as_ref();
        let dreg = |f: fn(&RpDrive) -> u16| drive.map(f).unwrap_or(0);
        match reg {
            0 => {
                let dva = if drive.is_some() { CS1_DVA } else { 0 };
                (self.cs1 & !(CS1_DVA | CS1_A16_17)) | dva | ((self.bae & 3) << 8)
            }
            1 => self.wc,
            2 => self.ba,
            3 => dreg(|d| d.da),
            4 => self.cs2,
            5 => dreg(|d| d.ds),
            6 => dreg(|d| d.er1),
            7 => self.attention_summary(),
            8 => 0,  // LA: sector under the heads, not modelled
            9 => 0,  // DB
            10 => dreg(|d| d.mr),
            11 => dreg(|d| d.typ.drive_type_code()),
            12 => drive.map(|_| (unit as u16) + 1).unwrap_or(0), // SN
            13 => dreg(|d| d.of),
            14 => dreg(|d| d.dc),
            15 => dreg(|d| d.cc),
            16 | 17 | 18 | 19 => 0, // ER2/ER3/EC1/EC2
            20 => self.bae,
            21 => self.cs3,
            _ => 0,
        }
    }

    pub fn read(&mut self, reg: usize) -> u16 {
        self.peek(reg)
    }

    pub fn write(&mut self, reg: usize, value: u16, ctx: &mut DeviceCtx) {
        let unit = self.selected_unit();
        match reg {
            0 => {
                if value & CS1_TRE != 0 {
                    self.cs1 &= !CS1_TRE;
                }
                self.cs1 = (self.cs1 & !(CS1_FN | CS1_IE | CS1_A16_17))
                    | (value & (CS1_FN | CS1_IE | CS1_A16_17));
                self.bae = (self.bae & !3) | ((value >> 8) & 3);
                if value & CS1_GO != 0 && self.cs1 & CS1_RDY != 0 {
                    self.execute(value & (CS1_FN | CS1_GO), ctx);
                }
            }
            1 => self.wc = value,
            2 => self.ba = value & !1,
            3 => self.with_drive(unit, |d| d.da = value),
            4 => {
                if value & CS2_CLR != 0 {
                    self.reset();
                    ctx.irq.cancel_vector(RP11_VECTOR);
                    return;
                }
                self.cs2 = (self.cs2 & !0o77) | (value & 0o77);
            }
            5 => {} // DS is read-only
            6 => self.with_drive(unit, |d| d.er1 = value),
            7 => {
                // Attention summary: write-1-to-clear per drive; a nonzero
                // write also drops SC. A write of zero is a no-op.
                if value > 0 {
                    for (i, drive) in self.drives.iter_mut().enumerate() {
                        if let Some(d) = drive {
                            if value & (1 << i) != 0 {
                                d.ds &= !DS_ATA;
                            }
                        }
                    }
                    self.cs1 &= !CS1_SC;
                }
            }
            10 => self.with_drive(unit, |d| d.mr = value),
            13 => self.with_drive(unit, |d| d.of = value),
            14 => self.with_drive(unit, |d| d.dc = value),
            20 => {
                self.bae = value & 0o77;
            }
            21 => self.cs3 = value,
            _ => {}
        }
    }

    fn with_drive(&mut self, unit: usize, f: impl FnOnce(&mut RpDrive)) {
        if let Some(drive) = self.drives[unit].as_mut() {
            f(drive);
        }
    }

    fn raise_tre(&mut self) {
        self.cs1 |= CS1_TRE | CS1_SC;
    }

    fn set_attention(&mut self, unit: usize) {
        self.with_drive(unit, |d| d.ds |= DS_ATA);
        self.cs1 |= CS1_SC;
    }

    fn execute(&mut self, func: u16, ctx: &mut DeviceCtx) {
        let unit = self.selected_unit();
        tracing::debug!(func, unit, "rp11 command");

        if self.drives[unit].is_none() {
            self.cs2 |= CS2_NED;
            self.raise_tre();
            self.finish(ctx);
            return;
        }

        match func {
            FN_NOP | FN_RELEASE => self.finish(ctx),
            FN_UNLOAD | FN_OFFSET | FN_RETURN => {
                self.set_attention(unit);
                self.finish(ctx);
            }
            FN_DRIVE_CLEAR => {
                self.with_drive(unit, |d| {
                    d.er1 = 0;
                    d.ds &= !(DS_ATA | DS_ERR);
                });
                self.finish(ctx);
            }
            FN_READ_IN_PRESET => {
                self.with_drive(unit, |d| {
                    d.da = 0;
                    d.dc = 0;
                    d.of = 0;
                    d.ds |= DS_VV;
                });
                self.finish(ctx);
            }
            FN_PACK_ACK => {
                self.with_drive(unit, |d| d.ds |= DS_VV);
                self.finish(ctx);
            }
            FN_SEEK | FN_RECALIBRATE | FN_SEARCH => {
                self.with_drive(unit, |d| {
                    if func == FN_RECALIBRATE {
                        d.dc = 0;
                    }
                    d.ds |= DS_PIP;
                });
                ctx.irq.request(
                    POSITION_DELAY,
                    RP11_LEVEL,
                    RP11_VECTOR,
                    unit as u8,
                    Some(Hook::RpSeekDone),
                );
                self.finish(ctx);
            }
            FN_WRITE | FN_READ | FN_WRITE_CHECK => {
                let drive = self.drives[unit].as_ref().expect("checked above");
                let typ = drive.typ;
                let cylinder = drive.dc;
                let track = (drive.da >> 8) & 0o77;
                let sector = drive.da & 0o77;
                if cylinder >= typ.cylinders() || track >= typ.surfaces() || sector >= typ.sectors()
                {
                    self.with_drive(unit, |d| d.er1 |= ER1_IAE);
                    self.set_attention(unit);
                    self.raise_tre();
                    self.finish(ctx);
                    return;
                }
                let words = (0x10000 - u32::from(self.wc)) & 0xFFFF;
                let op = match func {
                    FN_WRITE => XferOp::WriteMedia,
                    FN_READ => XferOp::ReadMedia,
                    _ => XferOp::WriteCheck,
                };
                let position = ((u64::from(cylinder) * u64::from(typ.surfaces())
                    + u64::from(track))
                    * u64::from(typ.sectors())
                    + u64::from(sector))
                    * u64::from(SECTOR_BYTES);
                let xfer = Transfer {
                    op,
                    position,
                    address: (u32::from(self.bae) << 16) | u32::from(self.ba),
                    count: words * 2,
                };
                self.cs1 &= !CS1_RDY;
                match xfer::start_io(DeviceKind::Rp, self.drive_cache(unit), xfer, ctx) {
                    IoStart::Complete(code, xfer) => self.end(code, xfer, ctx),
                    IoStart::Suspended => {}
                }
            }
            _ => panic!("rp11: unknown function code {func:#o}"),
        }
    }

    fn finish(&mut self, ctx: &mut DeviceCtx) {
        self.cs1 |= CS1_RDY;
        ctx.irq
            .request(0, RP11_LEVEL, RP11_VECTOR, 0, Some(Hook::RpIntr));
    }

    /// Command-end interrupt gate ([`Hook::RpIntr`]).
    pub fn intr(&self) -> bool {
        self.cs1 & CS1_IE != 0
    }

    /// A positioning command reached its cylinder ([`Hook::RpSeekDone`]).
    pub fn position_done(&mut self, unit: u8) -> bool {
        let unit = unit as usize;
        self.with_drive(unit, |d| {
            d.cc = d.dc;
            d.ds &= !DS_PIP;
            d.ds |= DS_ATA;
        });
        self.cs1 |= CS1_SC;
        self.cs1 & CS1_IE != 0
    }

    fn end(&mut self, code: XferCode, xfer: Transfer, ctx: &mut DeviceCtx) {
        let unit = self.selected_unit();

        self.ba = (xfer.address & 0xFFFF) as u16;
        self.bae = ((xfer.address >> 16) & 0o77) as u16;
        self.wc = ((0x10000 - (xfer.count / 2)) & 0xFFFF) as u16;

        if let Some(drive) = self.drives[unit].as_mut() {
            let typ = drive.typ;
            let sectors_total = xfer.position / u64::from(SECTOR_BYTES);
            let sector = (sectors_total % u64::from(typ.sectors())) as u16;
            let track = ((sectors_total / u64::from(typ.sectors())) % u64::from(typ.surfaces())) as u16;
            let cylinder =
                (sectors_total / (u64::from(typ.sectors()) * u64::from(typ.surfaces()))) as u16;
            drive.da = (track << 8) | sector;
            drive.dc = cylinder;
            drive.cc = cylinder;
        }

        match code {
            XferCode::Ok => {}
            XferCode::ReadError => {
                self.with_drive(unit, |d| {
                    d.er1 |= ER1_DCK;
                    d.ds |= DS_ATA | DS_ERR;
                });
                self.raise_tre();
            }
            XferCode::Nxm => {
                self.cs2 |= CS2_NEM;
                self.raise_tre();
            }
            XferCode::Compare => {
                self.cs2 |= CS2_WCE;
                self.raise_tre();
            }
        }
        self.finish(ctx);
    }

    pub fn fetch_complete(&mut self, unit: usize, result: &FetchResult, ctx: &mut DeviceCtx) {
        let drive = self.drive_cache(unit);
        if let Some((code, xfer)) = xfer::finish_fetch(DeviceKind::Rp, drive, result, ctx) {
            self.end(code, xfer, ctx);
        }
    }
}

impl Default for Rp11 {
    fn default() -> Self {
        Self::new([Some(RpType::Rp06); 8])
    }
}
