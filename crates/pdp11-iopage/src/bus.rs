//! Address decode and byte/word access semantics for the I/O page, plus the
//! [`IoBus`] that owns every controller.

use crate::cpu::{CpuRegs, MODE_USER};
use crate::map::UnibusMap;
use crate::mmu::{Mmu, SPACE_KERNEL, SPACE_SUPERVISOR, SPACE_USER};
use pdp11_devices::bus::{DmaBus, Nxm, PrinterSink, Terminal, UnibusMemory};
use pdp11_devices::dl11::Dl11;
use pdp11_devices::drive::{DeviceKind, FetchRequest, FetchResult};
use pdp11_devices::interrupts::{Expired, Hook, InterruptQueue};
use pdp11_devices::kw11::Kw11;
use pdp11_devices::lp11::Lp11;
use pdp11_devices::pc11::Pc11;
use pdp11_devices::rk11::{Rk11, RK05_TRACKS};
use pdp11_devices::rl11::{Rl11, RL02_CYLINDERS};
use pdp11_devices::rp11::{Rp11, RpType};
use pdp11_devices::tm11::Tm11;
use pdp11_devices::DeviceCtx;
use thiserror::Error;

pub const IO_PAGE_BASE: u32 = 0o17760000;

// CPU error register bits.
const CPUERR_ODD_ADDRESS: u16 = 0o100;
const CPUERR_TIMEOUT: u16 = 0o20;

/// Trap codes surfaced to the CPU collaborator through vector 4.
const TRAP_ODD: u16 = 0o212;
const TRAP_TIMEOUT: u16 = 0o204;

/// A bus error the CPU must take through its trap machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bus trap through vector {vector:#o} (code {code:#o})")]
pub struct Trap {
    pub vector: u16,
    pub code: u16,
}

/// Per-unit geometry and sizing for the bus.
pub struct IoBusConfig {
    /// Installed memory in bytes (size registers).
    pub memory_size: u32,
    /// RK05 tracks per unit; zero marks the unit non-existent.
    pub rk_tracks: [u16; 8],
    /// RL cylinders per unit (256 = RL01, 512 = RL02, 0 = none).
    pub rl_cylinders: [u16; 4],
    pub rp_types: [Option<RpType>; 8],
    pub tm_units: usize,
    pub dl_units: usize,
}

impl Default for IoBusConfig {
    fn default() -> Self {
        Self {
            memory_size: 0o17760000,
            rk_tracks: [RK05_TRACKS; 8],
            rl_cylinders: [RL02_CYLINDERS; 4],
            rp_types: [Some(RpType::Rp06); 8],
            tm_units: 8,
            dl_units: 5,
        }
    }
}

/// The I/O page and everything behind it.
pub struct IoBus {
    pub cpu: CpuRegs,
    pub mmu: Mmu,
    pub ubmap: UnibusMap,
    pub irq: InterruptQueue,
    pub rk: Rk11,
    pub rl: Rl11,
    pub rp: Rp11,
    pub tm: Tm11,
    pub ptr: Pc11,
    pub lp: Lp11,
    pub dl: Dl11,
    pub kw: Kw11,
    fetches: Vec<FetchRequest>,
    term: Box<dyn Terminal>,
    printer: Box<dyn PrinterSink>,
}

/// Memory as the DMA engines see it: physical access through the Unibus map
/// when it is enabled.
struct MappedDma<'a> {
    mem: &'a mut dyn UnibusMemory,
    map: &'a UnibusMap,
    enabled: bool,
}

impl UnibusMemory for MappedDma<'_> {
    fn read_word(&mut self, pa: u32) -> Result<u16, Nxm> {
        self.mem.read_word(pa)
    }

    fn write_word(&mut self, pa: u32, value: u16) -> Result<(), Nxm> {
        self.mem.write_word(pa, value)
    }

    fn write_byte(&mut self, pa: u32, value: u8) -> Result<(), Nxm> {
        self.mem.write_byte(pa, value)
    }
}

impl DmaBus for MappedDma<'_> {
    fn map_unibus(&self, addr: u32) -> u32 {
        self.map.map(self.enabled, addr)
    }
}

/// Merge a write into the current register word, or `None` for a read.
///
/// Byte writes replace one half of the word by address parity; word writes
/// replace the whole word. Word access to odd addresses is rejected before
/// this point.
fn merge(cur: u16, pa: u32, data: Option<u16>, byte: bool) -> Option<u16> {
    let value = data?;
    Some(if byte {
        if pa & 1 != 0 {
            (cur & 0x00FF) | ((value & 0xFF) << 8)
        } else {
            (cur & 0xFF00) | (value & 0xFF)
        }
    } else {
        value
    })
}

macro_rules! ctx {
    ($self:ident, $mem:ident) => {{
        DeviceCtx {
            irq: &mut $self.irq,
            dma: &mut MappedDma {
                mem: &mut *$mem,
                map: &$self.ubmap,
                enabled: $self.mmu.unibus_map_enabled(),
            },
            fetches: &mut $self.fetches,
        }
    }};
}

impl IoBus {
    pub fn new(
        config: IoBusConfig,
        term: Box<dyn Terminal>,
        printer: Box<dyn PrinterSink>,
    ) -> Self {
        Self {
            cpu: CpuRegs::new(config.memory_size),
            mmu: Mmu::new(),
            ubmap: UnibusMap::new(),
            irq: InterruptQueue::new(),
            rk: Rk11::new(config.rk_tracks),
            rl: Rl11::new(config.rl_cylinders),
            rp: Rp11::new(config.rp_types),
            tm: Tm11::new(config.tm_units),
            ptr: Pc11::new(),
            lp: Lp11::new(),
            dl: Dl11::new(config.dl_units),
            kw: Kw11::new(),
            fetches: Vec::new(),
            term,
            printer,
        }
    }

    /// The RESET instruction: clear CPU/MMU control state, the interrupt
    /// queue and every device. Cached image blocks survive.
    pub fn reset(&mut self) {
        self.cpu.pir = 0;
        self.cpu.stack_limit = 0;
        self.cpu.cpu_error = 0;
        self.irq.clear();
        self.mmu.reset();
        self.fetches.clear();
        for unit in 0..self.dl.unit_count() {
            self.term.reset(unit);
        }
        self.dl.reset();
        self.ptr.reset();
        self.lp.reset();
        self.kw.reset();
        self.rk.reset();
        self.rl.reset();
        self.rp.reset();
        self.tm.reset();
    }

    fn trap(&mut self, code: u16) -> Trap {
        match code {
            TRAP_ODD => self.cpu.cpu_error |= CPUERR_ODD_ADDRESS,
            _ => self.cpu.cpu_error |= CPUERR_TIMEOUT,
        }
        Trap { vector: 4, code }
    }

    /// Current MMU mode for the CPU collaborator (`set_mmu_mode`
    /// equivalent): the PSW mode bits when relocation is on, kernel
    /// otherwise.
    pub fn mmu_mode(&self) -> u8 {
        if self.mmu.relocating() {
            self.cpu.mode()
        } else {
            0
        }
    }

    /// Decode one I/O page access.
    ///
    /// `data` is `None` for a read; `byte` selects byte access (merged by
    /// address parity). Word access to an odd address traps to vector 4.
    pub fn access(
        &mut self,
        mem: &mut dyn UnibusMemory,
        pa: u32,
        data: Option<u16>,
        byte: bool,
    ) -> Result<u16, Trap> {
        let pa = pa & 0o17777777;

        // The console SP/PC mirrors bypass the byte-merge step entirely.
        match pa & !1 {
            0o17777706 | 0o17777716 => return Ok(self.console_sp_pc(pa, data)),
            _ => {}
        }

        if !byte && pa & 1 != 0 {
            tracing::warn!("word access to odd I/O address {pa:#o}");
            return Err(self.trap(TRAP_ODD));
        }

        let wa = pa & !1;
        match wa {
            // --- CPU registers -------------------------------------------
            0o17777776 => {
                let cur = self.cpu.psw;
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.cpu.write_psw(v);
                        self.cpu.psw
                    }
                })
            }
            0o17777774 => {
                let cur = self.cpu.stack_limit;
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.cpu.stack_limit = v & 0xFF00;
                        self.cpu.stack_limit
                    }
                })
            }
            0o17777772 => {
                let cur = self.cpu.pir;
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.cpu.write_pir(v);
                        self.cpu.pir
                    }
                })
            }
            0o17777770 => {
                let cur = self.cpu.micro_break;
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.cpu.micro_break = v;
                        v
                    }
                })
            }
            0o17777766 => {
                let cur = self.cpu.cpu_error;
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(_) => {
                        self.cpu.cpu_error = 0;
                        0
                    }
                })
            }
            // Memory system registers: only the cache control register holds
            // state; the others read as zero on a machine with no cache
            // errors.
            0o17777740 | 0o17777742 | 0o17777744 | 0o17777750 | 0o17777752 | 0o17777754
            | 0o17777756 => Ok(merge(0, pa, data, byte).unwrap_or(0)),
            0o17777746 => {
                let cur = self.cpu.cache_control;
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.cpu.cache_control = v & 0o77;
                        self.cpu.cache_control
                    }
                })
            }
            0o17777760 => Ok(self.cpu.lower_size()),
            0o17777762 => Ok(self.cpu.upper_size()),
            0o17777764 => Ok(0), // system ID
            // General registers, both sets.
            0o17777700..=0o17777705 => {
                let index = ((wa - 0o17777700) >> 1) as usize;
                let set = self.cpu.register_set();
                let cur = self.cpu.registers[set][index];
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.cpu.registers[set][index] = v;
                        v
                    }
                })
            }
            0o17777710..=0o17777715 => {
                let index = ((wa - 0o17777710) >> 1) as usize;
                let set = 1 - self.cpu.register_set();
                let cur = self.cpu.registers[set][index];
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.cpu.registers[set][index] = v;
                        v
                    }
                })
            }

            // --- MMU ------------------------------------------------------
            0o17777572 => {
                let cur = self.mmu.mmr0;
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.mmu.write_mmr0(v);
                        self.mmu.mmr0
                    }
                })
            }
            0o17777574 => Ok(self.mmu.mmr1),
            0o17777576 => Ok(self.mmu.mmr2),
            0o17772516 => {
                let cur = self.mmu.mmr3;
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.mmu.write_mmr3(v);
                        self.mmu.mmr3
                    }
                })
            }
            0o17777600..=0o17777637 => self.mmu_reg(pa, data, byte, SPACE_USER, false),
            0o17777640..=0o17777677 => self.mmu_reg(pa, data, byte, SPACE_USER, true),
            0o17772300..=0o17772337 => self.mmu_reg(pa, data, byte, SPACE_KERNEL, false),
            0o17772340..=0o17772377 => self.mmu_reg(pa, data, byte, SPACE_KERNEL, true),
            0o17772200..=0o17772237 => self.mmu_reg(pa, data, byte, SPACE_SUPERVISOR, false),
            0o17772240..=0o17772277 => self.mmu_reg(pa, data, byte, SPACE_SUPERVISOR, true),

            // --- Unibus map ----------------------------------------------
            0o17770200..=0o17770377 => {
                let word = ((wa - 0o17770200) >> 1) as usize;
                let cur = self.ubmap.read_word(word);
                Ok(match merge(cur, pa, data, byte) {
                    None => cur,
                    Some(v) => {
                        self.ubmap.write_word(word, v);
                        self.ubmap.read_word(word)
                    }
                })
            }

            // --- Console switches / display ------------------------------
            0o17777570 => Ok(match merge(self.cpu.switch_register, pa, data, byte) {
                None => self.cpu.switch_register,
                Some(v) => {
                    self.cpu.display_register = v;
                    v
                }
            }),

            // --- Devices --------------------------------------------------
            0o17777560..=0o17777566 => {
                let reg = ((wa - 0o17777560) >> 1) as usize;
                let cur = self.dl.peek(0, reg);
                Ok(match merge(cur, pa, data, byte) {
                    None => self.dl.read(0, reg),
                    Some(v) => {
                        self.dl.write(0, reg, v, &mut *self.term, &mut self.irq);
                        v
                    }
                })
            }
            0o17776500..=0o17776537 => {
                let unit = 1 + ((wa - 0o17776500) >> 3) as usize;
                let reg = ((wa >> 1) & 3) as usize;
                if unit >= self.dl.unit_count() {
                    return Err(self.trap(TRAP_TIMEOUT));
                }
                let cur = self.dl.peek(unit, reg);
                Ok(match merge(cur, pa, data, byte) {
                    None => self.dl.read(unit, reg),
                    Some(v) => {
                        self.dl.write(unit, reg, v, &mut *self.term, &mut self.irq);
                        v
                    }
                })
            }
            0o17777550..=0o17777552 => {
                let reg = ((wa - 0o17777550) >> 1) as usize;
                let cur = self.ptr.peek(reg);
                Ok(match merge(cur, pa, data, byte) {
                    None => self.ptr.read(reg),
                    Some(v) => {
                        let mut ctx = ctx!(self, mem);
                        self.ptr.write(reg, v, &mut ctx);
                        v
                    }
                })
            }
            0o17777546 => {
                let cur = self.kw.peek();
                Ok(match merge(cur, pa, data, byte) {
                    None => self.kw.read(),
                    Some(v) => {
                        self.kw.write(v);
                        self.kw.peek()
                    }
                })
            }
            0o17777514..=0o17777516 => {
                let reg = ((wa - 0o17777514) >> 1) as usize;
                let cur = self.lp.peek(reg);
                Ok(match merge(cur, pa, data, byte) {
                    None => self.lp.read(reg),
                    Some(v) => {
                        self.lp.write(reg, v, &mut *self.printer, &mut self.irq);
                        v
                    }
                })
            }
            0o17777400..=0o17777416 => {
                let reg = ((wa - 0o17777400) >> 1) as usize;
                let cur = self.rk.peek(reg);
                Ok(match merge(cur, pa, data, byte) {
                    None => self.rk.read(reg),
                    Some(v) => {
                        let mut ctx = ctx!(self, mem);
                        self.rk.write(reg, v, &mut ctx);
                        v
                    }
                })
            }
            0o17776700..=0o17776752 => {
                let reg = ((wa - 0o17776700) >> 1) as usize;
                let cur = self.rp.peek(reg);
                Ok(match merge(cur, pa, data, byte) {
                    None => self.rp.read(reg),
                    Some(v) => {
                        let mut ctx = ctx!(self, mem);
                        self.rp.write(reg, v, &mut ctx);
                        v
                    }
                })
            }
            0o17774400..=0o17774406 => {
                let reg = ((wa - 0o17774400) >> 1) as usize;
                let cur = self.rl.peek(reg);
                Ok(match merge(cur, pa, data, byte) {
                    None => self.rl.read(reg),
                    Some(v) => {
                        let mut ctx = ctx!(self, mem);
                        self.rl.write(reg, v, &mut ctx);
                        v
                    }
                })
            }
            0o17772500..=0o17772512 => {
                let reg = ((wa - 0o17772500) >> 1) as usize;
                let cur = self.tm.peek(reg);
                Ok(match merge(cur, pa, data, byte) {
                    None => self.tm.read(reg),
                    Some(v) => {
                        let mut ctx = ctx!(self, mem);
                        self.tm.write(reg, v, &mut ctx);
                        v
                    }
                })
            }

            _ => {
                tracing::debug!("access to unassigned I/O address {pa:#o}");
                Err(self.trap(TRAP_TIMEOUT))
            }
        }
    }

    /// 017777706 and 017777716: two logical registers folded onto one word.
    ///
    /// The even byte addresses the stack pointer (kernel at 706; user or
    /// supervisor at 716, by current mode), the odd byte addresses the PC.
    fn console_sp_pc(&mut self, pa: u32, data: Option<u16>) -> u16 {
        let odd = pa & 1 != 0;
        if odd {
            return match data {
                None => self.cpu.pc,
                Some(v) => {
                    self.cpu.pc = v;
                    v
                }
            };
        }
        let index = if pa & 0o10 == 0 {
            0 // kernel
        } else if self.cpu.mode() == MODE_USER {
            3
        } else {
            1
        };
        match data {
            None => self.cpu.stack_pointers[index],
            Some(v) => {
                self.cpu.stack_pointers[index] = v;
                v
            }
        }
    }

    fn mmu_reg(
        &mut self,
        pa: u32,
        data: Option<u16>,
        byte: bool,
        space: usize,
        par: bool,
    ) -> Result<u16, Trap> {
        let index = ((pa >> 1) & 0o17) as usize;
        let cur = if par {
            self.mmu.read_par(space, index)
        } else {
            self.mmu.read_pdr(space, index)
        };
        Ok(match merge(cur, pa, data, byte) {
            None => cur,
            Some(v) => {
                if par {
                    self.mmu.write_par(space, index, v);
                    self.mmu.read_par(space, index)
                } else {
                    self.mmu.write_pdr(space, index, v);
                    self.mmu.read_pdr(space, index)
                }
            }
        })
    }

    /// Advance the deferred-work queue by one tick and run expired hooks.
    pub fn tick(&mut self, mem: &mut dyn UnibusMemory) {
        for expired in self.irq.tick() {
            self.run_hook(mem, expired);
        }
    }

    fn run_hook(&mut self, mem: &mut dyn UnibusMemory, expired: Expired) {
        let deliver = match expired.hook {
            Hook::RkStart => {
                let mut ctx = ctx!(self, mem);
                self.rk.service(&mut ctx)
            }
            Hook::RkSeekDone => self.rk.seek_done(expired.unit),
            Hook::RkIntr => self.rk.intr(),
            Hook::RlIntr => self.rl.intr(),
            Hook::RpSeekDone => self.rp.position_done(expired.unit),
            Hook::RpIntr => self.rp.intr(),
            Hook::TmIntr => self.tm.intr(),
            Hook::PtrIntr => self.ptr.intr(),
            Hook::LpReady => self.lp.ready(),
            Hook::DlXmitReady => self.dl.xmit_ready(expired.unit),
        };
        if deliver {
            self.irq.arm_expired(expired);
        }
    }

    /// Highest-priority deliverable interrupt above the current PSW level.
    pub fn take_interrupt(&mut self) -> Option<(u16, u8)> {
        self.irq.take_pending(self.cpu.priority())
    }

    /// Fetch requests produced by suspended transfers since the last call.
    pub fn take_fetch_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.fetches)
    }

    /// Deliver a completed block fetch back to the owning controller.
    pub fn complete_fetch(
        &mut self,
        mem: &mut dyn UnibusMemory,
        device: DeviceKind,
        unit: usize,
        result: FetchResult,
    ) {
        let mut ctx = ctx!(self, mem);
        match device {
            DeviceKind::Rk => self.rk.fetch_complete(unit, &result, &mut ctx),
            DeviceKind::Rl => self.rl.fetch_complete(unit, &result, &mut ctx),
            DeviceKind::Rp => self.rp.fetch_complete(unit, &result, &mut ctx),
            DeviceKind::Tm => self.tm.fetch_complete(unit, &result, &mut ctx),
            DeviceKind::Ptr => self.ptr.fetch_complete(&result, &mut ctx),
        }
    }

    /// External character arrival for a DL11 unit. Returns `false` when the
    /// receiver still holds an unread character.
    pub fn dl11_input(&mut self, unit: usize, ch: u8) -> bool {
        self.dl.input(unit, ch, &mut self.irq)
    }

    /// Advance the KW11 line clock against the embedder's monotonic clock.
    pub fn poll_clock(&mut self, now_ms: u64, halted: bool) {
        self.kw.poll(now_ms, halted, &mut self.irq);
    }
}
