#![forbid(unsafe_code)]

//! The PDP-11/70 I/O page: a 4 KiB window of physical address space
//! (017760000-017777777) through which the CPU programs its peripherals.
//!
//! [`IoBus`] owns the CPU-visible register windows (PSW, PIR, MMU, Unibus
//! map), every peripheral controller, the interrupt queue and the fetch
//! queue, and decodes byte/word accesses with per-register bit semantics.
//! The CPU collaborator calls [`IoBus::access`] for any physical address in
//! the window, drains interrupts with [`IoBus::take_interrupt`], and pumps
//! deferred device work with [`IoBus::tick`].

mod bus;
mod cpu;
mod map;
mod mmu;

pub use bus::{IoBus, IoBusConfig, Trap, IO_PAGE_BASE};
pub use cpu::{CpuRegs, MODE_KERNEL, MODE_SUPERVISOR, MODE_USER};
pub use map::UnibusMap;
pub use mmu::{Mmu, SPACE_KERNEL, SPACE_SUPERVISOR, SPACE_USER};
