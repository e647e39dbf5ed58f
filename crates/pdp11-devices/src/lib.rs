#![forbid(unsafe_code)]

//! Unibus peripheral controllers for a PDP-11/70 emulator.
//!
//! Each controller owns a small file of 16-bit registers with per-bit
//! read-only / write-only / write-1-to-clear semantics, and drives DMA-style
//! transfers through the shared [`xfer`] engine. Transfers run against
//! demand-fetched image blocks (`pdp11-storage`); a missing block suspends
//! the transfer, queues a [`FetchRequest`], and resumes when the embedder
//! delivers the fetched bytes.
//!
//! The scheduling model is single-threaded and cooperative: register access
//! and controller function bodies run to completion, and the only suspension
//! points are block fetches, the line-clock period, and delayed entries on
//! the [`InterruptQueue`].

pub mod bus;
pub mod dl11;
pub mod drive;
pub mod interrupts;
pub mod kw11;
pub mod lp11;
pub mod pc11;
pub mod rk11;
pub mod rl11;
pub mod rp11;
pub mod tm11;
pub mod xfer;

pub use bus::{DmaBus, Nxm, PrinterSink, Terminal, TestMemory, TestPrinter, TestTerminal, UnibusMemory};
pub use drive::{DeviceKind, Drive, FetchRequest, FetchResult};
pub use interrupts::{Hook, InterruptQueue};
pub use xfer::{Transfer, XferCode, XferOp};

use interrupts::InterruptQueue as Irq;

/// Everything a controller needs while servicing a command: the interrupt
/// queue, a (possibly Unibus-mapped) view of physical memory, and the fetch
/// queue for suspended transfers.
pub struct DeviceCtx<'a> {
    pub irq: &'a mut Irq,
    pub dma: &'a mut dyn DmaBus,
    pub fetches: &'a mut Vec<FetchRequest>,
}
