use crate::xfer::Transfer;
use pdp11_storage::{FetchError, ImageCache, RangeResponse};
use std::fmt;

/// Which controller a drive (and its fetch traffic) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Rk,
    Rl,
    Rp,
    Tm,
    Ptr,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Rk => "rk",
            DeviceKind::Rl => "rl",
            DeviceKind::Rp => "rp",
            DeviceKind::Tm => "tm",
            DeviceKind::Ptr => "ptr",
        })
    }
}

/// A block the embedder must fetch to resume a suspended transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub device: DeviceKind,
    pub unit: usize,
    pub url: String,
    pub block: u64,
}

/// The embedder's answer to a [`FetchRequest`].
pub type FetchResult = Result<RangeResponse, FetchError>;

/// Per-unit drive state shared by every controller.
///
/// Created lazily on first reference to the unit and kept for the process
/// lifetime; controller resets abort in-flight work but never drop the cache.
pub struct Drive {
    pub cache: ImageCache,
    pub url: String,
    /// Does this drive's DMA address go through the Unibus map?
    pub mapped: bool,
    pub unit: usize,
    /// Byte position on the media (tape and paper tape).
    pub position: u64,
    /// A transfer waiting on a block fetch.
    pub pending: Option<Transfer>,
    /// Block index of the fetch in flight, if any.
    pub fetch_block: Option<u64>,
}

impl Drive {
    /// Image URLs follow the `<dev><unit>.<ext>` convention (`rk0.dsk`,
    /// `tm1.tap`); the embedder resolves them against its image base.
    pub fn new(device: DeviceKind, unit: usize, ext: &str, mapped: bool) -> Self {
        Self {
            cache: ImageCache::new(),
            url: format!("{device}{unit}.{ext}"),
            mapped,
            unit,
            position: 0,
            pending: None,
            fetch_block: None,
        }
    }

    /// Abort any suspended transfer and in-flight fetch. Cache contents are
    /// preserved so later accesses do not re-fetch.
    pub fn abort(&mut self) {
        self.pending = None;
        self.fetch_block = None;
    }

    pub fn busy(&self) -> bool {
        self.pending.is_some()
    }
}
