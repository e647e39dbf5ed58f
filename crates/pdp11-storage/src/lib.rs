#![forbid(unsafe_code)]

//! Demand-fetched disk image blocks for the PDP-11/70 peripheral emulation.
//!
//! Disk and tape images live on a remote server (or any positioned byte-range
//! reader) and are pulled in 1 MiB blocks the first time a transfer touches
//! them. This crate provides:
//!
//! - [`ImageCache`]: a sparse per-image table of 1 MiB blocks; absent blocks
//!   read as zeros and blocks are installed at most once
//! - [`install_response`]: the policy that folds a completed range fetch
//!   (200 / 206 / 416 / local) into the cache
//! - [`HttpRangeSource`]: a hyper-based block fetcher issuing one `Range`
//!   request per block
//!
//! The suspend/resume machinery that drives fetches from the middle of a DMA
//! transfer lives in the device crate; this crate only produces bytes.

mod cache;
mod error;
mod fetch;
mod http;

pub use cache::{ImageCache, BLOCK_SIZE};
pub use error::FetchError;
pub use fetch::{install_response, RangeResponse, RangeStatus};
pub use http::HttpRangeSource;
