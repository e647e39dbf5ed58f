use crate::cache::{ImageCache, BLOCK_SIZE};
use crate::error::FetchError;

/// How the range source answered a block fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStatus {
    /// 200: the body is the entire image, regardless of the requested range.
    Full,
    /// 206: the body starts at the requested block.
    Partial,
    /// 416: the requested range lies past the end of the image.
    Unsatisfiable,
    /// A local source with no HTTP status; treated like a partial response.
    Local,
}

/// A completed range fetch, ready to be folded into an [`ImageCache`].
#[derive(Debug)]
pub struct RangeResponse {
    pub status: RangeStatus,
    pub body: Vec<u8>,
}

/// Fold a completed fetch for `requested_block` into the cache.
///
/// - `Unsatisfiable` installs a zero block at the requested index (end of
///   image: all subsequent reads of that window see zeros).
/// - `Full` copies from block 0; `Partial`/`Local` copy from the requested
///   block. Each 1 MiB window of the body fills an absent block or, when the
///   block is already present, is skipped (present blocks are authoritative).
///
/// If the requested block is still absent afterwards (short body), a zero
/// block is installed so the requester always makes progress.
pub fn install_response(
    cache: &mut ImageCache,
    requested_block: u64,
    response: &RangeResponse,
) -> Result<(), FetchError> {
    let start_block = match response.status {
        RangeStatus::Unsatisfiable => {
            cache.insert_zero_block(requested_block);
            return Ok(());
        }
        RangeStatus::Full => 0,
        RangeStatus::Partial | RangeStatus::Local => requested_block,
    };

    for (i, window) in response.body.chunks(BLOCK_SIZE as usize).enumerate() {
        cache.insert_block(start_block + i as u64, window);
    }

    if !cache.contains_block(requested_block) {
        cache.insert_zero_block(requested_block);
    }
    Ok(())
}
