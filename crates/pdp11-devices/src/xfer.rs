//! The word/byte transfer engine between emulated physical memory and cached
//! image blocks.
//!
//! A transfer is an explicit state record, not a continuation: when the loop
//! reaches a block that has not been fetched yet it stops, the controller
//! parks the record in the drive and queues a fetch, and the engine re-enters
//! the loop from the saved state once the bytes arrive. Completion hands the
//! final `(position, address, count)` back to the controller so it can
//! reconstruct its disk-address and word-count registers.

use crate::bus::DmaBus;
use crate::drive::{DeviceKind, Drive, FetchRequest, FetchResult};
use crate::DeviceCtx;
use pdp11_storage::{install_response, ImageCache, BLOCK_SIZE};

/// Transfer operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferOp {
    /// Memory word -> cache, low byte then high byte.
    WriteMedia = 1,
    /// Cache word -> memory; a final odd byte is written as a byte.
    ReadMedia = 2,
    /// Compare memory words against cache words.
    WriteCheck = 3,
    /// Shift cache words into the high 16 bits of `address` (tape
    /// record-length headers, little-endian 32-bit).
    RecordLength = 4,
    /// One cache byte into the low 8 bits of `address` (paper tape).
    ReadByte = 5,
}

/// Completion codes handed to the controller's end routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferCode {
    Ok = 0,
    /// The backing fetch failed (read/timing error).
    ReadError = 1,
    /// A memory access was rejected.
    Nxm = 2,
    /// Write-check mismatch.
    Compare = 3,
}

/// The resumable transfer state.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub op: XferOp,
    /// Byte offset within the image.
    pub position: u64,
    /// DMA target: a physical or Unibus address for ops 1-3, an accumulator
    /// for ops 4-5.
    pub address: u32,
    /// Byte count remaining.
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Done(XferCode),
    NeedBlock(u64),
}

/// What a controller sees after starting or resuming a transfer.
pub enum IoStart {
    Complete(XferCode, Transfer),
    Suspended,
}

fn missing_word_block(cache: &ImageCache, position: u64) -> Option<u64> {
    // A word may straddle a block boundary when the position is odd.
    let first = position / BLOCK_SIZE;
    if !cache.contains_block(first) {
        return Some(first);
    }
    let second = (position + 1) / BLOCK_SIZE;
    if !cache.contains_block(second) {
        return Some(second);
    }
    None
}

/// Run the transfer until it completes or needs a block.
pub fn step(xfer: &mut Transfer, cache: &mut ImageCache, bus: &mut dyn DmaBus, mapped: bool) -> StepOutcome {
    while xfer.count > 0 {
        let pa = if mapped {
            bus.map_unibus(xfer.address)
        } else {
            xfer.address
        };

        match xfer.op {
            XferOp::WriteMedia => {
                if let Some(block) = missing_word_block(cache, xfer.position) {
                    return StepOutcome::NeedBlock(block);
                }
                let word = match bus.read_word(pa) {
                    Ok(w) => w,
                    Err(_) => return StepOutcome::Done(XferCode::Nxm),
                };
                cache.set_byte(xfer.position, word as u8);
                cache.set_byte(xfer.position + 1, (word >> 8) as u8);
                xfer.position += 2;
                xfer.address += 2;
                xfer.count = xfer.count.saturating_sub(2);
            }
            XferOp::ReadMedia => {
                if xfer.count == 1 {
                    let Some(byte) = cache.byte(xfer.position) else {
                        return StepOutcome::NeedBlock(xfer.position / BLOCK_SIZE);
                    };
                    if bus.write_byte(pa, byte).is_err() {
                        return StepOutcome::Done(XferCode::Nxm);
                    }
                    xfer.position += 1;
                    xfer.address += 1;
                    xfer.count = 0;
                    break;
                }
                if let Some(block) = missing_word_block(cache, xfer.position) {
                    return StepOutcome::NeedBlock(block);
                }
                let lo = cache.byte(xfer.position).unwrap_or(0) as u16;
                let hi = cache.byte(xfer.position + 1).unwrap_or(0) as u16;
                if bus.write_word(pa, lo | (hi << 8)).is_err() {
                    return StepOutcome::Done(XferCode::Nxm);
                }
                xfer.position += 2;
                xfer.address += 2;
                xfer.count -= 2;
            }
            XferOp::WriteCheck => {
                if let Some(block) = missing_word_block(cache, xfer.position) {
                    return StepOutcome::NeedBlock(block);
                }
                let word = match bus.read_word(pa) {
                    Ok(w) => w,
                    Err(_) => return StepOutcome::Done(XferCode::Nxm),
                };
                let lo = cache.byte(xfer.position).unwrap_or(0) as u16;
                let hi = cache.byte(xfer.position + 1).unwrap_or(0) as u16;
                xfer.position += 2;
                xfer.address += 2;
                xfer.count = xfer.count.saturating_sub(2);
                if word != lo | (hi << 8) {
                    return StepOutcome::Done(XferCode::Compare);
                }
            }
            XferOp::RecordLength => {
                if let Some(block) = missing_word_block(cache, xfer.position) {
                    return StepOutcome::NeedBlock(block);
                }
                let lo = cache.byte(xfer.position).unwrap_or(0) as u32;
                let hi = cache.byte(xfer.position + 1).unwrap_or(0) as u32;
                xfer.address = (xfer.address >> 16) | ((lo | (hi << 8)) << 16);
                xfer.position += 2;
                xfer.count = xfer.count.saturating_sub(2);
            }
            XferOp::ReadByte => {
                let Some(byte) = cache.byte(xfer.position) else {
                    return StepOutcome::NeedBlock(xfer.position / BLOCK_SIZE);
                };
                xfer.address = byte as u32;
                xfer.position += 1;
                xfer.count = 0;
            }
        }
    }
    StepOutcome::Done(XferCode::Ok)
}

/// Start (or restart) a transfer on `drive`, suspending on a block miss.
///
/// On a miss the transfer is parked in the drive, a [`FetchRequest`] is
/// queued, and `Suspended` is returned; the controller's end routine runs
/// later, from [`finish_fetch`].
pub fn start_io(device: DeviceKind, drive: &mut Drive, mut xfer: Transfer, ctx: &mut DeviceCtx) -> IoStart {
    match step(&mut xfer, &mut drive.cache, ctx.dma, drive.mapped) {
        StepOutcome::Done(code) => IoStart::Complete(code, xfer),
        StepOutcome::NeedBlock(block) => {
            tracing::trace!(device = %device, unit = drive.unit, block, "transfer suspended on block miss");
            drive.pending = Some(xfer);
            drive.fetch_block = Some(block);
            ctx.fetches.push(FetchRequest {
                device,
                unit: drive.unit,
                url: drive.url.clone(),
                block,
            });
            IoStart::Suspended
        }
    }
}

/// Resume a suspended transfer after its fetch completed.
///
/// Successful responses are installed into the cache even when the transfer
/// was aborted in the meantime (the cache survives resets). Returns the
/// completion the controller must act on, or `None` if the transfer is still
/// suspended on a further block or was aborted.
pub fn finish_fetch(
    device: DeviceKind,
    drive: &mut Drive,
    result: &FetchResult,
    ctx: &mut DeviceCtx,
) -> Option<(XferCode, Transfer)> {
    let block = drive.fetch_block.take();

    match result {
        Ok(response) => {
            if let Some(block) = block {
                if install_response(&mut drive.cache, block, response).is_err() {
                    let xfer = drive.pending.take()?;
                    return Some((XferCode::ReadError, xfer));
                }
            }
        }
        Err(err) => {
            tracing::debug!(device = %device, unit = drive.unit, error = %err, "image fetch failed");
            let xfer = drive.pending.take()?;
            return Some((XferCode::ReadError, xfer));
        }
    }

    let mut xfer = drive.pending.take()?;
    match step(&mut xfer, &mut drive.cache, ctx.dma, drive.mapped) {
        StepOutcome::Done(code) => Some((code, xfer)),
        StepOutcome::NeedBlock(next) => {
            drive.pending = Some(xfer);
            drive.fetch_block = Some(next);
            ctx.fetches.push(FetchRequest {
                device,
                unit: drive.unit,
                url: drive.url.clone(),
                block: next,
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::TestMemory;
    use pretty_assertions::assert_eq;

    fn cached_drive(blocks: u64) -> Drive {
        let mut drive = Drive::new(DeviceKind::Rk, 0, "dsk", false);
        for b in 0..blocks {
            drive.cache.insert_zero_block(b);
        }
        drive
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut drive = cached_drive(1);
        let mut mem = TestMemory::new(1024);
        for (i, b) in (0..).zip(mem.as_mut_slice()[..256].iter_mut()) {
            *b = (i * 3 + 1) as u8;
        }

        let mut w = Transfer {
            op: XferOp::WriteMedia,
            position: 512,
            address: 0,
            count: 256,
        };
        assert_eq!(step(&mut w, &mut drive.cache, &mut mem, false), StepOutcome::Done(XferCode::Ok));
        assert_eq!(w.position, 512 + 256);
        assert_eq!(w.address, 256);

        let mut r = Transfer {
            op: XferOp::ReadMedia,
            position: 512,
            address: 512,
            count: 256,
        };
        assert_eq!(step(&mut r, &mut drive.cache, &mut mem, false), StepOutcome::Done(XferCode::Ok));
        let mem = mem.as_slice();
        assert_eq!(&mem[..256], &mem[512..768]);
    }

    #[test]
    fn write_then_check_reports_ok() {
        let mut drive = cached_drive(1);
        let mut mem = TestMemory::new(512);
        mem.as_mut_slice()[..64].fill(0x5A);

        let mut w = Transfer {
            op: XferOp::WriteMedia,
            position: 0,
            address: 0,
            count: 64,
        };
        assert_eq!(step(&mut w, &mut drive.cache, &mut mem, false), StepOutcome::Done(XferCode::Ok));

        let mut c = Transfer {
            op: XferOp::WriteCheck,
            position: 0,
            address: 0,
            count: 64,
        };
        assert_eq!(step(&mut c, &mut drive.cache, &mut mem, false), StepOutcome::Done(XferCode::Ok));
    }

    #[test]
    fn check_mismatch_stops_after_the_bad_word() {
        let mut drive = cached_drive(1);
        let mut mem = TestMemory::new(64);
        mem.as_mut_slice()[4] = 0xFF;

        let mut c = Transfer {
            op: XferOp::WriteCheck,
            position: 0,
            address: 0,
            count: 8,
        };
        assert_eq!(
            step(&mut c, &mut drive.cache, &mut mem, false),
            StepOutcome::Done(XferCode::Compare)
        );
        // The mismatching word at offset 4 was consumed before the abort.
        assert_eq!(c.position, 6);
        assert_eq!(c.count, 2);
    }

    #[test]
    fn odd_final_byte_is_written_as_a_byte() {
        let mut drive = cached_drive(1);
        drive.cache.set_byte(0, 0x11);
        drive.cache.set_byte(1, 0x22);
        drive.cache.set_byte(2, 0x33);
        let mut mem = TestMemory::new(8);

        let mut r = Transfer {
            op: XferOp::ReadMedia,
            position: 0,
            address: 0,
            count: 3,
        };
        assert_eq!(step(&mut r, &mut drive.cache, &mut mem, false), StepOutcome::Done(XferCode::Ok));
        assert_eq!(&mem.as_slice()[..4], &[0x11, 0x22, 0x33, 0x00]);
        assert_eq!(r.position, 3);
    }

    #[test]
    fn record_length_accumulates_little_endian() {
        let mut drive = cached_drive(1);
        drive.cache.write_through(0, &[0x64, 0x00, 0x01, 0x00]);
        let mut mem = TestMemory::new(8);

        let mut h = Transfer {
            op: XferOp::RecordLength,
            position: 0,
            address: 0,
            count: 4,
        };
        assert_eq!(step(&mut h, &mut drive.cache, &mut mem, false), StepOutcome::Done(XferCode::Ok));
        assert_eq!(h.address, 0x0001_0064);
        assert_eq!(h.position, 4);
    }

    #[test]
    fn nxm_aborts_with_state_intact() {
        let mut drive = cached_drive(1);
        let mut mem = TestMemory::new(4);

        let mut r = Transfer {
            op: XferOp::ReadMedia,
            position: 0,
            address: 2,
            count: 8,
        };
        assert_eq!(step(&mut r, &mut drive.cache, &mut mem, false), StepOutcome::Done(XferCode::Nxm));
        // One word went through; the failing word did not advance the state.
        assert_eq!(r.position, 2);
        assert_eq!(r.address, 4);
        assert_eq!(r.count, 6);
    }

    #[test]
    fn missing_block_suspends_at_the_boundary() {
        let mut drive = cached_drive(1);
        let mut mem = TestMemory::new(4096);

        let mut r = Transfer {
            op: XferOp::ReadMedia,
            position: BLOCK_SIZE - 4,
            address: 0,
            count: 16,
        };
        assert_eq!(step(&mut r, &mut drive.cache, &mut mem, false), StepOutcome::NeedBlock(1));
        assert_eq!(r.position, BLOCK_SIZE);
        assert_eq!(r.count, 12);
    }
}
