use pdp11_devices::bus::TestMemory;
use pdp11_devices::drive::{DeviceKind, Drive};
use pdp11_devices::xfer::{step, StepOutcome, Transfer, XferCode, XferOp};
use proptest::prelude::*;

fn drive_with_blocks(blocks: u64) -> Drive {
    let mut drive = Drive::new(DeviceKind::Rk, 0, "dsk", false);
    for b in 0..blocks {
        drive.cache.insert_zero_block(b);
    }
    drive
}

proptest! {
    // Writing a pattern to the media and reading it back into a distinct
    // memory region reproduces the pattern exactly.
    #[test]
    fn write_read_round_trip(
        pattern in prop::collection::vec(any::<u8>(), 2..512),
        position in 0u64..4096,
    ) {
        let even_len = pattern.len() & !1;
        let pattern = &pattern[..even_len];
        let position = position & !1;

        let mut drive = drive_with_blocks(1);
        let mut mem = TestMemory::new(4 * even_len);
        mem.as_mut_slice()[..even_len].copy_from_slice(pattern);

        let mut w = Transfer {
            op: XferOp::WriteMedia,
            position,
            address: 0,
            count: even_len as u32,
        };
        prop_assert_eq!(
            step(&mut w, &mut drive.cache, &mut mem, false),
            StepOutcome::Done(XferCode::Ok)
        );

        let readback = (2 * even_len) as u32;
        let mut r = Transfer {
            op: XferOp::ReadMedia,
            position,
            address: readback,
            count: even_len as u32,
        };
        prop_assert_eq!(
            step(&mut r, &mut drive.cache, &mut mem, false),
            StepOutcome::Done(XferCode::Ok)
        );

        let mem = mem.as_slice();
        prop_assert_eq!(&mem[readback as usize..readback as usize + even_len], pattern);
    }

    // A write followed by a write-check over the same range always passes.
    #[test]
    fn write_then_check_passes(
        pattern in prop::collection::vec(any::<u8>(), 2..256),
        position in 0u64..2048,
    ) {
        let even_len = pattern.len() & !1;
        let position = position & !1;

        let mut drive = drive_with_blocks(1);
        let mut mem = TestMemory::new(1024);
        mem.as_mut_slice()[..even_len].copy_from_slice(&pattern[..even_len]);

        let mut w = Transfer {
            op: XferOp::WriteMedia,
            position,
            address: 0,
            count: even_len as u32,
        };
        prop_assert_eq!(
            step(&mut w, &mut drive.cache, &mut mem, false),
            StepOutcome::Done(XferCode::Ok)
        );

        let mut c = Transfer {
            op: XferOp::WriteCheck,
            position,
            address: 0,
            count: even_len as u32,
        };
        prop_assert_eq!(
            step(&mut c, &mut drive.cache, &mut mem, false),
            StepOutcome::Done(XferCode::Ok)
        );
    }
}
