mod common;

use common::{pattern, rig};
use pdp11_storage::BLOCK_SIZE;
use pretty_assertions::assert_eq;

const RLCS: u32 = 0o17774400;
const RLBA: u32 = 0o17774402;
const RLDA: u32 = 0o17774404;
const RLMP: u32 = 0o17774406;

const CRDY: u16 = 0o200;
const IE: u16 = 0o100;

fn command(rig: &mut common::Rig, func: u16) {
    // A function starts when the CSR is written with CRDY clear.
    rig.write(RLCS, func << 1);
}

#[test]
fn reset_value() {
    let mut rig = rig();
    // CRDY set, drive ready, nothing else pending.
    assert_eq!(rig.read(RLCS), CRDY | 0o1);
}

#[test]
fn seek_then_read() {
    let mut rig = rig();
    let track = 7u16;
    let sector = 3u16;
    let offset = (u64::from(track) * 40 + u64::from(sector)) * 256;
    let image = pattern(128 * 1024);

    // Seek completes without a transfer.
    rig.write(RLDA, (track << 6) | sector);
    command(&mut rig, 3);
    assert_eq!(rig.read(RLCS) & CRDY, CRDY);
    assert_eq!(rig.io.take_fetch_requests().len(), 0);

    // Read 128 words from the same disk address.
    rig.write(RLMP, 0xFF80);
    rig.write(RLBA, 0o1000);
    command(&mut rig, 6);
    rig.serve_fetches(&image);

    assert_eq!(
        rig.mem_bytes(0o1000, 256),
        image[offset as usize..offset as usize + 256].to_vec()
    );
    assert_eq!(rig.read(RLCS) & CRDY, CRDY);
    assert_eq!(rig.read(RLMP), 0);
    assert_eq!(rig.read(RLBA), 0o1000 + 256);
    // DAR advanced past the last sector read.
    assert_eq!(rig.read(RLDA), (track << 6) | (sector + 1));
}

#[test]
fn read_header_returns_head_position() {
    let mut rig = rig();

    // Seek outward by 5 cylinders, head 1.
    rig.write(RLDA, (5 << 7) | 0o4 | 0o20);
    command(&mut rig, 3);
    command(&mut rig, 4); // read header
    assert_eq!(rig.read(RLMP), (5 << 7) | (1 << 6));
}

#[test]
fn get_status_reports_drive_type() {
    let mut rig = rig();
    rig.write(RLMP, 0);
    command(&mut rig, 2);
    // RL02, heads out, lock on.
    assert_eq!(rig.read(RLMP), 0o235);
}

#[test]
fn out_of_range_sector_is_header_not_found() {
    let mut rig = rig();

    rig.write(RLDA, 41); // sectors run 0-39
    rig.write(RLMP, 0xFF80);
    command(&mut rig, 6);

    let csr = rig.read(RLCS);
    assert_eq!(csr & 0o10000, 0o10000, "HNF");
    assert_eq!(csr & 0o100000, 0o100000, "composite error");
    assert_eq!(csr & CRDY, CRDY);
    assert_eq!(rig.io.take_fetch_requests().len(), 0);
}

#[test]
fn get_status_with_reset_clears_errors() {
    let mut rig = rig();

    rig.write(RLDA, 41);
    rig.write(RLMP, 0xFF80);
    command(&mut rig, 6);
    assert_eq!(rig.read(RLCS) & 0o100000, 0o100000);

    rig.write(RLMP, 0o10);
    command(&mut rig, 2);
    assert_eq!(rig.read(RLCS) & 0o176000, 0);
}

#[test]
fn interrupt_on_completion_when_enabled() {
    let mut rig = rig();
    let image = pattern(BLOCK_SIZE as usize);

    rig.write(RLMP, 0xFF80);
    rig.write(RLCS, (6 << 1) | IE);
    rig.serve_fetches(&image);
    rig.ticks(1);
    assert_eq!(rig.io.take_interrupt(), Some((0o160, 5)));
}
