mod common;

use common::rig;
use pretty_assertions::assert_eq;

#[test]
fn word_access_to_odd_address_traps() {
    let mut rig = rig();
    let before = rig.read(0o17774400);

    let err = rig.try_write(0o17774401, 0o1234).unwrap_err();
    assert_eq!(err.vector, 4);
    assert_eq!(err.code, 0o212);
    // The RL11 CSR is untouched.
    assert_eq!(rig.read(0o17774400), before);
    // The CPU error register latched the odd-address bit.
    assert_eq!(rig.read(0o17777766) & 0o100, 0o100);
}

#[test]
fn unassigned_addresses_trap_to_vector_4() {
    let mut rig = rig();
    let err = rig.io.access(&mut rig.mem, 0o17777300, None, false).unwrap_err();
    assert_eq!(err.vector, 4);
    assert_eq!(rig.read(0o17777766) & 0o20, 0o20);
}

#[test]
fn byte_writes_merge_by_address_parity() {
    let mut rig = rig();
    let mb = 0o17777770; // microprogram break: a plain 16-bit register

    rig.write(mb, 0x1234);
    rig.write_byte(mb, 0xAB);
    assert_eq!(rig.read(mb), 0x12AB);
    rig.write_byte(mb + 1, 0xCD);
    assert_eq!(rig.read(mb), 0xCDAB);
}

#[test]
fn psw_and_pir_windows() {
    let mut rig = rig();

    rig.write(0o17777776, 0o340);
    assert_eq!(rig.read(0o17777776), 0o340);
    assert_eq!(rig.io.cpu.priority(), 7);

    rig.write(0o17777772, 1 << 12); // request level 4
    assert_eq!(rig.read(0o17777772), (1 << 12) | (4 << 5) | (4 << 1));
}

#[test]
fn general_registers_and_both_sets() {
    let mut rig = rig();

    rig.write(0o17777700, 0o123456);
    assert_eq!(rig.read(0o17777700), 0o123456);
    // The other register set is a distinct window.
    assert_eq!(rig.read(0o17777710), 0);
    rig.write(0o17777710, 0o111);

    // Flip to register set 1; the windows swap.
    rig.write(0o17777776, 1 << 11);
    assert_eq!(rig.read(0o17777700), 0o111);
    assert_eq!(rig.read(0o17777710), 0o123456);
}

#[test]
fn console_sp_and_pc_mirrors() {
    let mut rig = rig();

    // Even access at 706: kernel SP. Odd access: PC.
    rig.write(0o17777706, 0o776);
    assert_eq!(rig.io.cpu.stack_pointers[0], 0o776);
    rig.io.cpu.pc = 0o1000;
    assert_eq!(
        rig.io.access(&mut rig.mem, 0o17777707, None, true).unwrap(),
        0o1000
    );

    // 716 follows the current mode: supervisor SP in kernel mode...
    rig.write(0o17777716, 0o2000);
    assert_eq!(rig.io.cpu.stack_pointers[1], 0o2000);
    // ...user SP in user mode.
    rig.write(0o17777776, 3 << 14);
    rig.write(0o17777716, 0o3000);
    assert_eq!(rig.io.cpu.stack_pointers[3], 0o3000);
}

#[test]
fn mmu_registers_and_descriptor_files() {
    let mut rig = rig();

    rig.write(0o17777572, 1); // MMR0 enable
    assert!(rig.io.mmu.relocating());
    assert_eq!(rig.io.mmu_mode(), 0);

    rig.write(0o17772516, 0o40); // MMR3: Unibus map enable
    assert!(rig.io.mmu.unibus_map_enabled());

    // Kernel PAR 3 and its PDR.
    rig.write(0o17772346, 0o1234);
    assert_eq!(rig.read(0o17772346), 0o1234);
    rig.write(0o17772306, 0o77406);
    assert_eq!(rig.read(0o17772306), 0o77406);

    // User space is a separate file.
    rig.write(0o17777646, 0o4321);
    assert_eq!(rig.read(0o17777646), 0o4321);
    assert_eq!(rig.read(0o17772346), 0o1234);

    // MMR2 is read-only.
    rig.write(0o17777576, 0o7777);
    assert_eq!(rig.read(0o17777576), 0);
}

#[test]
fn unibus_map_register_file() {
    let mut rig = rig();

    rig.write(0o17770200, 0o000001); // entry 0: valid, base low 0
    rig.write(0o17770202, 0o000002); // base bits 21:16 = 2
    assert_eq!(rig.read(0o17770200), 1);
    assert_eq!(rig.read(0o17770202), 2);

    rig.write(0o17772516, 0o40);
    let mapped = rig.io.ubmap.map(rig.io.mmu.unibus_map_enabled(), 0o100);
    assert_eq!(mapped, (2 << 16) + 0o100);
}

#[test]
fn switch_and_display_registers() {
    let mut rig = rig();
    rig.io.cpu.switch_register = 0o173030;
    assert_eq!(rig.read(0o17777570), 0o173030);
    rig.write(0o17777570, 0o52);
    assert_eq!(rig.io.cpu.display_register, 0o52);
    assert_eq!(rig.read(0o17777570), 0o173030);
}

#[test]
fn size_registers_report_installed_memory() {
    let mut rig = rig();
    let size = 0o17760000u32;
    assert_eq!(rig.read(0o17777760), ((size >> 6) - 1) as u16 & 0xFFFF);
    assert_eq!(rig.read(0o17777762), (((size >> 6) - 1) >> 16) as u16);
}

#[test]
fn console_terminal_output_and_echo() {
    let mut rig = rig();

    rig.write(0o17777566, u16::from(b'H'));
    assert_eq!(rig.term.text(0), "H");
    assert_eq!(rig.read(0o17777564) & 0o200, 0, "transmitter busy");

    // The transmitter becomes ready again after the delay.
    rig.ticks(10);
    assert_eq!(rig.read(0o17777564) & 0o200, 0o200);
    rig.write_byte(0o17777566, b'i');
    rig.ticks(10);
    assert_eq!(rig.term.text(0), "Hi");
}

#[test]
fn console_input_is_refused_while_full() {
    let mut rig = rig();

    assert!(rig.io.dl11_input(0, b'a'));
    assert!(!rig.io.dl11_input(0, b'b'));
    assert_eq!(rig.read(0o17777560) & 0o200, 0o200);
    assert_eq!(rig.read(0o17777562), u16::from(b'a'));
    // Reading the buffer clears DONE and re-opens the receiver.
    assert_eq!(rig.read(0o17777560) & 0o200, 0);
    assert!(rig.io.dl11_input(0, b'b'));
}

#[test]
fn second_serial_unit_has_its_own_registers() {
    let mut rig = rig();

    assert!(rig.io.dl11_input(1, b'x'));
    assert_eq!(rig.read(0o17776502), u16::from(b'x'));
    rig.write(0o17776506, u16::from(b'y'));
    rig.ticks(10);
    assert_eq!(rig.term.text(1), "y");
}

#[test]
fn line_printer_filters_control_codes() {
    let mut rig = rig();

    for &ch in b"ok\r\n" {
        rig.write(0o17777516, u16::from(ch));
        rig.ticks(10);
    }
    assert_eq!(rig.printer.output(), b"ok\n".to_vec());
    assert_eq!(rig.read(0o17777514) & 0o200, 0o200);
}

#[test]
fn paper_tape_reader_reads_bytes_and_errors_at_the_end() {
    let mut rig = rig();
    rig.io.ptr.set_tape("boot.ptap");

    rig.write(0o17777550, 1); // GO
    let requests = rig.io.take_fetch_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "boot.ptap");
    rig.io.complete_fetch(
        &mut rig.mem,
        requests[0].device,
        requests[0].unit,
        Ok(pdp11_storage::RangeResponse {
            status: pdp11_storage::RangeStatus::Partial,
            body: vec![0o350, 0o351],
        }),
    );
    assert_eq!(rig.read(0o17777550) & 0o200, 0o200);
    assert_eq!(rig.read(0o17777552), 0o350);

    // The next byte is already cached.
    rig.write(0o17777550, 1);
    assert_eq!(rig.read(0o17777552), 0o351);

    // A failing fetch sets ERROR.
    rig.io.ptr.tape().unwrap().cache = pdp11_storage::ImageCache::new();
    rig.write(0o17777550, 1);
    let requests = rig.io.take_fetch_requests();
    rig.io.complete_fetch(
        &mut rig.mem,
        requests[0].device,
        requests[0].unit,
        Err(pdp11_storage::FetchError::Transport {
            status: 500,
            reason: "boot.ptap".into(),
        }),
    );
    assert_eq!(rig.read(0o17777550) & 0o100000, 0o100000);
}

#[test]
fn line_clock_ticks_and_interrupts() {
    let mut rig = rig();

    rig.write(0o17777546, 0o100); // IE
    rig.io.poll_clock(0, false);
    rig.io.poll_clock(20, false);
    assert_eq!(rig.read(0o17777546) & 0o200, 0o200);
    assert_eq!(rig.io.take_interrupt(), Some((0o100, 6)));

    // A CPU running at priority 7 masks the clock.
    rig.write(0o17777776, 0o340);
    rig.io.poll_clock(40, false);
    assert_eq!(rig.io.take_interrupt(), None);
}

#[test]
fn reset_clears_controllers_but_keeps_caches() {
    let mut rig = rig();
    let image = common::pattern(1024);

    rig.write(0o17777406, 0xFF00);
    rig.write(0o17777404, 0x05);
    rig.ticks(1);
    rig.serve_fetches(&image);
    assert!(rig.io.rk.drive(0).cache.contains_block(0));

    rig.write(0o17777772, 1 << 12);
    rig.io.reset();

    assert_eq!(rig.read(0o17777404), 0o200);
    assert_eq!(rig.read(0o17774400) & 0o200, 0o200);
    assert_eq!(rig.read(0o17772502), 0x6080);
    assert_eq!(rig.read(0o17777772), 0);
    assert_eq!(rig.io.take_interrupt(), None);
    // Device resets re-arm the controllers but keep fetched blocks.
    assert!(rig.io.rk.drive(0).cache.contains_block(0));
    assert_eq!(rig.term.resets(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn interrupt_priority_orders_delivery() {
    let mut rig = rig();

    // Arm a level-4 console transmit interrupt and a level-5 disk one.
    rig.write(0o17777564, 0o100); // XCSR IE with DONE set: interrupt now
    rig.io.irq.arm(5, 0o220);
    assert_eq!(rig.io.take_interrupt(), Some((0o220, 5)));
    assert_eq!(rig.io.take_interrupt(), Some((0o64, 4)));
    assert_eq!(rig.io.take_interrupt(), None);
}
