//! End-to-end scenarios: the executive driven trap by trap over fake
//! hardware, the way the kernel's vector handlers drive it.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};

use embedded_graphics::geometry::Point;
use embedded_graphics::pixelcolor::Rgb888;
use vesper_arch::registers::esr::ec;
use vesper_core::irq::DeviceLine;
use vesper_core::process::MAX_PROCESSES;
use vesper_core::{FatalKind, HaltLatch, ProcessError, ProcessState};
use vesper_syscall::{KeyEvent, Syscall, SyscallError, unpack_pair};

use support::*;

const A: u64 = 0x4100_0000;
const B: u64 = 0x4200_0000;
const C: u64 = 0x4300_0000;

fn running_count(rig: &Rig) -> usize {
    rig.exec.table().running_count()
}

#[test]
fn test_two_processes_alternate_on_ticks() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.spawn(B);
    rig.start();
    assert_eq!(rig.running_entry(), A);

    let mut seen = Vec::new();
    for _ in 0..6 {
        rig.irq(TICK);
        seen.push(rig.running_entry());
        assert_eq!(running_count(&rig), 1);
    }
    assert_eq!(seen, [B, A, B, A, B, A]);
    assert_eq!(rig.hw.gic.acked, vec![TICK; 6]);
    // One re-arm at start, one per tick
    assert_eq!(rig.hw.clock.tick_rearms, 7);
}

#[test]
fn test_preempted_registers_survive_a_round_trip() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.spawn(B);
    rig.start();

    rig.frame.gpr[19] = 0xAAAA;
    rig.frame.elr = A + 0x40;
    rig.irq(TICK);
    assert_eq!(rig.running_entry(), B);
    rig.frame.gpr[19] = 0xBBBB;

    rig.irq(TICK);
    assert_eq!(rig.frame.elr, A + 0x40);
    assert_eq!(rig.frame.gpr[19], 0xAAAA);
}

#[test]
fn test_sleep_wakes_exactly_once_at_deadline() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.spawn(B);
    rig.hw.clock.now = 1_000;
    rig.start();

    rig.call(Syscall::Sleep, &[100]).unwrap();
    assert_eq!(rig.running_entry(), B);
    assert_eq!(rig.exec.process(a).unwrap().state, ProcessState::Blocked);
    assert_eq!(rig.hw.clock.sleep_deadline, Some(1_100));

    // Quanta pass without A
    rig.hw.clock.now = 1_050;
    rig.irq(TICK);
    assert_eq!(rig.running_entry(), B);

    // An early sleep interrupt wakes nobody
    rig.hw.clock.now = 1_099;
    rig.irq(SLEEP);
    assert_eq!(rig.exec.process(a).unwrap().state, ProcessState::Blocked);
    assert_eq!(rig.hw.clock.sleep_deadline, Some(1_100));

    rig.hw.clock.now = 1_100;
    rig.irq(SLEEP);
    assert_eq!(rig.exec.process(a).unwrap().state, ProcessState::Ready);
    assert_eq!(rig.hw.clock.sleep_deadline, None);
    // No forced switch on the sleep line
    assert_eq!(rig.running_entry(), B);

    rig.irq(TICK);
    assert_eq!(rig.running_entry(), A);
    assert_eq!(rig.x0(), 0);

    // A second sleep interrupt changes nothing
    rig.hw.clock.now = 1_200;
    rig.irq(SLEEP);
    assert_eq!(rig.exec.process(a).unwrap().state, ProcessState::Running);
    assert_eq!(running_count(&rig), 1);
}

#[test]
fn test_endless_sleep_blocks_without_firing() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.spawn(B);
    rig.hw.clock.now = 1_000;
    rig.start();

    rig.call(Syscall::Sleep, &[u64::MAX]).unwrap();
    assert_eq!(rig.running_entry(), B);
    assert_eq!(rig.exec.process(a).unwrap().state, ProcessState::Blocked);
    // The deadline saturates instead of wrapping into the past
    assert_eq!(rig.hw.clock.sleep_deadline, Some(u64::MAX));

    rig.hw.clock.now = u64::MAX - 1;
    rig.irq(SLEEP);
    assert_eq!(rig.exec.process(a).unwrap().state, ProcessState::Blocked);
    assert_eq!(rig.hw.clock.sleep_deadline, Some(u64::MAX));

    rig.irq(TICK);
    assert_eq!(rig.running_entry(), B);
    assert_eq!(running_count(&rig), 1);
}

#[test]
fn test_sleep_zero_yields() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.spawn(B);
    rig.start();

    rig.call(Syscall::Sleep, &[0]).unwrap();
    assert_eq!(rig.running_entry(), B);
    assert_eq!(rig.hw.clock.sleep_deadline, None);
}

#[test]
fn test_lone_sleeper_idles_then_resumes() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.start();

    rig.call(Syscall::Sleep, &[10]).unwrap();
    assert_eq!(rig.running_entry(), IDLE_ENTRY);
    assert_eq!(running_count(&rig), 0);
    assert!(rig.exec.current().is_none());

    // Ticks while idle stay idle
    rig.irq(TICK);
    assert_eq!(rig.running_entry(), IDLE_ENTRY);

    // The idle loop advanced; its context is kept across traps
    rig.frame.elr = IDLE_ENTRY + 8;
    rig.hw.clock.now = 10;
    rig.irq(SLEEP);
    assert_eq!(rig.running_entry(), A);
    assert_eq!(rig.exec.process(a).unwrap().state, ProcessState::Running);

    rig.call(Syscall::Sleep, &[10]).unwrap();
    assert_eq!(rig.frame.elr, IDLE_ENTRY + 8);
}

#[test]
fn test_full_table_stop_and_reuse() {
    let mut rig = Rig::new();
    let ids: Vec<_> = (0..MAX_PROCESSES)
        .map(|i| rig.spawn(A + ((i as u64) << 16)))
        .collect();
    assert_eq!(
        rig.exec
            .create_process(C, STACK_SIZE, vesper_core::ProcessMode::User, "extra"),
        Err(ProcessError::OutOfProcessSlots)
    );

    rig.start();
    let first = ids[0];
    let slot = rig.exec.table().slot_of(first).unwrap();
    rig.exec.focus(first).unwrap();
    rig.call(Syscall::Stop, &[]).unwrap();
    assert!(rig.exec.process(first).is_none());
    assert_eq!(rig.exec.live_count(), MAX_PROCESSES - 1);

    let reborn = rig
        .exec
        .create_process(C, STACK_SIZE, vesper_core::ProcessMode::User, "reborn")
        .unwrap();
    assert_ne!(reborn, first);
    assert_eq!(rig.exec.table().slot_of(reborn), Some(slot));

    let pcb = rig.exec.process(reborn).unwrap();
    assert_eq!(pcb.state, ProcessState::Ready);
    assert!(pcb.input.is_empty());
    assert!(!pcb.focused);
    assert_eq!(pcb.heap_base, 0);
    assert_eq!(pcb.context.program_counter, C);
    assert_eq!(pcb.context.registers[..30], [0; 30]);
    assert_eq!(pcb.context.registers[30], EXIT_TRAMPOLINE);
    assert_eq!(pcb.name(), "reborn");
}

#[test]
fn test_stopped_process_never_runs_again() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.spawn(B);
    rig.spawn(C);
    rig.start();

    rig.call(Syscall::Stop, &[]).unwrap();
    assert!(rig.exec.process(a).is_none());
    assert_ne!(rig.running_entry(), A);

    for _ in 0..20 {
        rig.irq(TICK);
        assert_ne!(rig.running_entry(), A);
        assert_eq!(running_count(&rig), 1);
    }
}

#[test]
fn test_last_process_stopping_idles() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    rig.call(Syscall::Stop, &[]).unwrap();
    assert_eq!(rig.running_entry(), IDLE_ENTRY);
    assert_eq!(rig.exec.live_count(), 0);
    assert_eq!(rig.exec.memory().free_pages(), rig.exec.memory().total_pages());
}

#[test]
fn test_external_terminate_of_running_process_reschedules() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    let b = rig.spawn(B);
    rig.start();

    rig.exec.terminate_process(a).unwrap();
    assert_eq!(rig.exec.current().map(|p| p.id), Some(b));
    assert_eq!(
        rig.exec.terminate_process(a),
        Err(ProcessError::NoSuchProcess)
    );
}

#[test]
fn test_terminate_sleeper_clears_its_deadline() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.spawn(B);
    rig.start();

    rig.call(Syscall::Sleep, &[50]).unwrap();
    rig.exec.terminate_process(a).unwrap();

    rig.hw.clock.now = 50;
    rig.irq(SLEEP);
    assert_eq!(rig.hw.clock.sleep_deadline, None);
    assert_eq!(rig.running_entry(), B);
}

#[test]
fn test_unknown_syscall_panics_once_with_elr() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    let report = rig.svc(99, &[]).unwrap_err();
    assert_eq!(report.kind, FatalKind::UnknownSyscall { number: 99 });
    // The raw ELR: for an SVC, the instruction after it
    assert_eq!(report.address, A + 4);

    let latch = HaltLatch::new();
    let mut target = CapturePanic::default();
    assert!(latch.report(&report, &mut target));
    // A second fatal entry while halting renders nothing
    assert!(!latch.report(&report, &mut target));
    assert_eq!(target.rendered.len(), 1);
    assert!(target.rendered[0].0.contains("unknown syscall 99"));
    assert!(target.rendered[0].0.contains("ELR=0x0000000041000004"));
}

#[test]
fn test_non_svc_exception_is_fatal() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    rig.frame.esr = u64::from(ec::DATA_ABORT_SAME) << 26;
    rig.frame.far = 0xdead_0000;
    let report = rig
        .exec
        .handle_sync(&mut rig.frame, &mut rig.hw.machine())
        .unwrap_err();
    assert_eq!(
        report.kind,
        FatalKind::UnexpectedException {
            class: ec::DATA_ABORT_SAME
        }
    );
    assert_eq!(report.fault_address, 0xdead_0000);
}

#[test]
fn test_trap_from_idle_is_fatal() {
    let mut rig = Rig::new();
    rig.start();
    assert_eq!(rig.running_entry(), IDLE_ENTRY);

    let report = rig.call(Syscall::Yield, &[]).unwrap_err();
    assert_eq!(report.kind, FatalKind::NoCurrentProcess);
}

#[test]
fn test_heap_alloc_and_free() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.start();

    rig.call(Syscall::HeapAlloc, &[5000]).unwrap();
    let base = rig.x0();
    assert_ne!(base, 0);
    assert_eq!(rig.exec.process(a).unwrap().heap_base, base as usize);

    rig.call(Syscall::HeapFree, &[base]).unwrap();
    assert_eq!(rig.x0() as i64, 0);
    rig.call(Syscall::HeapFree, &[base]).unwrap();
    assert_eq!(rig.x0() as i64, SyscallError::AlreadyReleased.as_i64());
    rig.call(Syscall::HeapFree, &[0x10]).unwrap();
    assert_eq!(rig.x0() as i64, SyscallError::UnknownRegion.as_i64());

    // Exhaustion is a 0 return, not a fault
    rig.call(Syscall::HeapAlloc, &[(MEMORY_SIZE * 2) as u64]).unwrap();
    assert_eq!(rig.x0(), 0);
    rig.call(Syscall::HeapAlloc, &[0]).unwrap();
    assert_eq!(rig.x0(), 0);
}

#[test]
fn test_huge_heap_requests_return_zero() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();
    let before = rig.exec.memory().free_pages();

    for size in [u64::MAX, u64::MAX - 4094, 1 << 63] {
        rig.call(Syscall::HeapAlloc, &[size]).unwrap();
        assert_eq!(rig.x0(), 0, "size {:#x}", size);
    }
    assert_eq!(rig.exec.memory().free_pages(), before);

    rig.call(Syscall::HeapFree, &[u64::MAX]).unwrap();
    assert_eq!(rig.x0() as i64, SyscallError::UnknownRegion.as_i64());

    // The allocator is still usable afterwards
    rig.call(Syscall::HeapAlloc, &[4096]).unwrap();
    assert_ne!(rig.x0(), 0);
}

#[test]
fn test_heap_free_rejects_foreign_region_and_own_stack() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.spawn(B);
    rig.start();

    rig.call(Syscall::HeapAlloc, &[4096]).unwrap();
    let a_region = rig.x0();
    let a_stack = rig.exec.process(a).unwrap().stack_base as u64;
    rig.call(Syscall::HeapFree, &[a_stack]).unwrap();
    assert_eq!(rig.x0() as i64, SyscallError::InvalidArg.as_i64());

    rig.irq(TICK);
    assert_eq!(rig.running_entry(), B);
    rig.call(Syscall::HeapFree, &[a_region]).unwrap();
    assert_eq!(rig.x0() as i64, SyscallError::NotOwner.as_i64());
}

#[test]
fn test_stop_releases_heap() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.spawn(B);
    rig.start();
    let before = rig.exec.memory().free_pages();

    rig.call(Syscall::HeapAlloc, &[3 * 4096]).unwrap();
    assert_eq!(rig.exec.memory().free_pages(), before - 3);
    rig.call(Syscall::Stop, &[]).unwrap();
    assert_eq!(
        rig.exec.memory().free_pages(),
        before + STACK_SIZE / 4096
    );
}

#[test]
fn test_print_copies_from_process_memory() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    rig.call(Syscall::HeapAlloc, &[4096]).unwrap();
    let buf = rig.x0();
    let text = "hello from a process\n".repeat(10);
    rig.hw.memory.poke(buf as usize, text.as_bytes());

    rig.call(Syscall::Print, &[buf, text.len() as u64]).unwrap();
    assert_eq!(rig.x0(), text.len() as u64);
    assert_eq!(rig.hw.console.output, text.as_bytes());
}

#[test]
fn test_print_of_invalid_utf8_is_not_fatal() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    rig.call(Syscall::HeapAlloc, &[16]).unwrap();
    let buf = rig.x0();
    rig.hw.memory.poke(buf as usize, &[b'o', 0xFF, b'k']);
    rig.call(Syscall::Print, &[buf, 3]).unwrap();
    assert_eq!(rig.hw.console.output, [b'o', 0xFF, b'k']);
}

#[test]
fn test_print_of_unmapped_memory_is_fatal() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    let report = rig.call(Syscall::Print, &[0x10, 4]).unwrap_err();
    assert_eq!(report.kind, FatalKind::BadUserMemory { addr: 0x10, len: 4 });
    assert!(rig.hw.console.output.is_empty());
}

#[test]
fn test_print_running_past_memory_end_writes_nothing() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    let tail = (MEMORY_BASE + MEMORY_SIZE - 64) as u64;
    rig.hw.memory.poke(tail as usize, &[b'x'; 64]);
    let report = rig.call(Syscall::Print, &[tail, 4096]).unwrap_err();
    assert_eq!(report.kind, FatalKind::BadUserMemory { addr: tail, len: 4096 });
    assert!(rig.hw.console.output.is_empty());
}

#[test]
fn test_print_with_wrapping_range_is_fatal() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    let report = rig.call(Syscall::Print, &[u64::MAX - 1, 4]).unwrap_err();
    assert_eq!(
        report.kind,
        FatalKind::BadUserMemory {
            addr: u64::MAX - 1,
            len: 4
        }
    );
    let report = rig.call(Syscall::Print, &[MEMORY_BASE as u64, u64::MAX]).unwrap_err();
    assert!(matches!(report.kind, FatalKind::BadUserMemory { .. }));
    assert!(rig.hw.console.output.is_empty());
}

#[test]
fn test_input_reaches_focused_process() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.spawn(B);
    rig.start();
    rig.exec.focus(a).unwrap();

    let key = KeyEvent::from_ascii(b'q').unwrap();
    rig.hw.input.events.push_back(key);
    rig.irq(INPUT);
    assert_eq!(rig.hw.gic.acked, [INPUT]);
    assert_eq!(rig.running_entry(), A);

    rig.call(Syscall::HeapAlloc, &[16]).unwrap();
    let buf = rig.x0();
    rig.call(Syscall::ReadInput, &[buf]).unwrap();
    assert_eq!(rig.x0(), 1);
    let copied: [u8; 8] = rig.hw.memory.peek(buf as usize, 8).try_into().unwrap();
    assert_eq!(KeyEvent::from_bytes(copied), key);

    rig.call(Syscall::ReadInput, &[buf]).unwrap();
    assert_eq!(rig.x0(), 0);
}

#[test]
fn test_input_without_focus_is_dropped() {
    let mut rig = Rig::new();
    let a = rig.spawn(A);
    rig.start();

    rig.hw.input.events.push_back(KeyEvent::key(0, 4));
    rig.irq(INPUT);
    assert!(rig.exec.process(a).unwrap().input.is_empty());
    assert!(rig.hw.input.events.is_empty());
}

static STORAGE_HITS: AtomicUsize = AtomicUsize::new(0);

fn storage_callback() {
    STORAGE_HITS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_device_lines_ack_then_callback() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.spawn(B);
    rig.exec.install_callback(DeviceLine::Storage, storage_callback);
    rig.start();

    rig.irq(STORAGE);
    assert_eq!(STORAGE_HITS.load(Ordering::SeqCst), 1);
    // No callback on USB: logged, acknowledged, resumed
    rig.irq(USB);
    rig.irq(NET1);
    assert_eq!(rig.hw.gic.acked, [STORAGE, USB, NET1]);
    assert_eq!(rig.running_entry(), A);
}

#[test]
fn test_unknown_and_spurious_interrupts_resume_current() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.spawn(B);
    rig.start();
    rig.frame.gpr[3] = 33;

    rig.irq(77);
    assert_eq!(rig.hw.gic.acked, [77]);
    assert_eq!(rig.running_entry(), A);

    // Nothing pending at all
    rig.exec.handle_irq(&mut rig.frame, &mut rig.hw.machine());
    assert_eq!(rig.hw.gic.acked, [77]);
    assert_eq!(rig.running_entry(), A);
    assert_eq!(rig.frame.gpr[3], 33);
}

#[test]
fn test_queries() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.start();

    rig.call(Syscall::ScreenSize, &[]).unwrap();
    assert_eq!(unpack_pair(rig.x0()), (0, 0));
    rig.call(Syscall::CharSize, &[2]).unwrap();
    assert_eq!(unpack_pair(rig.x0()), (16, 26));

    rig.hw.clock.now = 4242;
    rig.call(Syscall::UptimeMs, &[]).unwrap();
    assert_eq!(rig.x0(), 4242);

    rig.call(Syscall::DrawString, &[0, 0, 0x10, 0, 1, 0xFFFFFF]).unwrap();
    assert_eq!(rig.x0(), 0);
}

#[test]
fn test_extreme_draw_arguments_are_clipped() {
    const RED: u64 = 0x00FF_0000;
    let far_left = i32::MIN as u32 as u64;
    let far_right = i32::MAX as u32 as u64;

    let mut rig = Rig::new();
    rig.hw.display = Screen::mock();
    rig.spawn(A);
    rig.start();

    rig.call(Syscall::ScreenSize, &[]).unwrap();
    assert_eq!(unpack_pair(rig.x0()), (64, 64));

    rig.call(Syscall::HeapAlloc, &[16]).unwrap();
    let text = rig.x0();
    rig.hw.memory.poke(text as usize, b"AB");

    let calls: [(Syscall, &[u64]); 6] = [
        (Syscall::DrawLine, &[far_left, 0, far_right, 0, RED]),
        (Syscall::FillRect, &[far_right, far_right, u64::MAX, u64::MAX, RED]),
        (Syscall::FillRect, &[far_left, 10, 4, 4, RED]),
        (Syscall::DrawChar, &[far_right - 4, 0, u64::from(b'#'), 16, RED]),
        (Syscall::DrawString, &[far_right - 4, 0, text, 2, 2, RED]),
        (Syscall::DrawPixel, &[u64::MAX, u64::MAX, RED]),
    ];
    for (syscall, args) in calls {
        rig.call(syscall, args).unwrap();
        assert_eq!(rig.x0(), 0, "{:?}", syscall);
    }

    // Only the clipped line reached the screen
    let pixels = rig.hw.display.pixels();
    let red = Some(Rgb888::new(0xFF, 0, 0));
    assert_eq!(pixels.get_pixel(Point::new(0, 0)), red);
    assert_eq!(pixels.get_pixel(Point::new(63, 0)), red);
    let area = pixels.affected_area();
    assert_eq!((area.top_left, area.size.width, area.size.height), (Point::zero(), 64, 1));
}

#[test]
fn test_yield_rotates_and_returns_zero() {
    let mut rig = Rig::new();
    rig.spawn(A);
    rig.spawn(B);
    rig.start();

    rig.frame.gpr[0] = 7;
    rig.call(Syscall::Yield, &[]).unwrap();
    assert_eq!(rig.running_entry(), B);
    rig.call(Syscall::Yield, &[]).unwrap();
    assert_eq!(rig.running_entry(), A);
    assert_eq!(rig.x0(), 0);
}
