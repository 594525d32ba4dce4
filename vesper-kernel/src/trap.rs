//! Trap entry
//!
//! Installs the handlers the vector stubs call and routes every trap into
//! the [`Executive`]. All kernel state lives in one [`TrapCell`]; each
//! handler mints the single token for its trap.
//!
//! # Trap Flow
//!
//! 1. Vector stub spills registers into an `ExceptionContext`
//! 2. Handler below borrows the kernel and calls the executive
//! 3. The executive overwrites the frame with whatever runs next
//! 4. Stub restores from the frame and `eret`s

use log::error;
use vesper_arch::registers::{esr, spsr};
use vesper_arch::{ExceptionContext, TrapCell, TrapToken, exceptions};
use vesper_core::{Executive, FatalKind, FatalReport, HaltLatch};

use crate::board::{Board, PanicScreen};

pub struct Kernel {
    pub exec: Executive,
    pub board: Board,
}

static KERNEL: TrapCell<Kernel> = TrapCell::new(Kernel {
    exec: Executive::new(),
    board: Board::new(),
});

/// Shared by trap fatals and Rust panics; only the first one renders
pub static FATAL: HaltLatch = HaltLatch::new();

/// Borrow kernel state for the duration of `token`.
pub fn kernel(token: &mut TrapToken) -> &mut Kernel {
    KERNEL.borrow_mut(token)
}

/// Point the vector stubs at the handlers below.
pub fn install() {
    exceptions::set_sync_handler(on_sync);
    exceptions::set_irq_handler(on_irq);
    exceptions::set_fiq_handler(on_fiq);
    exceptions::set_serror_handler(on_serror);
    exceptions::init();
}

fn on_sync(frame: &mut ExceptionContext) {
    // SAFETY: Exception entry masks DAIF, and this is the only token of
    // this trap.
    let mut token = unsafe { TrapToken::mint() };
    let Kernel { exec, board } = kernel(&mut token);

    if let Err(report) = exec.handle_sync(frame, &mut board.machine()) {
        fatal(&report, frame);
    }
}

fn on_irq(frame: &mut ExceptionContext) {
    // SAFETY: As for `on_sync`.
    let mut token = unsafe { TrapToken::mint() };
    let Kernel { exec, board } = kernel(&mut token);
    exec.handle_irq(frame, &mut board.machine());
}

fn on_fiq(frame: &mut ExceptionContext) {
    fatal(&report(FatalKind::Fiq, frame), frame);
}

fn on_serror(frame: &mut ExceptionContext) {
    fatal(&report(FatalKind::SError, frame), frame);
}

fn report(kind: FatalKind, frame: &ExceptionContext) -> FatalReport {
    FatalReport {
        kind,
        syndrome: frame.esr,
        address: frame.elr,
        fault_address: frame.far,
    }
}

/// Log the trap state, render the diagnostic once, halt.
fn fatal(report: &FatalReport, frame: &ExceptionContext) -> ! {
    if !FATAL.is_halted() {
        dump_exception_context(frame);
    }
    FATAL.report(report, &mut PanicScreen);
    vesper_arch::halt()
}

/// Dump the trapped context at error level.
fn dump_exception_context(ctx: &ExceptionContext) {
    let ec = esr::exception_class(ctx.esr);
    error!(
        "Exception: {} ESR={:#018x} [EC={:#04x} ISS={:#07x}]",
        esr::ec_name(ec),
        ctx.esr,
        ec,
        esr::iss(ctx.esr)
    );
    error!("ELR:   {:#018x}", ctx.elr);
    error!("FAR:   {:#018x}", ctx.far);
    error!("SPSR:  {:#018x} [{}]", ctx.spsr, spsr::el_name(ctx.spsr));

    if esr::is_abort(ec) {
        let iss = esr::iss(ctx.esr);
        let dfsc = esr::abort::dfsc(iss);
        error!(
            "  Status: {} | {} | FAR {}",
            esr::abort::dfsc_name(dfsc),
            if esr::abort::wnr(iss) { "Write" } else { "Read" },
            if esr::abort::fnv(iss) { "invalid" } else { "valid" }
        );
    }

    // Print GPRs in 2-column format
    for i in (0..30).step_by(2) {
        error!(
            "  X{:02}: {:#018x}    X{:02}: {:#018x}",
            i,
            ctx.gpr[i],
            i + 1,
            ctx.gpr[i + 1]
        );
    }
    error!("  X30: {:#018x}     SP: {:#018x}", ctx.gpr[30], ctx.sp);
}
