//! Syscall gateway
//!
//! # ABI
//!
//! - the syscall number is the 16-bit immediate of `svc #imm`, read from
//!   the ISS field of ESR_EL1
//! - x0-x5: arguments
//! - x0: return value
//!
//! # Entry Point
//!
//! The executive captures the caller into its PCB, then calls
//! [`dispatch`]. Handlers read arguments from the snapshot and say how the
//! call ends through a [`Flow`]; the return value always lands in the
//! caller's snapshot before any reschedule.

mod gfx_ops;
mod io_ops;
mod mem_ops;
mod time_ops;

use log::trace;
use vesper_syscall::Syscall;

use crate::executive::Executive;
use crate::fatal::FatalKind;
use crate::machine::Machine;
use crate::process::ProcessId;
use crate::trap::SavedContext;

/// Syscall arguments extracted from registers.
#[derive(Debug, Clone, Copy)]
pub struct SyscallArgs {
    pub arg0: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
    pub arg4: u64,
    pub arg5: u64,
}

impl SyscallArgs {
    pub fn from_context(ctx: &SavedContext) -> Self {
        Self {
            arg0: ctx.arg(0),
            arg1: ctx.arg(1),
            arg2: ctx.arg(2),
            arg3: ctx.arg(3),
            arg4: ctx.arg(4),
            arg5: ctx.arg(5),
        }
    }
}

/// How a syscall ends for its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Write x0 and resume the caller
    Return(i64),
    /// Write x0, then let the scheduler choose
    Reschedule(i64),
    /// Write x0; the caller is now blocked
    Block(i64),
    /// The caller no longer exists
    Exit,
}

/// Run syscall `number` for `caller`.
///
/// Unknown numbers and malformed arguments are fatal.
pub fn dispatch(
    exec: &mut Executive,
    machine: &mut Machine<'_>,
    caller: ProcessId,
    number: u16,
    args: &SyscallArgs,
) -> Result<Flow, FatalKind> {
    let Some(syscall) = Syscall::from_number(number) else {
        return Err(FatalKind::UnknownSyscall { number });
    };

    trace!(
        "syscall: pid {} {} (x0={:#x}, x1={:#x}, x2={:#x})",
        caller,
        syscall.name(),
        args.arg0,
        args.arg1,
        args.arg2
    );

    match syscall {
        // Memory
        Syscall::HeapAlloc => Ok(mem_ops::handle_heap_alloc(exec, caller, args)),
        Syscall::HeapFree => Ok(mem_ops::handle_heap_free(exec, caller, args)),

        // Console and input
        Syscall::Print => io_ops::handle_print(machine, args),
        Syscall::ReadInput => io_ops::handle_read_input(exec, machine, caller, args),

        // Drawing
        Syscall::Clear => Ok(gfx_ops::handle_clear(machine, args)),
        Syscall::DrawPixel => Ok(gfx_ops::handle_draw_pixel(machine, args)),
        Syscall::DrawLine => Ok(gfx_ops::handle_draw_line(machine, args)),
        Syscall::FillRect => Ok(gfx_ops::handle_fill_rect(machine, args)),
        Syscall::DrawChar => Ok(gfx_ops::handle_draw_char(machine, args)),
        Syscall::DrawString => gfx_ops::handle_draw_string(machine, args),
        Syscall::ScreenSize => Ok(gfx_ops::handle_screen_size(machine)),
        Syscall::CharSize => Ok(gfx_ops::handle_char_size(machine, args)),

        // Scheduling
        Syscall::Sleep => Ok(time_ops::handle_sleep(exec, machine, caller, args)),
        Syscall::Yield => Ok(Flow::Reschedule(0)),
        Syscall::UptimeMs => Ok(Flow::Return(machine.timer.now_ms() as i64)),
        Syscall::Stop => Ok(time_ops::handle_stop(exec, caller)),
    }
}

/// Coordinate argument: the low 32 bits, sign-extended.
#[inline]
pub(crate) fn coord(arg: u64) -> i32 {
    arg as u32 as i32
}
