//! Drawing syscall operations
//!
//! Thin forwarding to the [`Display`](crate::machine::Display). Colours
//! are the low 32 bits of their argument.

use log::trace;
use vesper_syscall::pack_pair;

use super::io_ops::bad_memory;
use super::{Flow, SyscallArgs, coord};
use crate::fatal::FatalKind;
use crate::machine::{BadAddress, Machine};

/// Longest string one DrawString call renders; the rest is dropped
pub const MAX_DRAW_STRING: usize = 256;

#[inline]
fn colour(arg: u64) -> u32 {
    arg as u32
}

pub fn handle_clear(machine: &mut Machine<'_>, args: &SyscallArgs) -> Flow {
    machine.display.clear(colour(args.arg0));
    Flow::Return(0)
}

pub fn handle_draw_pixel(machine: &mut Machine<'_>, args: &SyscallArgs) -> Flow {
    machine
        .display
        .draw_pixel(coord(args.arg0), coord(args.arg1), colour(args.arg2));
    Flow::Return(0)
}

pub fn handle_draw_line(machine: &mut Machine<'_>, args: &SyscallArgs) -> Flow {
    machine.display.draw_line(
        coord(args.arg0),
        coord(args.arg1),
        coord(args.arg2),
        coord(args.arg3),
        colour(args.arg4),
    );
    Flow::Return(0)
}

pub fn handle_fill_rect(machine: &mut Machine<'_>, args: &SyscallArgs) -> Flow {
    machine.display.fill_rect(
        coord(args.arg0),
        coord(args.arg1),
        args.arg2 as u32,
        args.arg3 as u32,
        colour(args.arg4),
    );
    Flow::Return(0)
}

pub fn handle_draw_char(machine: &mut Machine<'_>, args: &SyscallArgs) -> Flow {
    machine.display.draw_char(
        coord(args.arg0),
        coord(args.arg1),
        args.arg2 as u8,
        args.arg3 as u32,
        colour(args.arg4),
    );
    Flow::Return(0)
}

/// Handle DrawString.
///
/// * x0, x1: position
/// * x2, x3: pointer and length of the text
/// * x4: scale
/// * x5: colour
pub fn handle_draw_string(
    machine: &mut Machine<'_>,
    args: &SyscallArgs,
) -> Result<Flow, FatalKind> {
    let addr = args.arg2;
    let len = args.arg3 as usize;
    let shown = len.min(MAX_DRAW_STRING);
    if shown < len {
        trace!("draw_string: truncating {} bytes to {}", len, shown);
    }

    if shown == 0 {
        return Ok(Flow::Return(0));
    }

    let mut text = [0u8; MAX_DRAW_STRING];
    machine
        .memory
        .read(addr, &mut text[..shown])
        .map_err(|_| bad_memory(BadAddress { addr, len }))?;

    machine.display.draw_text(
        coord(args.arg0),
        coord(args.arg1),
        &text[..shown],
        args.arg4 as u32,
        colour(args.arg5),
    );
    Ok(Flow::Return(0))
}

pub fn handle_screen_size(machine: &mut Machine<'_>) -> Flow {
    let (width, height) = machine.display.size();
    Flow::Return(pack_pair(width, height) as i64)
}

pub fn handle_char_size(machine: &mut Machine<'_>, args: &SyscallArgs) -> Flow {
    let (width, height) = machine.display.char_size(args.arg0 as u32);
    Flow::Return(pack_pair(width, height) as i64)
}
