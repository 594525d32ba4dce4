//! Console and input syscall operations

use super::{Flow, SyscallArgs};
use crate::executive::Executive;
use crate::fatal::FatalKind;
use crate::machine::{BadAddress, Machine};
use crate::process::ProcessId;

/// Bytes copied out of process memory per console write
const PRINT_CHUNK: usize = 128;

pub(super) fn bad_memory(e: BadAddress) -> FatalKind {
    FatalKind::BadUserMemory {
        addr: e.addr,
        len: e.len,
    }
}

/// Handle Print.
///
/// * x0: pointer to the bytes
/// * x1: length
///
/// Bytes are written as-is; invalid UTF-8 is not an error. Returns the
/// number of bytes written.
pub fn handle_print(machine: &mut Machine<'_>, args: &SyscallArgs) -> Result<Flow, FatalKind> {
    let addr = args.arg0;
    let len = args.arg1 as usize;

    // Reject the whole range before writing any of it
    machine.memory.check(addr, len).map_err(bad_memory)?;

    let mut chunk = [0u8; PRINT_CHUNK];
    let mut done = 0;
    while done < len {
        let n = (len - done).min(PRINT_CHUNK);
        machine
            .memory
            .read(addr + done as u64, &mut chunk[..n])
            .map_err(|_| bad_memory(BadAddress { addr, len }))?;
        machine.console.write_bytes(&chunk[..n]);
        done += n;
    }
    Ok(Flow::Return(len as i64))
}

/// Handle ReadInput.
///
/// * x0: pointer to an 8-byte event buffer
///
/// Returns 1 if an event was copied, 0 if the caller's ring is empty.
pub fn handle_read_input(
    exec: &mut Executive,
    machine: &mut Machine<'_>,
    caller: ProcessId,
    args: &SyscallArgs,
) -> Result<Flow, FatalKind> {
    let Some(pcb) = exec.table.get_mut(caller) else {
        return Ok(Flow::Return(0));
    };
    let Some(event) = pcb.input.pop() else {
        return Ok(Flow::Return(0));
    };

    machine
        .memory
        .write(args.arg0, &event.to_bytes())
        .map_err(bad_memory)?;
    Ok(Flow::Return(1))
}
