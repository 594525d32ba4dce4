//! Heap syscall operations

use log::debug;
use vesper_syscall::SyscallError;
use vesper_syscall::error::to_return_value;

use super::{Flow, SyscallArgs};
use crate::executive::Executive;
use crate::process::ProcessId;

/// Handle HeapAlloc.
///
/// * x0: size in bytes, rounded up to whole pages
///
/// Returns the region base, or 0 when process memory is exhausted (or the
/// size is zero).
pub fn handle_heap_alloc(exec: &mut Executive, caller: ProcessId, args: &SyscallArgs) -> Flow {
    let size = args.arg0 as usize;

    let base = match exec.memory.allocate(size, caller) {
        Ok(handle) => match exec.memory.region(handle) {
            Some(region) => region.base,
            None => return Flow::Return(0),
        },
        Err(e) => {
            debug!("heap_alloc({}) for pid {}: {}", size, caller, e);
            return Flow::Return(0);
        }
    };

    if let Some(pcb) = exec.table.get_mut(caller)
        && pcb.heap_base == 0
    {
        pcb.heap_base = base;
    }
    Flow::Return(base as i64)
}

/// Handle HeapFree.
///
/// * x0: base address returned by HeapAlloc
///
/// Returns 0, or a negative [`SyscallError`]. The caller's own stack is
/// not a heap region and cannot be freed this way.
pub fn handle_heap_free(exec: &mut Executive, caller: ProcessId, args: &SyscallArgs) -> Flow {
    let base = args.arg0 as usize;

    let Some(pcb) = exec.table.get_mut(caller) else {
        return Flow::Return(SyscallError::InvalidArg.as_i64());
    };
    if base == pcb.stack_base {
        return Flow::Return(SyscallError::InvalidArg.as_i64());
    }

    let result = exec
        .memory
        .release_at(base, caller)
        .map(|()| 0)
        .map_err(SyscallError::from);

    if result.is_ok() && pcb.heap_base == base {
        pcb.heap_base = 0;
    }
    Flow::Return(to_return_value(result))
}
