//! Sleep and lifecycle syscall operations

use log::{debug, warn};

use super::{Flow, SyscallArgs};
use crate::executive::Executive;
use crate::machine::Machine;
use crate::process::{ProcessId, ProcessState};

/// Handle Sleep.
///
/// * x0: milliseconds
///
/// Zero behaves as a yield. Otherwise the caller is blocked until the
/// sleep timer path finds its deadline elapsed; it then sees 0 in x0.
pub fn handle_sleep(
    exec: &mut Executive,
    machine: &mut Machine<'_>,
    caller: ProcessId,
    args: &SyscallArgs,
) -> Flow {
    let ms = args.arg0;
    if ms == 0 {
        return Flow::Reschedule(0);
    }

    let deadline = machine.timer.now_ms().saturating_add(ms);
    if exec.sleepers.insert(caller, deadline).is_err() {
        // One entry per slot, so this means the table and queue disagree
        warn!("sleep queue full, pid {} yields instead", caller);
        return Flow::Reschedule(0);
    }
    if let Some(pcb) = exec.table.get_mut(caller) {
        pcb.state = ProcessState::Blocked;
    }
    if let Some(next) = exec.sleepers.next_deadline() {
        machine.timer.arm_sleep(next);
    }

    debug!("pid {} sleeps until {} ms", caller, deadline);
    Flow::Block(0)
}

/// Handle Stop: the caller is terminated and never resumed.
pub fn handle_stop(exec: &mut Executive, caller: ProcessId) -> Flow {
    if let Err(e) = exec.terminate_process(caller) {
        warn!("stop: pid {}: {}", caller, e);
    }
    Flow::Exit
}
