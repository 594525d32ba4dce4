//! Round-robin scheduler
//!
//! Selection scans the allocated slots cyclically, starting after the last
//! selected slot, and takes the first `Ready` process. That slot itself is
//! the last candidate, so a process that yields with nobody else ready is
//! picked again.
//!
//! Switching only updates table state. Moving registers between the PCBs
//! and the trap frame is the trap path's job.

use log::trace;

use crate::process::{ProcessId, ProcessState, ProcessTable};

/// Outcome of one scheduling decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    /// The current process keeps the CPU
    Kept(ProcessId),
    /// A different process now runs
    Switched(ProcessId),
    /// Nothing can run; the CPU resumes the idle context
    Idle,
}

impl Selection {
    pub fn running(self) -> Option<ProcessId> {
        match self {
            Self::Kept(id) | Self::Switched(id) => Some(id),
            Self::Idle => None,
        }
    }
}

/// Quantum expiry.
pub fn tick(table: &mut ProcessTable) -> Selection {
    advance(table)
}

/// The running process gives up the CPU but stays eligible.
pub fn yield_now(table: &mut ProcessTable) -> Selection {
    advance(table)
}

/// The running process has blocked or terminated; pick someone else.
pub fn halt(table: &mut ProcessTable) -> Selection {
    advance(table)
}

/// Select the first process at boot.
pub fn start(table: &mut ProcessTable) -> Selection {
    advance(table)
}

fn advance(table: &mut ProcessTable) -> Selection {
    let allocated = table.allocated();
    let next = next_ready(table, allocated);
    let current = table.current;

    let Some(next) = next else {
        return match current {
            Some(index) if table.slot(index).state == ProcessState::Running => {
                Selection::Kept(table.slot(index).id)
            }
            _ => {
                if current.is_some() {
                    trace!("sched: nothing ready, idling");
                }
                table.current = None;
                Selection::Idle
            }
        };
    };

    if let Some(index) = current {
        let prev = table.slot_mut(index);
        if prev.state == ProcessState::Running {
            prev.state = ProcessState::Ready;
        }
    }

    let pcb = table.slot_mut(next);
    pcb.state = ProcessState::Running;
    let id = pcb.id;
    table.current = Some(next);
    table.cursor = Some(next);

    if current == Some(next) {
        Selection::Kept(id)
    } else {
        trace!("sched: switch to {} (slot {})", id, next);
        Selection::Switched(id)
    }
}

fn next_ready(table: &ProcessTable, allocated: usize) -> Option<usize> {
    let start = table.cursor.map_or(0, |c| c + 1);
    (0..allocated)
        .map(|offset| (start + offset) % allocated)
        .find(|&index| table.slot(index).state == ProcessState::Ready)
}
