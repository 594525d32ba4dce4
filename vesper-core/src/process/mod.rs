//! Processes
//!
//! A process is one slot of the fixed-capacity [`ProcessTable`]. Its
//! [`Pcb`] owns identity, the saved register file while it is not running,
//! its memory regions and its input ring.

mod input;
mod table;

use core::fmt;

use vesper_arch::registers::spsr;

use crate::memory::RegionHandle;
use crate::trap::SavedContext;

pub use input::{INPUT_BUFFER_CAPACITY, InputBuffer};
pub use table::{ProcessTable, SpawnParams};

/// Process table capacity
pub const MAX_PROCESSES: usize = 16;

/// Bytes of the fixed name buffer
pub const NAME_LEN: usize = 16;

/// Stable process identifier.
///
/// Identifier 0 is never handed to a process: it names the kernel when it
/// appears as a region owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u16);

impl ProcessId {
    pub const KERNEL: Self = Self(0);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn is_kernel(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessState {
    /// Slot is free (never used, or terminated)
    #[default]
    Stopped,
    /// Eligible for selection
    Ready,
    /// Owns the CPU; at most one at a time
    Running,
    /// Sleeping until its deadline
    Blocked,
}

impl ProcessState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Blocked => "blocked",
        }
    }
}

/// Exception level a process runs at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessMode {
    /// EL0t
    #[default]
    User,
    /// EL1t: kernel privilege on its own SP_EL0 stack
    Kernel,
}

impl ProcessMode {
    /// Initial SPSR: the right EL/SP selection, DAIF all clear.
    pub const fn processor_state(self) -> u64 {
        match self {
            Self::User => spsr::EL0T,
            Self::Kernel => spsr::EL1T,
        }
    }
}

/// Process control block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pcb {
    pub id: ProcessId,
    /// Valid whenever this process is not the current one
    pub context: SavedContext,
    pub state: ProcessState,
    pub mode: ProcessMode,
    pub stack: Option<RegionHandle>,
    pub stack_base: usize,
    pub stack_size: usize,
    /// Base of the first heap region, 0 if none
    pub heap_base: usize,
    pub input: InputBuffer,
    pub focused: bool,
    name: [u8; NAME_LEN],
}

impl Pcb {
    pub const EMPTY: Self = Self {
        id: ProcessId::KERNEL,
        context: SavedContext::ZERO,
        state: ProcessState::Stopped,
        mode: ProcessMode::User,
        stack: None,
        stack_base: 0,
        stack_size: 0,
        heap_base: 0,
        input: InputBuffer::EMPTY,
        focused: false,
        name: [0; NAME_LEN],
    };

    pub fn is_live(&self) -> bool {
        self.state != ProcessState::Stopped
    }

    /// Name, truncated to [`NAME_LEN`] bytes on a char boundary.
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        match core::str::from_utf8(&self.name[..len]) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&self.name[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    pub fn set_name(&mut self, name: &str) {
        let mut len = name.len().min(NAME_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        self.name = [0; NAME_LEN];
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
    }

    /// One past the highest stack address.
    pub fn stack_top(&self) -> usize {
        self.stack_base + self.stack_size
    }
}

impl Default for Pcb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_truncates() {
        let mut pcb = Pcb::EMPTY;
        pcb.set_name("a-rather-long-process-name");
        assert_eq!(pcb.name(), "a-rather-long-pr");

        pcb.set_name("shell");
        assert_eq!(pcb.name(), "shell");
    }

    #[test]
    fn test_mode_processor_state() {
        assert_eq!(spsr::exception_level(ProcessMode::User.processor_state()), 0);
        assert_eq!(spsr::exception_level(ProcessMode::Kernel.processor_state()), 1);
        // Interrupts unmasked in both modes
        assert_eq!(ProcessMode::Kernel.processor_state() & (0xF << 6), 0);
    }
}
