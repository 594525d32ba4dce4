//! The trap frame boundary
//!
//! The scheduler, router and gateway never touch hardware registers. They
//! see the interrupted CPU state only through [`TrapFrame`]: `capture` copies
//! it into a process snapshot, `restore` overwrites it with the snapshot
//! that should run after `eret`.

use vesper_arch::ExceptionContext;

/// Full execution context of a process while it is not running.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedContext {
    /// x0-x30; x30 is the link register
    pub registers: [u64; 31],
    pub stack_pointer: u64,
    pub program_counter: u64,
    pub processor_state: u64,
}

impl SavedContext {
    pub const ZERO: Self = Self {
        registers: [0; 31],
        stack_pointer: 0,
        program_counter: 0,
        processor_state: 0,
    };

    /// A context that starts at `entry` on `stack_top`, returning to
    /// `link` when the entry function returns.
    pub const fn start(entry: u64, stack_top: u64, processor_state: u64, link: u64) -> Self {
        let mut registers = [0; 31];
        registers[30] = link;
        Self {
            registers,
            stack_pointer: stack_top,
            program_counter: entry,
            processor_state,
        }
    }

    /// Syscall argument `n` (x0-x5).
    #[inline]
    pub fn arg(&self, n: usize) -> u64 {
        self.registers[n]
    }

    /// Write the syscall return register.
    #[inline]
    pub fn set_return(&mut self, value: u64) {
        self.registers[0] = value;
    }
}

/// The hardware-captured register snapshot of one trap.
pub trait TrapFrame {
    /// Copy the interrupted register file into a snapshot.
    fn capture(&self) -> SavedContext;
    /// Make `ctx` the state `eret` resumes.
    fn restore(&mut self, ctx: &SavedContext);
    /// Exception syndrome (ESR) of this trap.
    fn syndrome(&self) -> u64;
    /// Faulting data address (FAR), meaningful for aborts.
    fn fault_address(&self) -> u64;
}

impl TrapFrame for ExceptionContext {
    fn capture(&self) -> SavedContext {
        SavedContext {
            registers: self.gpr,
            stack_pointer: self.sp,
            program_counter: self.elr,
            processor_state: self.spsr,
        }
    }

    fn restore(&mut self, ctx: &SavedContext) {
        self.gpr = ctx.registers;
        self.sp = ctx.stack_pointer;
        self.elr = ctx.program_counter;
        self.spsr = ctx.processor_state;
    }

    fn syndrome(&self) -> u64 {
        self.esr
    }

    fn fault_address(&self) -> u64 {
        self.far
    }
}

impl From<&SavedContext> for ExceptionContext {
    fn from(ctx: &SavedContext) -> Self {
        let mut frame = ExceptionContext::default();
        frame.restore(ctx);
        frame
    }
}
