//! The fatal path
//!
//! A fatal condition is reported once: the first caller formats the
//! diagnostic and hands it to the panic target, every later caller finds
//! the latch set and renders nothing. The caller then halts.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};

use vesper_arch::registers::esr;

use crate::machine::PanicTarget;
use crate::text::MessageBuffer;

const MESSAGE_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatalKind {
    /// SVC immediate outside the syscall table
    UnknownSyscall { number: u16 },
    /// Synchronous exception that is not an SVC
    UnexpectedException { class: u8 },
    /// A syscall argument named memory the process may not hand over
    BadUserMemory { addr: u64, len: usize },
    /// Trap taken while the kernel idle context was running
    NoCurrentProcess,
    Fiq,
    SError,
    /// Rust panic inside the kernel
    KernelPanic,
}

impl FatalKind {
    /// Stable code shown next to the diagnostic.
    pub const fn code(&self) -> u32 {
        match self {
            Self::UnknownSyscall { .. } => 1,
            Self::UnexpectedException { .. } => 2,
            Self::BadUserMemory { .. } => 3,
            Self::NoCurrentProcess => 4,
            Self::Fiq => 5,
            Self::SError => 6,
            Self::KernelPanic => 7,
        }
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSyscall { number } => write!(f, "unknown syscall {}", number),
            Self::UnexpectedException { class } => {
                write!(f, "unexpected exception: {}", esr::ec_name(*class))
            }
            Self::BadUserMemory { addr, len } => {
                write!(f, "bad user memory {:#x}+{}", addr, len)
            }
            Self::NoCurrentProcess => write!(f, "trap with no current process"),
            Self::Fiq => write!(f, "unexpected FIQ"),
            Self::SError => write!(f, "SError"),
            Self::KernelPanic => write!(f, "kernel panic"),
        }
    }
}

/// Everything the diagnostic shows: cause, syndrome and addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FatalReport {
    pub kind: FatalKind,
    /// ESR of the trap
    pub syndrome: u64,
    /// Raw ELR: the aborting instruction, or for an SVC the one after it
    pub address: u64,
    /// FAR
    pub fault_address: u64,
}

impl FatalReport {
    pub fn code(&self) -> u32 {
        self.kind.code()
    }
}

impl fmt::Display for FatalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (ESR={:#018x} ELR={:#018x} FAR={:#018x})",
            self.kind, self.syndrome, self.address, self.fault_address
        )
    }
}

/// One-shot guard around the panic target.
pub struct HaltLatch {
    halted: AtomicBool,
}

impl HaltLatch {
    pub const fn new() -> Self {
        Self {
            halted: AtomicBool::new(false),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Render `message` unless something already has.
    ///
    /// Returns `true` if this call rendered.
    pub fn render(
        &self,
        message: fmt::Arguments<'_>,
        code: u32,
        target: &mut dyn PanicTarget,
    ) -> bool {
        if self.halted.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut buf = MessageBuffer::<MESSAGE_CAPACITY>::new();
        let _ = buf.write_fmt(message);
        target.render_fatal(buf.as_str(), code);
        true
    }

    pub fn report(&self, report: &FatalReport, target: &mut dyn PanicTarget) -> bool {
        self.render(format_args!("{}", report), report.code(), target)
    }
}

impl Default for HaltLatch {
    fn default() -> Self {
        Self::new()
    }
}
