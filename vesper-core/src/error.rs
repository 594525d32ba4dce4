//! Error types for the process core

use core::fmt;

use vesper_syscall::SyscallError;

/// Errors from process table operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// Every slot is live and none can be reused
    OutOfProcessSlots,
    /// The stack could not be carved out of process memory
    OutOfMemory,
    /// No live process has this id
    NoSuchProcess,
    /// Stack size of zero
    InvalidStackSize,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfProcessSlots => write!(f, "process table full"),
            Self::OutOfMemory => write!(f, "out of process memory"),
            Self::NoSuchProcess => write!(f, "no such process"),
            Self::InvalidStackSize => write!(f, "invalid stack size"),
        }
    }
}

/// Errors from the process memory allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// No contiguous run of free pages is large enough
    Exhausted,
    /// Region table has no free entry
    TooManyRegions,
    /// Zero-byte request
    ZeroSize,
    /// Handle or address does not name a region
    UnknownRegion,
    /// Region belongs to a different owner
    NotOwner,
    /// Handle refers to a region that was already released
    AlreadyReleased,
    /// Window base not page aligned, or larger than the bitmap covers
    InvalidWindow,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "process memory exhausted"),
            Self::TooManyRegions => write!(f, "region table full"),
            Self::ZeroSize => write!(f, "zero-sized region"),
            Self::UnknownRegion => write!(f, "unknown region"),
            Self::NotOwner => write!(f, "region owned by another process"),
            Self::AlreadyReleased => write!(f, "region already released"),
            Self::InvalidWindow => write!(f, "invalid memory window"),
        }
    }
}

impl From<MemoryError> for SyscallError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::Exhausted | MemoryError::TooManyRegions => Self::NoMemory,
            MemoryError::ZeroSize | MemoryError::InvalidWindow => Self::InvalidArg,
            MemoryError::UnknownRegion => Self::UnknownRegion,
            MemoryError::NotOwner => Self::NotOwner,
            MemoryError::AlreadyReleased => Self::AlreadyReleased,
        }
    }
}
