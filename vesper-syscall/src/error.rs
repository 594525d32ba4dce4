//! Syscall error codes
//!
//! Negative values indicate errors, zero indicates success, positive values
//! carry a result. Only `heap_free` reports these today; exhaustion on
//! `heap_alloc` is the documented 0 return.

#[repr(i64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallError {
    Ok = 0,
    /// Argument out of range.
    InvalidArg = -1,
    /// Out of process memory.
    NoMemory = -2,
    /// Region belongs to another process.
    NotOwner = -3,
    /// No region starts at the given address.
    UnknownRegion = -4,
    /// Region was already released.
    AlreadyReleased = -5,
}

impl SyscallError {
    #[inline]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub const fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            -1 => Some(Self::InvalidArg),
            -2 => Some(Self::NoMemory),
            -3 => Some(Self::NotOwner),
            -4 => Some(Self::UnknownRegion),
            -5 => Some(Self::AlreadyReleased),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::InvalidArg => "InvalidArg",
            Self::NoMemory => "NoMemory",
            Self::NotOwner => "NotOwner",
            Self::UnknownRegion => "UnknownRegion",
            Self::AlreadyReleased => "AlreadyReleased",
        }
    }
}

pub type SyscallResult<T = i64> = Result<T, SyscallError>;

/// Split a raw return register into a value or an error.
#[inline]
pub fn check_result(value: i64) -> SyscallResult {
    if value >= 0 {
        Ok(value)
    } else {
        Err(SyscallError::from_i64(value).unwrap_or(SyscallError::InvalidArg))
    }
}

/// Convert a handler result into the raw return register.
#[inline]
pub fn to_return_value(result: SyscallResult) -> i64 {
    match result {
        Ok(v) => v,
        Err(e) => e.as_i64(),
    }
}
