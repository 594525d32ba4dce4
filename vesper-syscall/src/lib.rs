//! Vesper Syscall ABI
//!
//! Shared definitions for kernel-process communication.
//! This crate is `no_std` and has no dependencies, so both the kernel and
//! code running as a process can link it.
//!
//! # Calling convention
//!
//! - the syscall number is the 16-bit immediate of `svc #imm`
//! - x0-x5: arguments
//! - x0: return value (negative = error for calls that can fail)
//!
//! # Modules
//!
//! - [`numbers`] - Syscall numbers (stable wire values)
//! - [`error`] - Error codes
//! - [`input`] - The 8-byte input event copied out by `read_input`
//! - [`invoke`] - Process-side invocation (feature `userspace`, AArch64)

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod input;
#[cfg(all(feature = "userspace", target_arch = "aarch64"))]
pub mod invoke;
pub mod numbers;

pub use error::SyscallError;
pub use input::KeyEvent;
pub use numbers::{Syscall, pack_pair, unpack_pair};
