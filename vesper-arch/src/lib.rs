//! # vesper-arch
//!
//! AArch64 architecture support for the Vesper kernel.
//!
//! - [`exceptions`]: the vector table, the saved trap frame and handler hooks
//! - [`registers`]: syndrome/status decoding and system register access
//! - [`cpu`]: interrupt masking, `wfi`, barriers (AArch64 only)
//! - [`sync`]: the trap-context cell that replaces locks on a single core
//!
//! Everything that touches a system register or emits AArch64 assembly is
//! gated on `target_arch = "aarch64"`. The frame layout and the decoding
//! helpers build on any host so the process core can be tested there.
//!
//! # Safety
//!
//! The vector table and the resume path are `unsafe` boundaries. Each unsafe
//! block carries a `// SAFETY:` comment stating what the caller guarantees.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(target_arch = "aarch64")]
pub mod cpu;
pub mod exceptions;
pub mod registers;
pub mod sync;

#[cfg(target_arch = "aarch64")]
pub use cpu::{halt, wait_for_interrupt};
pub use exceptions::ExceptionContext;
pub use sync::{TrapCell, TrapToken};
