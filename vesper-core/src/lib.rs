//! # vesper-core
//!
//! The process execution model of the Vesper kernel: process table,
//! process memory, round-robin scheduler, interrupt router and syscall
//! gateway, tied together by the [`Executive`].
//!
//! Nothing in this crate touches hardware directly. Trap state arrives
//! through [`TrapFrame`], devices through the traits in [`machine`], so the
//! whole core builds and is tested on the host.
//!
//! # Modules
//!
//! - [`process`] - PCBs, the process table, input rings
//! - [`memory`] - Page-granular region allocator for stacks and heaps
//! - [`sched`] - Round-robin selection
//! - [`sleep`] - Sleep deadline queue
//! - [`irq`] - Interrupt line table and device callbacks
//! - [`syscall`] - Syscall gateway
//! - [`fatal`] - Fatal diagnostics and the halt latch
//! - [`display`] - Drawing surfaces for the display syscalls

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod display;
pub mod error;
pub mod executive;
pub mod fatal;
pub mod irq;
pub mod machine;
pub mod memory;
pub mod process;
pub mod sched;
pub mod sleep;
pub mod syscall;
pub mod text;
pub mod trap;

pub use error::{MemoryError, ProcessError};
pub use executive::{Executive, ExecutiveConfig};
pub use fatal::{FatalKind, FatalReport, HaltLatch};
pub use machine::Machine;
pub use process::{ProcessId, ProcessMode, ProcessState};
pub use trap::{SavedContext, TrapFrame};
