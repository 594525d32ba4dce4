//! Kernel configuration constants
//!
//! Board addresses and interrupt numbers live in `vesper_pal::platform`;
//! everything here is board independent. Process table and input buffer
//! capacities are fixed by `vesper_core::process`.

/// Scheduler quantum
pub const QUANTUM_MS: u64 = 10;

/// Stack given to each demo process
pub const DEFAULT_STACK_SIZE: usize = 16 * 1024;

/// Process stacks and heaps are carved from this window, placed this far
/// above the start of RAM so it clears the kernel image.
pub const PROCESS_MEMORY_OFFSET: u64 = 0x0100_0000;
pub const PROCESS_MEMORY_SIZE: usize = 16 * 1024 * 1024;

/// Stack of the idle context
pub const IDLE_STACK_SIZE: usize = 4096;

/// Framebuffer mode requested from firmware, when the board has one
pub const FRAMEBUFFER_WIDTH: u32 = 1024;
pub const FRAMEBUFFER_HEIGHT: u32 = 768;

/// Maximum log level; `verbose` adds per-syscall and per-switch tracing
#[cfg(feature = "verbose")]
pub const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Trace;
#[cfg(not(feature = "verbose"))]
pub const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Debug;
