//! Platform Abstraction Layer
//!
//! Hardware access for the boards Vesper boots on:
//! - QEMU virt machine (`qemu-virt` feature, the default)
//! - Raspberry Pi 4 (`rpi4` feature)
//!
//! The board is fixed at build time; [`current_platform`] returns its
//! description. Drivers that only make sense on the target (GIC, generic
//! timers, mailbox) are gated on `target_arch = "aarch64"`.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(all(feature = "qemu-virt", feature = "rpi4"))]
compile_error!("select exactly one platform feature: `qemu-virt` or `rpi4`");

pub mod console;
pub mod framebuffer;
#[cfg(target_arch = "aarch64")]
pub mod gic;
#[cfg(all(target_arch = "aarch64", feature = "rpi4"))]
pub mod mailbox;
pub mod platform;
pub mod timer;

pub use framebuffer::{FramebufferConfig, FramebufferDisplay};
pub use platform::{InterruptLines, Platform, current_platform};
