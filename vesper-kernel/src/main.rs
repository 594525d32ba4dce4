//! Vesper kernel image
//!
//! Boots on a single core, builds the process table and hands the CPU to
//! the first process. Everything after that happens in trap handlers.

#![cfg_attr(vesper_bare_metal, no_std, no_main)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(vesper_bare_metal)]
mod logging;

#[cfg(vesper_bare_metal)]
mod board;
#[cfg(vesper_bare_metal)]
mod boot;
#[cfg(vesper_bare_metal)]
mod config;
#[cfg(vesper_bare_metal)]
mod demo;
#[cfg(vesper_bare_metal)]
mod trap;

#[cfg(not(vesper_bare_metal))]
fn main() {
    eprintln!("vesper-kernel only runs on bare metal; build it with --target aarch64-unknown-none-softfloat");
    std::process::exit(1);
}
