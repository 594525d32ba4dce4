//! CPU Control
//!
//! Interrupt masking, low-power waits and barriers for the single core the
//! kernel runs on.

use aarch64_cpu::registers::{CurrentEL, DAIF};
use core::arch::asm;
use tock_registers::interfaces::Readable;

/// Get the current exception level
#[must_use]
pub fn current_el() -> u8 {
    ((CurrentEL.get() >> 2) & 0x3) as u8
}

/// Park the CPU forever.
///
/// Interrupts are masked first, so nothing can pull the core out of the loop.
#[inline]
pub fn halt() -> ! {
    let _ = disable_interrupts();
    loop {
        wait_for_interrupt();
    }
}

/// Wait for interrupt (WFI instruction)
#[inline]
pub fn wait_for_interrupt() {
    // SAFETY: WFI is always safe to call
    unsafe {
        asm!("wfi", options(nomem, nostack));
    }
}

/// Instruction synchronization barrier
#[inline]
pub fn isb() {
    // SAFETY: ISB is always safe
    unsafe {
        asm!("isb", options(nostack));
    }
}

/// Mask D, A, I and F, returning the previous DAIF value.
#[must_use]
#[inline]
pub fn disable_interrupts() -> u64 {
    let daif = DAIF.get();
    // SAFETY: Setting DAIF bits only masks exceptions at EL1
    unsafe {
        asm!("msr daifset, #0xf", options(nomem, nostack));
    }
    daif
}
