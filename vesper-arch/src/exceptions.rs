//! Exception entry and exit for AArch64
//!
//! Every synchronous exception, IRQ, FIQ and SError taken to EL1 lands in
//! [`exception_vectors`], which spills the interrupted register file into an
//! [`ExceptionContext`] on the kernel stack and calls the installed handler.
//! Whatever the handler leaves in the context is what `eret` resumes, so a
//! context switch is nothing more than overwriting the frame.
//!
//! Two vector groups are live:
//! - current EL with SP_EL0, taken by kernel processes running EL1t
//! - lower EL (AArch64), taken by user processes running EL0t
//!
//! The kernel itself runs EL1h and never traps into its own vectors while a
//! handler is active, because handlers run with every DAIF bit set.

use core::sync::atomic::{AtomicPtr, Ordering};

use crate::registers::{esr, spsr};

/// Number of 64-bit words in a saved frame.
pub const FRAME_WORDS: usize = 36;

/// Exception context saved on the kernel stack.
///
/// Field order is fixed by the vector stubs: `x0..x30` at offsets `0..248`,
/// then SP_EL0, ELR_EL1, SPSR_EL1, ESR_EL1, FAR_EL1.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionContext {
    /// General purpose registers x0-x30
    pub gpr: [u64; 31],
    /// SP_EL0 of the interrupted process (both EL0t and EL1t run on it)
    pub sp: u64,
    /// Exception Link Register (return address)
    pub elr: u64,
    /// Saved Program Status Register
    pub spsr: u64,
    /// Exception Syndrome Register
    pub esr: u64,
    /// Fault Address Register
    pub far: u64,
}

const _: () = assert!(core::mem::size_of::<ExceptionContext>() == FRAME_WORDS * 8);

impl ExceptionContext {
    /// Get the exception class from ESR
    #[must_use]
    pub fn exception_class(&self) -> u8 {
        esr::exception_class(self.esr)
    }

    /// Check if exception came from EL0
    #[must_use]
    pub fn from_el0(&self) -> bool {
        spsr::exception_level(self.spsr) == 0
    }

    /// Immediate of the `svc` that raised this exception, if it was one.
    #[must_use]
    pub fn svc_immediate(&self) -> Option<u16> {
        esr::svc_immediate(self.esr)
    }
}

/// Exception handler function type
pub type ExceptionHandler = fn(&mut ExceptionContext);

static SYNC_HANDLER: AtomicPtr<()> = AtomicPtr::new(default_sync_handler as *mut ());
static IRQ_HANDLER: AtomicPtr<()> = AtomicPtr::new(default_irq_handler as *mut ());
static FIQ_HANDLER: AtomicPtr<()> = AtomicPtr::new(default_fiq_handler as *mut ());
static SERROR_HANDLER: AtomicPtr<()> = AtomicPtr::new(default_serror_handler as *mut ());

/// Set the synchronous exception handler
pub fn set_sync_handler(handler: ExceptionHandler) {
    SYNC_HANDLER.store(handler as *mut (), Ordering::Release);
}

/// Set the IRQ handler
pub fn set_irq_handler(handler: ExceptionHandler) {
    IRQ_HANDLER.store(handler as *mut (), Ordering::Release);
}

/// Set the FIQ handler
pub fn set_fiq_handler(handler: ExceptionHandler) {
    FIQ_HANDLER.store(handler as *mut (), Ordering::Release);
}

/// Set the SError handler
pub fn set_serror_handler(handler: ExceptionHandler) {
    SERROR_HANDLER.store(handler as *mut (), Ordering::Release);
}

/// Load an exception handler atomically
///
/// # Safety
/// The pointer must have been stored by one of the set_*_handler functions
/// or be one of the defaults above.
#[inline]
#[cfg_attr(not(target_arch = "aarch64"), allow(dead_code))]
unsafe fn load_handler(handler: &AtomicPtr<()>) -> ExceptionHandler {
    let ptr = handler.load(Ordering::Acquire);
    // SAFETY: Only `ExceptionHandler` values are ever stored in these slots
    unsafe { core::mem::transmute::<*mut (), ExceptionHandler>(ptr) }
}

fn default_sync_handler(ctx: &mut ExceptionContext) {
    panic!(
        "Unhandled synchronous exception: {} at ELR={:#x}, ESR={:#x}, FAR={:#x}",
        esr::ec_name(ctx.exception_class()),
        ctx.elr,
        ctx.esr,
        ctx.far
    );
}

fn default_irq_handler(_ctx: &mut ExceptionContext) {
    panic!("IRQ taken before a handler was installed");
}

fn default_fiq_handler(_ctx: &mut ExceptionContext) {
    panic!("Unhandled FIQ");
}

fn default_serror_handler(ctx: &mut ExceptionContext) {
    panic!("System Error at ELR={:#x}, ESR={:#x}", ctx.elr, ctx.esr);
}

/// Exception handler wrappers that call the registered handlers
#[cfg(target_arch = "aarch64")]
#[unsafe(no_mangle)]
extern "C" fn handle_sync(ctx: &mut ExceptionContext) {
    // SAFETY: Slot only ever holds an ExceptionHandler
    let handler = unsafe { load_handler(&SYNC_HANDLER) };
    handler(ctx);
}

#[cfg(target_arch = "aarch64")]
#[unsafe(no_mangle)]
extern "C" fn handle_irq(ctx: &mut ExceptionContext) {
    // SAFETY: Slot only ever holds an ExceptionHandler
    let handler = unsafe { load_handler(&IRQ_HANDLER) };
    handler(ctx);
}

#[cfg(target_arch = "aarch64")]
#[unsafe(no_mangle)]
extern "C" fn handle_fiq(ctx: &mut ExceptionContext) {
    // SAFETY: Slot only ever holds an ExceptionHandler
    let handler = unsafe { load_handler(&FIQ_HANDLER) };
    handler(ctx);
}

#[cfg(target_arch = "aarch64")]
#[unsafe(no_mangle)]
extern "C" fn handle_serror(ctx: &mut ExceptionContext) {
    // SAFETY: Slot only ever holds an ExceptionHandler
    let handler = unsafe { load_handler(&SERROR_HANDLER) };
    handler(ctx);
}

/// Vector stub: spill the frame, then branch to the continuation.
///
/// Each vector slot is 128 bytes, so the stub stops at 26 instructions and
/// the call/restore sequence lives in the continuation.
#[cfg(target_arch = "aarch64")]
macro_rules! exception_stub {
    ($continuation:ident) => {
        concat!(
            "sub sp, sp, #(36 * 8)\n",
            "stp x0, x1, [sp, #(0 * 16)]\n",
            "stp x2, x3, [sp, #(1 * 16)]\n",
            "stp x4, x5, [sp, #(2 * 16)]\n",
            "stp x6, x7, [sp, #(3 * 16)]\n",
            "stp x8, x9, [sp, #(4 * 16)]\n",
            "stp x10, x11, [sp, #(5 * 16)]\n",
            "stp x12, x13, [sp, #(6 * 16)]\n",
            "stp x14, x15, [sp, #(7 * 16)]\n",
            "stp x16, x17, [sp, #(8 * 16)]\n",
            "stp x18, x19, [sp, #(9 * 16)]\n",
            "stp x20, x21, [sp, #(10 * 16)]\n",
            "stp x22, x23, [sp, #(11 * 16)]\n",
            "stp x24, x25, [sp, #(12 * 16)]\n",
            "stp x26, x27, [sp, #(13 * 16)]\n",
            "stp x28, x29, [sp, #(14 * 16)]\n",
            "str x30, [sp, #(15 * 16)]\n",
            "mrs x0, sp_el0\n",
            "mrs x1, elr_el1\n",
            "mrs x2, spsr_el1\n",
            "mrs x3, esr_el1\n",
            "mrs x4, far_el1\n",
            "stp x0, x1, [sp, #(31 * 8)]\n",
            "stp x2, x3, [sp, #(33 * 8)]\n",
            "str x4, [sp, #(35 * 8)]\n",
            "b ", stringify!($continuation), "\n",
        )
    };
}

/// Load SP_EL0/ELR/SPSR and x0-x30 from the frame at `$base`.
///
/// `$base` is either `sp` or `x0`; x0 is reloaded last so it may hold the
/// frame address. The caller issues the `eret`.
#[cfg(target_arch = "aarch64")]
macro_rules! restore_and_eret {
    ($base:literal) => {
        concat!(
            "ldp x1, x2, [", $base, ", #(31 * 8)]\n",
            "ldr x3, [", $base, ", #(33 * 8)]\n",
            "msr sp_el0, x1\n",
            "msr elr_el1, x2\n",
            "msr spsr_el1, x3\n",
            "ldp x2, x3, [", $base, ", #(1 * 16)]\n",
            "ldp x4, x5, [", $base, ", #(2 * 16)]\n",
            "ldp x6, x7, [", $base, ", #(3 * 16)]\n",
            "ldp x8, x9, [", $base, ", #(4 * 16)]\n",
            "ldp x10, x11, [", $base, ", #(5 * 16)]\n",
            "ldp x12, x13, [", $base, ", #(6 * 16)]\n",
            "ldp x14, x15, [", $base, ", #(7 * 16)]\n",
            "ldp x16, x17, [", $base, ", #(8 * 16)]\n",
            "ldp x18, x19, [", $base, ", #(9 * 16)]\n",
            "ldp x20, x21, [", $base, ", #(10 * 16)]\n",
            "ldp x22, x23, [", $base, ", #(11 * 16)]\n",
            "ldp x24, x25, [", $base, ", #(12 * 16)]\n",
            "ldp x26, x27, [", $base, ", #(13 * 16)]\n",
            "ldp x28, x29, [", $base, ", #(14 * 16)]\n",
            "ldr x30, [", $base, ", #(15 * 16)]\n",
            "ldp x0, x1, [", $base, ", #(0 * 16)]\n",
        )
    };
}

/// Continuation: call the Rust handler on the frame, restore it, `eret`.
#[cfg(target_arch = "aarch64")]
macro_rules! exception_continuation {
    ($handler:ident) => {
        concat!(
            "mov x0, sp\n",
            "bl ", stringify!($handler), "\n",
            restore_and_eret!("sp"),
            "add sp, sp, #(36 * 8)\n",
            "eret\n"
        )
    };
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
#[unsafe(no_mangle)]
unsafe extern "C" fn __exc_sync_cont() {
    core::arch::naked_asm!(exception_continuation!(handle_sync));
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
#[unsafe(no_mangle)]
unsafe extern "C" fn __exc_irq_cont() {
    core::arch::naked_asm!(exception_continuation!(handle_irq));
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
#[unsafe(no_mangle)]
unsafe extern "C" fn __exc_fiq_cont() {
    core::arch::naked_asm!(exception_continuation!(handle_fiq));
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
#[unsafe(no_mangle)]
unsafe extern "C" fn __exc_serror_cont() {
    core::arch::naked_asm!(exception_continuation!(handle_serror));
}

/// The exception vector table
///
/// 16 entries of 128 bytes, 2KB aligned:
/// - Current EL with SP_EL0: entries 0-3 (kernel processes, EL1t)
/// - Current EL with SP_ELx: entries 4-7 (the kernel itself, EL1h)
/// - Lower EL (AArch64): entries 8-11 (user processes, EL0t)
/// - Lower EL (AArch32): entries 12-15 (unsupported)
#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
#[unsafe(no_mangle)]
#[unsafe(link_section = ".vectors")]
unsafe extern "C" fn exception_vectors() {
    core::arch::naked_asm!(
        ".balign 2048",

        // Current EL with SP_EL0
        ".balign 128",
        exception_stub!(__exc_sync_cont),
        ".balign 128",
        exception_stub!(__exc_irq_cont),
        ".balign 128",
        exception_stub!(__exc_fiq_cont),
        ".balign 128",
        exception_stub!(__exc_serror_cont),

        // Current EL with SP_ELx
        ".balign 128",
        exception_stub!(__exc_sync_cont),
        ".balign 128",
        exception_stub!(__exc_irq_cont),
        ".balign 128",
        exception_stub!(__exc_fiq_cont),
        ".balign 128",
        exception_stub!(__exc_serror_cont),

        // Lower EL using AArch64
        ".balign 128",
        exception_stub!(__exc_sync_cont),
        ".balign 128",
        exception_stub!(__exc_irq_cont),
        ".balign 128",
        exception_stub!(__exc_fiq_cont),
        ".balign 128",
        exception_stub!(__exc_serror_cont),

        // Lower EL using AArch32
        ".balign 128",
        "b .",
        ".balign 128",
        "b .",
        ".balign 128",
        "b .",
        ".balign 128",
        "b .",
    );
}

/// Install the exception vector table.
#[cfg(target_arch = "aarch64")]
pub fn init() {
    let vectors = exception_vectors as *const () as u64;
    crate::registers::write_vbar_el1(vectors);
    crate::cpu::isb();
}

/// Get the current exception vector table address
#[cfg(target_arch = "aarch64")]
#[must_use]
pub fn vector_table_address() -> u64 {
    crate::registers::read_vbar_el1()
}

/// Leave the kernel's boot flow and `eret` into `ctx` for the first time.
///
/// The kernel stack is reset to `kernel_stack_top` first, so every later
/// trap builds its frame at the same depth.
///
/// # Safety
///
/// - `ctx` must describe a runnable EL0t or EL1t context (valid ELR, a
///   16-byte aligned SP_EL0, SPSR with M[0] clear)
/// - `kernel_stack_top` must be the top of the EL1 stack, unused by anything
///   that is still live
/// - The vector table must already be installed
#[cfg(target_arch = "aarch64")]
pub unsafe fn resume(ctx: &ExceptionContext, kernel_stack_top: u64) -> ! {
    // SAFETY: The caller guarantees the frame is runnable and the stack top
    // is free. The frame is read before anything is pushed below the new SP.
    unsafe {
        core::arch::asm!(
            "mov sp, {top}",
            restore_and_eret!("x0"),
            "eret",
            top = in(reg) kernel_stack_top,
            in("x0") ctx as *const ExceptionContext,
            options(noreturn)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout_matches_stubs() {
        assert_eq!(core::mem::size_of::<ExceptionContext>(), 288);
        assert_eq!(core::mem::offset_of!(ExceptionContext, sp), 31 * 8);
        assert_eq!(core::mem::offset_of!(ExceptionContext, elr), 32 * 8);
        assert_eq!(core::mem::offset_of!(ExceptionContext, spsr), 33 * 8);
        assert_eq!(core::mem::offset_of!(ExceptionContext, esr), 34 * 8);
        assert_eq!(core::mem::offset_of!(ExceptionContext, far), 35 * 8);
    }

    #[test]
    fn test_svc_immediate_from_frame() {
        let ctx = ExceptionContext {
            esr: (0b010101u64 << 26) | (1 << 25) | 33,
            ..Default::default()
        };
        assert_eq!(ctx.svc_immediate(), Some(33));

        let abort = ExceptionContext {
            esr: 0b100100u64 << 26,
            ..Default::default()
        };
        assert_eq!(abort.svc_immediate(), None);
    }

    #[test]
    fn test_from_el0() {
        let user = ExceptionContext { spsr: spsr::EL0T, ..Default::default() };
        let kernel = ExceptionContext { spsr: spsr::EL1T, ..Default::default() };
        assert!(user.from_el0());
        assert!(!kernel.from_el0());
    }
}
