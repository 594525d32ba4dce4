//! Syscall invocation primitives for processes
//!
//! Only available with the `userspace` feature on AArch64. The syscall
//! number is a const generic because it is encoded in the `svc` immediate.

use crate::error::{SyscallResult, check_result};
use crate::input::KeyEvent;
use crate::numbers::{Syscall, unpack_pair};

/// Raw syscall with 0 arguments.
#[inline(always)]
pub fn syscall0<const N: u16>() -> i64 {
    let ret: i64;
    // SAFETY: svc traps to the kernel, which only writes x0 of this frame.
    unsafe {
        core::arch::asm!(
            "svc #{n}",
            n = const N,
            lateout("x0") ret,
            options(nostack)
        );
    }
    ret
}

/// Raw syscall with 1 argument.
#[inline(always)]
pub fn syscall1<const N: u16>(arg0: u64) -> i64 {
    let ret: i64;
    // SAFETY: x0 is used for both input and output.
    unsafe {
        core::arch::asm!(
            "svc #{n}",
            n = const N,
            inlateout("x0") arg0 as i64 => ret,
            options(nostack)
        );
    }
    ret
}

/// Raw syscall with 2 arguments.
#[inline(always)]
pub fn syscall2<const N: u16>(arg0: u64, arg1: u64) -> i64 {
    let ret: i64;
    // SAFETY: Arguments in x0-x1, result in x0.
    unsafe {
        core::arch::asm!(
            "svc #{n}",
            n = const N,
            inlateout("x0") arg0 as i64 => ret,
            in("x1") arg1,
            options(nostack)
        );
    }
    ret
}

/// Raw syscall with 3 arguments.
#[inline(always)]
pub fn syscall3<const N: u16>(arg0: u64, arg1: u64, arg2: u64) -> i64 {
    let ret: i64;
    // SAFETY: Arguments in x0-x2, result in x0.
    unsafe {
        core::arch::asm!(
            "svc #{n}",
            n = const N,
            inlateout("x0") arg0 as i64 => ret,
            in("x1") arg1,
            in("x2") arg2,
            options(nostack)
        );
    }
    ret
}

/// Raw syscall with 5 arguments.
#[inline(always)]
pub fn syscall5<const N: u16>(arg0: u64, arg1: u64, arg2: u64, arg3: u64, arg4: u64) -> i64 {
    let ret: i64;
    // SAFETY: Arguments in x0-x4, result in x0.
    unsafe {
        core::arch::asm!(
            "svc #{n}",
            n = const N,
            inlateout("x0") arg0 as i64 => ret,
            in("x1") arg1,
            in("x2") arg2,
            in("x3") arg3,
            in("x4") arg4,
            options(nostack)
        );
    }
    ret
}

/// Raw syscall with 6 arguments.
#[inline(always)]
pub fn syscall6<const N: u16>(
    arg0: u64,
    arg1: u64,
    arg2: u64,
    arg3: u64,
    arg4: u64,
    arg5: u64,
) -> i64 {
    let ret: i64;
    // SAFETY: Arguments in x0-x5, result in x0.
    unsafe {
        core::arch::asm!(
            "svc #{n}",
            n = const N,
            inlateout("x0") arg0 as i64 => ret,
            in("x1") arg1,
            in("x2") arg2,
            in("x3") arg3,
            in("x4") arg4,
            in("x5") arg5,
            options(nostack)
        );
    }
    ret
}

// -- Typed wrappers

/// Allocate `size` bytes of heap. `None` when process memory is exhausted.
pub fn heap_alloc(size: usize) -> Option<*mut u8> {
    let base = syscall1::<{ Syscall::HeapAlloc as u16 }>(size as u64);
    (base != 0).then_some(base as usize as *mut u8)
}

/// Release a region returned by [`heap_alloc`].
pub fn heap_free(base: *mut u8) -> SyscallResult {
    check_result(syscall1::<{ Syscall::HeapFree as u16 }>(base as usize as u64))
}

/// Write bytes to the console.
pub fn print(text: &str) -> usize {
    syscall2::<{ Syscall::Print as u16 }>(text.as_ptr() as u64, text.len() as u64) as usize
}

/// Take one buffered input event, if any.
pub fn read_input() -> Option<KeyEvent> {
    let mut event = KeyEvent::EMPTY;
    let got = syscall1::<{ Syscall::ReadInput as u16 }>(&raw mut event as u64);
    (got == 1).then_some(event)
}

pub fn clear(colour: u32) {
    syscall1::<{ Syscall::Clear as u16 }>(u64::from(colour));
}

pub fn draw_pixel(x: u32, y: u32, colour: u32) {
    syscall3::<{ Syscall::DrawPixel as u16 }>(u64::from(x), u64::from(y), u64::from(colour));
}

pub fn draw_line(x0: u32, y0: u32, x1: u32, y1: u32, colour: u32) {
    syscall5::<{ Syscall::DrawLine as u16 }>(
        u64::from(x0),
        u64::from(y0),
        u64::from(x1),
        u64::from(y1),
        u64::from(colour),
    );
}

pub fn fill_rect(x: u32, y: u32, w: u32, h: u32, colour: u32) {
    syscall5::<{ Syscall::FillRect as u16 }>(
        u64::from(x),
        u64::from(y),
        u64::from(w),
        u64::from(h),
        u64::from(colour),
    );
}

pub fn draw_char(x: u32, y: u32, ch: u8, scale: u32, colour: u32) {
    syscall5::<{ Syscall::DrawChar as u16 }>(
        u64::from(x),
        u64::from(y),
        u64::from(ch),
        u64::from(scale),
        u64::from(colour),
    );
}

pub fn draw_string(x: u32, y: u32, text: &str, scale: u32, colour: u32) {
    syscall6::<{ Syscall::DrawString as u16 }>(
        u64::from(x),
        u64::from(y),
        text.as_ptr() as u64,
        text.len() as u64,
        u64::from(scale),
        u64::from(colour),
    );
}

/// Screen size in pixels, `(0, 0)` when there is no display.
pub fn screen_size() -> (u32, u32) {
    unpack_pair(syscall0::<{ Syscall::ScreenSize as u16 }>() as u64)
}

pub fn char_size(scale: u32) -> (u32, u32) {
    unpack_pair(syscall1::<{ Syscall::CharSize as u16 }>(u64::from(scale)) as u64)
}

pub fn sleep_ms(ms: u64) {
    syscall1::<{ Syscall::Sleep as u16 }>(ms);
}

pub fn yield_now() {
    syscall0::<{ Syscall::Yield as u16 }>();
}

pub fn uptime_ms() -> u64 {
    syscall0::<{ Syscall::UptimeMs as u16 }>() as u64
}

/// Terminate the calling process.
pub fn stop() -> ! {
    syscall0::<{ Syscall::Stop as u16 }>();
    // The kernel never resumes a stopped process.
    loop {
        core::hint::spin_loop();
    }
}
