//! Hardware seams of the process core
//!
//! The executive reaches the interrupt controller, the timers, the console,
//! the display and process memory only through these traits. The kernel
//! implements them over real devices; tests implement them with fakes.

use core::fmt;

use vesper_syscall::KeyEvent;

pub trait InterruptController {
    /// Acknowledge the highest-priority pending interrupt and return its
    /// identifier, or `None` if nothing is pending.
    fn pending(&mut self) -> Option<u32>;
    /// Signal end of interrupt for `intid`.
    fn acknowledge(&mut self, intid: u32);
}

pub trait SystemTimer {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;
    /// Program the scheduler comparator one quantum ahead.
    fn rearm_tick(&mut self);
    /// Program the sleep comparator for an absolute deadline.
    fn arm_sleep(&mut self, deadline_ms: u64);
    fn disarm_sleep(&mut self);
}

pub trait Console {
    fn write_bytes(&mut self, bytes: &[u8]);
}

/// Source of decoded input events, polled on the input interrupt.
pub trait InputSource {
    fn poll(&mut self) -> Option<KeyEvent>;
}

/// Drawing primitives forwarded from the syscall surface.
///
/// Colours are `0x00RRGGBB`. Coordinates outside the screen are clipped.
pub trait Display {
    /// Screen size in pixels, `(0, 0)` when there is no screen.
    fn size(&self) -> (u32, u32);
    fn char_size(&self, scale: u32) -> (u32, u32);
    fn clear(&mut self, colour: u32);
    fn draw_pixel(&mut self, x: i32, y: i32, colour: u32);
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, colour: u32);
    fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, colour: u32);
    fn draw_char(&mut self, x: i32, y: i32, ch: u8, scale: u32, colour: u32);
    /// Draw bytes as text; invalid UTF-8 is drawn lossily.
    fn draw_text(&mut self, x: i32, y: i32, text: &[u8], scale: u32, colour: u32);
}

/// An address range a process handed in that the kernel may not touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BadAddress {
    pub addr: u64,
    pub len: usize,
}

impl fmt::Display for BadAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad user range {:#x}+{}", self.addr, self.len)
    }
}

/// Process memory as seen from the kernel. Mapping is identity, so
/// `addr` is a physical address.
pub trait UserMemory {
    /// Fail unless the whole of `[addr, addr + len)` is accessible.
    fn check(&self, addr: u64, len: usize) -> Result<(), BadAddress>;
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), BadAddress>;
    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), BadAddress>;
}

/// Where the fatal diagnostic is shown. Must not allocate.
pub trait PanicTarget {
    fn render_fatal(&mut self, message: &str, code: u32);
}

/// Every device the executive drives during one trap.
pub struct Machine<'a> {
    pub interrupts: &'a mut dyn InterruptController,
    pub timer: &'a mut dyn SystemTimer,
    pub console: &'a mut dyn Console,
    pub input: &'a mut dyn InputSource,
    pub display: &'a mut dyn Display,
    pub memory: &'a mut dyn UserMemory,
}
