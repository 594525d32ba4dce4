//! Hardware adapters
//!
//! Implements the `vesper_core::machine` traits on top of the PAL drivers,
//! and bundles them into the [`Machine`] each trap hands to the executive.

use core::fmt::Write;

use spin::Once;
use vesper_core::display::{CHAR_HEIGHT, Canvas, Headless};
use vesper_core::machine::{
    BadAddress, Console, Display, InputSource, InterruptController, Machine, PanicTarget,
    SystemTimer, UserMemory,
};
use vesper_core::text::MessageBuffer;
use vesper_pal::{FramebufferConfig, FramebufferDisplay, console, gic, timer};
use vesper_syscall::KeyEvent;

/// Framebuffer handed out by firmware at boot, if any. Kept outside the
/// trap cell so the panic handler can still reach the screen.
static FRAMEBUFFER: Once<FramebufferConfig> = Once::new();

/// GICv2 CPU interface
pub struct Gic;

impl InterruptController for Gic {
    fn pending(&mut self) -> Option<u32> {
        gic::acknowledge_interrupt()
    }

    fn acknowledge(&mut self, intid: u32) {
        gic::end_interrupt(intid);
    }
}

/// Generic timer: CNTP for the quantum, CNTV for sleep deadlines
pub struct GenericTimer;

impl SystemTimer for GenericTimer {
    fn now_ms(&self) -> u64 {
        timer::now_ms()
    }

    fn rearm_tick(&mut self) {
        timer::rearm_tick();
    }

    fn arm_sleep(&mut self, deadline_ms: u64) {
        timer::arm_sleep(deadline_ms);
    }

    fn disarm_sleep(&mut self) {
        timer::disarm_sleep();
    }
}

/// The PL011: print output and keyboard input
pub struct Uart;

impl Console for Uart {
    fn write_bytes(&mut self, bytes: &[u8]) {
        console::write_bytes(bytes);
    }
}

impl InputSource for Uart {
    fn poll(&mut self) -> Option<KeyEvent> {
        while let Some(byte) = console::read_byte() {
            if let Some(event) = KeyEvent::from_ascii(byte) {
                return Some(event);
            }
        }
        console::clear_rx_interrupt();
        None
    }
}

/// Identity-mapped RAM. Process pointers are checked against it before
/// the kernel touches them.
pub struct RamWindow {
    base: u64,
    end: u64,
}

impl RamWindow {
    pub const fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            end: base + size,
        }
    }
}

impl UserMemory for RamWindow {
    fn check(&self, addr: u64, len: usize) -> Result<(), BadAddress> {
        let bad = BadAddress { addr, len };
        let end = addr.checked_add(len as u64).ok_or(bad)?;
        if addr < self.base || end > self.end {
            return Err(bad);
        }
        Ok(())
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), BadAddress> {
        self.check(addr, buf.len())?;
        // SAFETY: The range lies inside RAM, which is identity mapped and
        // readable. Process memory never aliases `buf`, a kernel stack slot.
        unsafe {
            core::ptr::copy_nonoverlapping(addr as *const u8, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), BadAddress> {
        self.check(addr, bytes.len())?;
        // SAFETY: As for `read`; the destination is process memory.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        }
        Ok(())
    }
}

/// The framebuffer canvas, or a headless stand-in.
pub struct Screen {
    canvas: Option<Canvas<FramebufferDisplay>>,
    headless: Headless,
}

impl Screen {
    pub const fn headless() -> Self {
        Self {
            canvas: None,
            headless: Headless,
        }
    }

    /// Take over the firmware framebuffer.
    ///
    /// # Safety
    ///
    /// `config` must describe memory the firmware reserved for scanout and
    /// that nothing else writes.
    pub unsafe fn attach(&mut self, config: FramebufferConfig) {
        let config = *FRAMEBUFFER.call_once(|| config);
        // SAFETY: The caller's guarantee.
        self.canvas = Some(Canvas::new(unsafe { FramebufferDisplay::new(config) }));
    }

    pub fn display(&mut self) -> &mut dyn Display {
        match &mut self.canvas {
            Some(canvas) => canvas as &mut dyn Display,
            None => &mut self.headless,
        }
    }
}

/// Every device the executive reaches through `Machine`.
pub struct Board {
    pub gic: Gic,
    pub timer: GenericTimer,
    pub console: Uart,
    pub keyboard: Uart,
    pub ram: RamWindow,
    pub screen: Screen,
}

impl Board {
    pub const fn new() -> Self {
        Self {
            gic: Gic,
            timer: GenericTimer,
            console: Uart,
            keyboard: Uart,
            ram: RamWindow::new(0, 0),
            screen: Screen::headless(),
        }
    }

    pub fn machine(&mut self) -> Machine<'_> {
        Machine {
            interrupts: &mut self.gic,
            timer: &mut self.timer,
            console: &mut self.console,
            input: &mut self.keyboard,
            display: self.screen.display(),
            memory: &mut self.ram,
        }
    }
}

/// Fatal diagnostics: the console first, then a banner on the screen.
///
/// Usable from the panic handler, so it holds no borrowed kernel state.
pub struct PanicScreen;

const BANNER_BACKGROUND: u32 = 0x00AA_0000;
const BANNER_FOREGROUND: u32 = 0x00FF_FFFF;
const BANNER_SCALE: u32 = 2;

impl PanicTarget for PanicScreen {
    fn render_fatal(&mut self, message: &str, code: u32) {
        let mut header = MessageBuffer::<32>::new();
        let _ = write!(header, "FATAL [{}]: ", code);

        console::emergency_puts("\n\x1b[31m*** ");
        console::emergency_puts(header.as_str());
        console::emergency_puts(message);
        console::emergency_puts("\x1b[0m\n");

        let Some(config) = FRAMEBUFFER.get() else {
            return;
        };
        // SAFETY: The config was validated when attached; the kernel is
        // halting, so any canvas the trap cell holds is never used again.
        let mut canvas = Canvas::new(unsafe { FramebufferDisplay::new(*config) });
        let band = CHAR_HEIGHT * BANNER_SCALE * 3;
        canvas.fill_rect(0, 0, config.width, band, BANNER_BACKGROUND);
        let line = (CHAR_HEIGHT * BANNER_SCALE) as i32;
        canvas.draw_text(8, line / 2, header.as_bytes(), BANNER_SCALE, BANNER_FOREGROUND);
        canvas.draw_text(8, line * 3 / 2, message.as_bytes(), BANNER_SCALE, BANNER_FOREGROUND);
    }
}
