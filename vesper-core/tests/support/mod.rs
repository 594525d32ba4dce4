//! Fake hardware for driving the executive from host tests.

#![allow(dead_code)]

use std::collections::VecDeque;

use vesper_arch::ExceptionContext;
use vesper_arch::registers::esr::ec;
use embedded_graphics::mock_display::MockDisplay;
use embedded_graphics::pixelcolor::Rgb888;
use vesper_core::display::{Canvas, Headless};
use vesper_core::irq::IrqLines;
use vesper_core::machine::{
    BadAddress, Console, Display, InputSource, InterruptController, Machine, PanicTarget,
    SystemTimer, UserMemory,
};
use vesper_core::{Executive, ExecutiveConfig, FatalReport, ProcessId, ProcessMode, SavedContext};
use vesper_syscall::{KeyEvent, Syscall};

pub const MEMORY_BASE: usize = 0x4800_0000;
pub const MEMORY_SIZE: usize = 256 * 4096;
pub const STACK_SIZE: usize = 8192;

pub const IDLE_ENTRY: u64 = 0x4000_0000;
pub const EXIT_TRAMPOLINE: u64 = 0x4000_0200;

pub const TICK: u32 = 30;
pub const SLEEP: u32 = 27;
pub const INPUT: u32 = 33;
pub const STORAGE: u32 = 48;
pub const NET0: u32 = 49;
pub const NET1: u32 = 50;
pub const USB: u32 = 35;

pub const LINES: IrqLines = IrqLines {
    scheduler_tick: TICK,
    sleep_timer: SLEEP,
    input: INPUT,
    storage: STORAGE,
    network: [NET0, NET1],
    usb: USB,
};

/// Records every acknowledge; hands out queued INTIDs.
#[derive(Default)]
pub struct FakeGic {
    pub queued: VecDeque<u32>,
    pub acked: Vec<u32>,
}

impl InterruptController for FakeGic {
    fn pending(&mut self) -> Option<u32> {
        self.queued.pop_front()
    }

    fn acknowledge(&mut self, intid: u32) {
        self.acked.push(intid);
    }
}

/// Manually advanced millisecond clock.
#[derive(Default)]
pub struct ManualClock {
    pub now: u64,
    pub tick_rearms: usize,
    pub sleep_deadline: Option<u64>,
}

impl SystemTimer for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn rearm_tick(&mut self) {
        self.tick_rearms += 1;
    }

    fn arm_sleep(&mut self, deadline_ms: u64) {
        self.sleep_deadline = Some(deadline_ms);
    }

    fn disarm_sleep(&mut self) {
        self.sleep_deadline = None;
    }
}

#[derive(Default)]
pub struct VecConsole {
    pub output: Vec<u8>,
}

impl Console for VecConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
    }
}

#[derive(Default)]
pub struct QueuedInput {
    pub events: VecDeque<KeyEvent>,
}

impl InputSource for QueuedInput {
    fn poll(&mut self) -> Option<KeyEvent> {
        self.events.pop_front()
    }
}

/// Byte array standing in for the process memory window.
pub struct ByteMemory {
    pub base: u64,
    pub bytes: Vec<u8>,
}

impl ByteMemory {
    fn range(&self, addr: u64, len: usize) -> Result<std::ops::Range<usize>, BadAddress> {
        let bad = BadAddress { addr, len };
        let start = addr.checked_sub(self.base).ok_or(bad)? as usize;
        let end = start.checked_add(len).ok_or(bad)?;
        if end > self.bytes.len() {
            return Err(bad);
        }
        Ok(start..end)
    }

    pub fn poke(&mut self, addr: usize, data: &[u8]) {
        let range = self.range(addr as u64, data.len()).unwrap();
        self.bytes[range].copy_from_slice(data);
    }

    pub fn peek(&self, addr: usize, len: usize) -> &[u8] {
        let range = self.range(addr as u64, len).unwrap();
        &self.bytes[range]
    }
}

impl UserMemory for ByteMemory {
    fn check(&self, addr: u64, len: usize) -> Result<(), BadAddress> {
        self.range(addr, len).map(|_| ())
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), BadAddress> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), BadAddress> {
        let range = self.range(addr, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }
}

#[derive(Default)]
pub struct CapturePanic {
    pub rendered: Vec<(String, u32)>,
}

impl PanicTarget for CapturePanic {
    fn render_fatal(&mut self, message: &str, code: u32) {
        self.rendered.push((message.to_string(), code));
    }
}

/// No screen by default; a 64x64 mock when a test wants to see pixels.
pub enum Screen {
    Headless(Headless),
    Mock(Canvas<MockDisplay<Rgb888>>),
}

impl Screen {
    pub fn mock() -> Self {
        let mut display = MockDisplay::new();
        display.set_allow_overdraw(true);
        display.set_allow_out_of_bounds_drawing(true);
        Self::Mock(Canvas::new(display))
    }

    pub fn pixels(&self) -> &MockDisplay<Rgb888> {
        match self {
            Self::Mock(canvas) => canvas.target(),
            Self::Headless(_) => panic!("headless screen has no pixels"),
        }
    }

    fn display(&mut self) -> &mut dyn Display {
        match self {
            Self::Headless(headless) => headless,
            Self::Mock(canvas) => canvas,
        }
    }
}

pub struct Hardware {
    pub gic: FakeGic,
    pub clock: ManualClock,
    pub console: VecConsole,
    pub input: QueuedInput,
    pub display: Screen,
    pub memory: ByteMemory,
}

impl Hardware {
    pub fn machine(&mut self) -> Machine<'_> {
        Machine {
            interrupts: &mut self.gic,
            timer: &mut self.clock,
            console: &mut self.console,
            input: &mut self.input,
            display: self.display.display(),
            memory: &mut self.memory,
        }
    }
}

/// An executive, its fake devices, and the one trap frame the CPU owns.
pub struct Rig {
    pub exec: Executive,
    pub hw: Hardware,
    pub frame: ExceptionContext,
}

impl Rig {
    pub fn new() -> Self {
        let mut exec = Executive::new();
        exec.configure(ExecutiveConfig {
            memory_base: MEMORY_BASE,
            memory_size: MEMORY_SIZE,
            lines: LINES,
            idle: SavedContext::start(IDLE_ENTRY, 0x4010_0000, 0b0100, 0),
            exit_trampoline: EXIT_TRAMPOLINE,
        })
        .unwrap();

        Self {
            exec,
            hw: Hardware {
                gic: FakeGic::default(),
                clock: ManualClock::default(),
                console: VecConsole::default(),
                input: QueuedInput::default(),
                display: Screen::Headless(Headless),
                memory: ByteMemory {
                    base: MEMORY_BASE as u64,
                    bytes: vec![0; MEMORY_SIZE],
                },
            },
            frame: ExceptionContext::default(),
        }
    }

    /// Create a kernel-mode process whose program counter identifies it.
    pub fn spawn(&mut self, entry: u64) -> ProcessId {
        self.exec
            .create_process(entry, STACK_SIZE, ProcessMode::Kernel, "test")
            .unwrap()
    }

    pub fn start(&mut self) {
        let ctx = *self.exec.start(&mut self.hw.clock);
        self.frame = ExceptionContext::from(&ctx);
    }

    /// Raise `intid` and take the IRQ trap.
    pub fn irq(&mut self, intid: u32) {
        self.hw.gic.queued.push_back(intid);
        self.exec.handle_irq(&mut self.frame, &mut self.hw.machine());
    }

    /// The running code executes `svc #number` with `args` in x0-x5.
    pub fn svc(&mut self, number: u16, args: &[u64]) -> Result<(), FatalReport> {
        self.frame.gpr[..args.len()].copy_from_slice(args);
        self.frame.esr = (u64::from(ec::SVC_AARCH64) << 26) | (1 << 25) | u64::from(number);
        // ELR of an SVC is the instruction after it
        self.frame.elr += 4;
        self.exec.handle_sync(&mut self.frame, &mut self.hw.machine())
    }

    pub fn call(&mut self, syscall: Syscall, args: &[u64]) -> Result<(), FatalReport> {
        self.svc(syscall.number(), args)
    }

    /// Which process entry the CPU is executing, identified by the high bits
    /// of the program counter.
    pub fn running_entry(&self) -> u64 {
        self.frame.elr & !0xFFF
    }

    pub fn x0(&self) -> u64 {
        self.frame.gpr[0]
    }
}
