//! Kernel Initialization
//!
//! This module contains the kernel entry point and initialization sequence.
//!
//! # Boot Flow
//!
//! 1. `_start`: park secondary cores, drop EL2 to EL1 if needed, set the
//!    kernel stack, zero `.bss`
//! 2. `kernel_main`: console, logger, vectors, timer, GIC
//! 3. Configure the executive, create the boot processes
//! 4. `eret` into the first process (or the idle loop)

use core::fmt;
use core::panic::PanicInfo;

use log::info;
use vesper_arch::registers::spsr;
use vesper_arch::{ExceptionContext, TrapToken, cpu, exceptions};
use vesper_core::irq::IrqLines;
use vesper_core::{ExecutiveConfig, FatalKind, MemoryError, ProcessError, SavedContext};
use vesper_pal::{Platform, console, current_platform, gic, timer};

use crate::board::{Board, PanicScreen, RamWindow};
use crate::trap::{self, FATAL, Kernel};
use crate::{config, demo};

unsafe extern "C" {
    safe static __stack_top: u8;
    safe static __kernel_end: u8;
}

core::arch::global_asm!(
    ".section .text.boot, \"ax\"",
    ".global _start",
    "_start:",
    // Only core 0 boots
    "    mrs x0, mpidr_el1",
    "    and x0, x0, #0xff",
    "    cbnz x0, 9f",

    "    mrs x0, CurrentEL",
    "    lsr x0, x0, #2",
    "    cmp x0, #2",
    "    b.ne 1f",

    // -- EL2: configure for EL1, then drop --
    // HCR_EL2: RW=1 (EL1 is AArch64)
    "    mov x0, #(1 << 31)",
    "    msr hcr_el2, x0",
    // CNTHCTL_EL2: EL1PCEN=1, EL1PCTEN=1
    "    mov x0, #3",
    "    msr cnthctl_el2, x0",
    // No offset between physical and virtual counters
    "    msr cntvoff_el2, xzr",
    // SPSR_EL2: EL1h, DAIF masked
    "    mov x0, #0x3c5",
    "    msr spsr_el2, x0",
    "    adr x0, 1f",
    "    msr elr_el2, x0",
    "    eret",

    // -- EL1h --
    "1:",
    // MMU and caches off, RES1 bits set
    "    ldr x0, =0x30d00800",
    "    msr sctlr_el1, x0",
    // FP/SIMD accessible at EL0 and EL1
    "    mov x0, #(3 << 20)",
    "    msr cpacr_el1, x0",
    "    isb",
    "    msr daifset, #0xf",
    "    ldr x0, =__stack_top",
    "    mov sp, x0",

    "    ldr x0, =__bss_start",
    "    ldr x1, =__bss_end",
    "2:  cmp x0, x1",
    "    b.hs 3f",
    "    str xzr, [x0], #8",
    "    b 2b",
    "3:  bl kernel_main",

    "9:  wfe",
    "    b 9b",
);

#[repr(C, align(16))]
struct IdleStack([u8; config::IDLE_STACK_SIZE]);

static mut IDLE_STACK: IdleStack = IdleStack([0; config::IDLE_STACK_SIZE]);

/// Boot failures; all of them end in a panic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BootError {
    /// The process memory window overlaps the kernel image or leaves RAM
    WindowOutsideRam { base: u64, kernel_end: u64 },
    Memory(MemoryError),
    Process(ProcessError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WindowOutsideRam { base, kernel_end } => write!(
                f,
                "process memory at {:#x} does not fit RAM after the kernel (ends {:#x})",
                base, kernel_end
            ),
            Self::Memory(err) => write!(f, "process memory: {}", err),
            Self::Process(err) => write!(f, "boot process: {}", err),
        }
    }
}

impl From<MemoryError> for BootError {
    fn from(err: MemoryError) -> Self {
        Self::Memory(err)
    }
}

impl From<ProcessError> for BootError {
    fn from(err: ProcessError) -> Self {
        Self::Process(err)
    }
}

/// Kernel entry from `_start`: EL1h, interrupts masked, `.bss` zeroed.
#[unsafe(no_mangle)]
extern "C" fn kernel_main() -> ! {
    let platform = current_platform();
    console::init(platform.uart_base());
    crate::logging::init();
    crate::early_println!("\nVesper {}", env!("CARGO_PKG_VERSION"));
    info!("Vesper on {} at EL{}", platform.name(), cpu::current_el());

    trap::install();
    timer::init(config::QUANTUM_MS);
    // SAFETY: Once, before interrupts are unmasked, with the board's GIC
    // identity mapped (MMU off).
    unsafe { gic::init(platform) };
    info!(
        "boot: vectors at {:#x}, timer {} Hz, quantum {} ms",
        exceptions::vector_table_address(),
        timer::frequency(),
        config::QUANTUM_MS
    );

    // SAFETY: Interrupts stay masked until `resume`, so no trap can mint a
    // second token while this one lives.
    let mut token = unsafe { TrapToken::mint() };
    let Kernel { exec, board } = trap::kernel(&mut token);

    let exec_config = match configure(platform, board) {
        Ok(exec_config) => exec_config,
        Err(err) => panic!("{}", err),
    };
    if let Err(err) = exec.configure(exec_config).map_err(BootError::from) {
        panic!("{}", err);
    }
    if let Err(err) = demo::spawn_all(exec).map_err(BootError::from) {
        panic!("{}", err);
    }

    let first = ExceptionContext::from(exec.start(&mut board.timer));
    enable_lines(&exec_config.lines);

    // SAFETY: `first` is a fresh process or idle context built by the
    // executive, the kernel stack top comes from the linker script, and
    // the vector table is installed.
    unsafe { exceptions::resume(&first, &raw const __stack_top as u64) }
}

/// Describe the board to the executive and attach the devices.
fn configure(platform: &dyn Platform, board: &mut Board) -> Result<ExecutiveConfig, BootError> {
    let ram_base = platform.ram_base();
    let ram_end = ram_base + platform.ram_size();
    let window = ram_base + config::PROCESS_MEMORY_OFFSET;
    let kernel_end = &raw const __kernel_end as u64;
    if window < kernel_end || window + config::PROCESS_MEMORY_SIZE as u64 > ram_end {
        return Err(BootError::WindowOutsideRam {
            base: window,
            kernel_end,
        });
    }
    board.ram = RamWindow::new(ram_base, platform.ram_size());

    if let Some(fb) =
        platform.request_framebuffer(config::FRAMEBUFFER_WIDTH, config::FRAMEBUFFER_HEIGHT)
    {
        info!("boot: framebuffer {}x{} at {:#x}", fb.width, fb.height, fb.base);
        // SAFETY: Firmware reserved this memory for scanout; only the
        // kernel draws to it.
        unsafe { board.screen.attach(fb) };
    } else {
        info!("boot: no framebuffer, display syscalls are no-ops");
    }

    let lines = platform.interrupt_lines();
    let idle_top = (&raw mut IDLE_STACK) as u64 + config::IDLE_STACK_SIZE as u64;
    Ok(ExecutiveConfig {
        memory_base: window as usize,
        memory_size: config::PROCESS_MEMORY_SIZE,
        lines: IrqLines {
            scheduler_tick: lines.scheduler_tick,
            sleep_timer: lines.sleep_timer,
            input: lines.uart,
            storage: lines.storage,
            network: lines.network,
            usb: lines.usb,
        },
        idle: SavedContext::start(demo::idle_loop as usize as u64, idle_top, spsr::EL1T, 0),
        exit_trampoline: demo::process_exit as usize as u64,
    })
}

/// Unmask the lines the kernel handles. Device lines stay off until a
/// driver installs a callback for them.
fn enable_lines(lines: &IrqLines) {
    gic::enable_irq(lines.scheduler_tick, false);
    gic::enable_irq(lines.sleep_timer, false);
    gic::enable_irq(lines.input, false);
    console::enable_rx_interrupt();
}

/// Panic handler for the kernel
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // The logger may hold the console lock; only the emergency path is used
    let _ = cpu::disable_interrupts();
    let code = FatalKind::KernelPanic.code();
    FATAL.render(format_args!("{}", info), code, &mut PanicScreen);
    cpu::halt()
}
