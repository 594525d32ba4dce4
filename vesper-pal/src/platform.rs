//! Platform Description
//!
//! Fixed per-board addresses and interrupt numbers. Both supported boards
//! use a GICv2 and a PL011, so one trait covers them.

use crate::framebuffer::FramebufferConfig;

/// INTIDs of every line the kernel routes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptLines {
    /// EL1 physical timer (PPI 14)
    pub scheduler_tick: u32,
    /// EL1 virtual timer (PPI 11)
    pub sleep_timer: u32,
    /// PL011 receive
    pub uart: u32,
    pub storage: u32,
    pub network: [u32; 2],
    pub usb: u32,
}

/// Architectural timer PPIs, identical on every GICv2 board
const CNTP_INTID: u32 = 30;
const CNTV_INTID: u32 = 27;

pub trait Platform: Send + Sync {
    /// Get the platform name
    fn name(&self) -> &'static str;

    /// Get the GIC distributor base address
    fn gic_distributor_base(&self) -> u64;

    /// Get the GIC CPU interface base address
    fn gic_cpu_base(&self) -> u64;

    /// Get the PL011 base address
    fn uart_base(&self) -> u64;

    /// Get the RAM base address
    fn ram_base(&self) -> u64;

    /// Get the RAM size usable by the kernel
    fn ram_size(&self) -> u64;

    /// Interrupt lines of the devices the kernel knows about
    fn interrupt_lines(&self) -> InterruptLines;

    /// Ask the firmware for a linear framebuffer.
    ///
    /// Boards without display firmware return `None` and the kernel runs
    /// headless.
    fn request_framebuffer(&self, _width: u32, _height: u32) -> Option<FramebufferConfig> {
        None
    }
}

/// QEMU `virt` machine (`-M virt,gic-version=2`)
pub struct QemuVirt;

impl Platform for QemuVirt {
    fn name(&self) -> &'static str {
        "QEMU virt"
    }

    fn gic_distributor_base(&self) -> u64 {
        0x0800_0000
    }

    fn gic_cpu_base(&self) -> u64 {
        0x0801_0000
    }

    fn uart_base(&self) -> u64 {
        0x0900_0000
    }

    fn ram_base(&self) -> u64 {
        0x4000_0000
    }

    fn ram_size(&self) -> u64 {
        // QEMU's default -m 128M
        0x0800_0000
    }

    fn interrupt_lines(&self) -> InterruptLines {
        InterruptLines {
            scheduler_tick: CNTP_INTID,
            sleep_timer: CNTV_INTID,
            // UART0 is SPI 1
            uart: 33,
            // First three virtio-mmio transports, SPI 16..18
            storage: 48,
            network: [49, 50],
            // PCIe INTA, where qemu-xhci sits
            usb: 35,
        }
    }
}

/// Raspberry Pi 4 Model B, low peripheral mode
pub struct RaspberryPi4;

impl Platform for RaspberryPi4 {
    fn name(&self) -> &'static str {
        "Raspberry Pi 4"
    }

    fn gic_distributor_base(&self) -> u64 {
        0xFF84_1000
    }

    fn gic_cpu_base(&self) -> u64 {
        0xFF84_2000
    }

    fn uart_base(&self) -> u64 {
        0xFE20_1000
    }

    fn ram_base(&self) -> u64 {
        0
    }

    fn ram_size(&self) -> u64 {
        // Below the VideoCore carve-out with the default gpu_mem
        0x3B40_0000
    }

    fn interrupt_lines(&self) -> InterruptLines {
        InterruptLines {
            scheduler_tick: CNTP_INTID,
            sleep_timer: CNTV_INTID,
            uart: 153,
            // EMMC2
            storage: 158,
            // GENET A and B
            network: [189, 190],
            // DWC OTG
            usb: 105,
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn request_framebuffer(&self, width: u32, height: u32) -> Option<FramebufferConfig> {
        crate::mailbox::allocate_framebuffer(width, height)
    }
}

#[cfg(not(feature = "rpi4"))]
static CURRENT_PLATFORM: QemuVirt = QemuVirt;

#[cfg(feature = "rpi4")]
static CURRENT_PLATFORM: RaspberryPi4 = RaspberryPi4;

/// The board this kernel was built for.
pub fn current_platform() -> &'static dyn Platform {
    &CURRENT_PLATFORM
}
