//! GIC (Generic Interrupt Controller) Management
//!
//! GICv2 driver instance shared by boot code and the IRQ path. The kernel
//! runs on one core, so the lock is never contended; it only gives the
//! driver a `'static` home.

use arm_gic::gicv2::GicV2;
use arm_gic::gicv2::registers::{Gicc, Gicd};
use arm_gic::{IntId, Trigger};
use log::debug;
use spin::Mutex;

use crate::platform::Platform;

/// Priority given to every line the kernel enables
const DEFAULT_PRIORITY: u8 = 0x80;

struct GicDriver(Option<GicV2<'static>>);

// SAFETY: GicV2 holds raw MMIO pointers. Every access goes through the
// GIC mutex, and the registers are never aliased elsewhere.
unsafe impl Send for GicDriver {}
unsafe impl Sync for GicDriver {}

/// Global GIC driver instance
static GIC: Mutex<GicDriver> = Mutex::new(GicDriver(None));

/// Initialise the distributor and the boot CPU interface.
///
/// # Safety
///
/// - Must be called exactly once, before interrupts are unmasked
/// - The platform's GIC bases must be accessible (identity mapped)
pub unsafe fn init(platform: &dyn Platform) {
    let gicd = platform.gic_distributor_base() as *mut Gicd;
    let gicc = platform.gic_cpu_base() as *mut Gicc;

    // SAFETY: The caller guarantees the bases are the board's GIC and that
    // no other driver instance exists.
    let mut driver = unsafe { GicV2::new(gicd, gicc) };
    driver.setup();
    // Accept all priorities
    driver.set_priority_mask(0xFF);

    GIC.lock().0 = Some(driver);
    debug!(
        "gic: GICv2 at GICD={:#x} GICC={:#x}",
        platform.gic_distributor_base(),
        platform.gic_cpu_base()
    );
}

fn with_driver<R>(f: impl FnOnce(&mut GicV2<'static>) -> R) -> Option<R> {
    GIC.lock().0.as_mut().map(f)
}

/// Configure and enable a line.
///
/// # Arguments
/// * `intid` - The interrupt ID (INTID) to enable
/// * `edge` - true for edge-triggered, false for level-sensitive
pub fn enable_irq(intid: u32, edge: bool) {
    let int_id = intid_from_raw(intid);
    let trigger = if edge { Trigger::Edge } else { Trigger::Level };
    let configured = with_driver(|driver| {
        driver.set_interrupt_priority(int_id, DEFAULT_PRIORITY);
        // PPI trigger modes are fixed by the implementation
        if intid >= 32 {
            driver.set_trigger(int_id, trigger);
        }
        driver.enable_interrupt(int_id, true)
    });

    match configured {
        Some(Ok(())) => debug!("gic: INTID {} enabled", intid),
        Some(Err(())) => log::warn!("gic: INTID {} out of range", intid),
        None => log::warn!("gic: enable INTID {} before init", intid),
    }
}

/// Acknowledge the highest priority pending interrupt.
///
/// Returns `None` if nothing is pending or the read was spurious.
pub fn acknowledge_interrupt() -> Option<u32> {
    with_driver(|driver| driver.get_and_acknowledge_interrupt())
        .flatten()
        .map(u32::from)
}

/// Signal end of interrupt processing
pub fn end_interrupt(intid: u32) {
    let int_id = intid_from_raw(intid);
    let _ = with_driver(|driver| driver.end_interrupt(int_id));
}

/// Convert raw interrupt ID to IntId type
///
/// IntId ranges:
/// - 0-15: SGI (Software Generated Interrupts)
/// - 16-31: PPI (Private Peripheral Interrupts)
/// - 32+: SPI (Shared Peripheral Interrupts)
fn intid_from_raw(intid: u32) -> IntId {
    if intid < 16 {
        IntId::sgi(intid)
    } else if intid < 32 {
        IntId::ppi(intid - 16)
    } else {
        IntId::spi(intid - 32)
    }
}
