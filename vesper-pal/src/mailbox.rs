//! VideoCore mailbox (Raspberry Pi 4)
//!
//! Only the property channel, and only the one message the kernel sends:
//! allocate a 32bpp framebuffer.

use log::{debug, warn};

use crate::framebuffer::FramebufferConfig;

const MBOX_BASE: u64 = 0xFE00_B880;
const MBOX_READ: u64 = 0x00;
const MBOX_STATUS: u64 = 0x18;
const MBOX_WRITE: u64 = 0x20;

const STATUS_FULL: u32 = 0x8000_0000;
const STATUS_EMPTY: u32 = 0x4000_0000;

const CHANNEL_PROPERTY: u32 = 8;
const RESPONSE_SUCCESS: u32 = 0x8000_0000;

mod tag {
    pub const SET_PHYSICAL_SIZE: u32 = 0x0004_8003;
    pub const SET_VIRTUAL_SIZE: u32 = 0x0004_8004;
    pub const SET_DEPTH: u32 = 0x0004_8005;
    pub const SET_PIXEL_ORDER: u32 = 0x0004_8006;
    pub const SET_VIRTUAL_OFFSET: u32 = 0x0004_8009;
    pub const ALLOCATE_BUFFER: u32 = 0x0004_0001;
    pub const GET_PITCH: u32 = 0x0004_0008;
}

/// Bus addresses alias RAM through the VideoCore's uncached window
const BUS_ADDRESS_MASK: u32 = 0x3FFF_FFFF;

/// Upper bound on status polls before giving up on the firmware
const POLL_LIMIT: usize = 1_000_000;

const MESSAGE_WORDS: usize = 35;

#[repr(C, align(16))]
struct Message([u32; MESSAGE_WORDS]);

fn read(offset: u64) -> u32 {
    // SAFETY: Fixed mailbox registers of the BCM2711 in low peripheral mode
    unsafe { core::ptr::read_volatile((MBOX_BASE + offset) as *const u32) }
}

fn write(offset: u64, value: u32) {
    // SAFETY: As for `read`.
    unsafe { core::ptr::write_volatile((MBOX_BASE + offset) as *mut u32, value) }
}

fn wait_while(mask: u32) -> bool {
    for _ in 0..POLL_LIMIT {
        if read(MBOX_STATUS) & mask == 0 {
            return true;
        }
        core::hint::spin_loop();
    }
    false
}

/// Post `message` on the property channel and wait for the reply.
fn call(message: &mut Message) -> bool {
    let address = message.0.as_mut_ptr() as u64;
    if address > u64::from(u32::MAX) {
        return false;
    }
    let request = (address as u32 & !0xF) | CHANNEL_PROPERTY;

    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    if !wait_while(STATUS_FULL) {
        return false;
    }
    write(MBOX_WRITE, request);

    loop {
        if !wait_while(STATUS_EMPTY) {
            return false;
        }
        if read(MBOX_READ) == request {
            break;
        }
    }
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);

    // SAFETY: In-bounds read of the buffer the firmware just rewrote
    let code = unsafe { core::ptr::read_volatile(&message.0[1]) };
    code == RESPONSE_SUCCESS
}

/// Ask the firmware for a `width` x `height` 32bpp RGB framebuffer.
pub fn allocate_framebuffer(width: u32, height: u32) -> Option<FramebufferConfig> {
    #[rustfmt::skip]
    let mut message = Message([
        (MESSAGE_WORDS * 4) as u32, 0,
        tag::SET_PHYSICAL_SIZE, 8, 0, width, height,
        tag::SET_VIRTUAL_SIZE, 8, 0, width, height,
        tag::SET_VIRTUAL_OFFSET, 8, 0, 0, 0,
        tag::SET_DEPTH, 4, 0, 32,
        tag::SET_PIXEL_ORDER, 4, 0, 1,
        tag::ALLOCATE_BUFFER, 8, 0, 4096, 0,
        tag::GET_PITCH, 4, 0, 0,
        0,
    ]);

    if !call(&mut message) {
        warn!("mailbox: framebuffer request failed");
        return None;
    }

    let word = |index: usize| {
        // SAFETY: In-bounds read of the firmware's reply
        unsafe { core::ptr::read_volatile(&message.0[index]) }
    };
    if word(20) != 32 {
        warn!("mailbox: firmware gave depth {}, need 32", word(20));
        return None;
    }

    let config = FramebufferConfig {
        base: u64::from(word(28) & BUS_ADDRESS_MASK),
        width: word(5),
        height: word(6),
        stride: word(33),
        is_bgr: word(24) == 0,
    };
    debug!("mailbox: framebuffer {:?}", config);
    config.is_valid().then_some(config)
}
