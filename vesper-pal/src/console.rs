//! PL011 console
//!
//! Kernel log output and the keyboard input line. Transmit polls the FIFO;
//! receive is interrupt driven, the kernel drains [`read_byte`] when the
//! UART line fires.
use core::fmt::{self, Write};

use spin::mutex::SpinMutex;

/// PL011 register offsets and bits
mod pl011 {
    pub const DR: u64 = 0x00;
    pub const FR: u64 = 0x18;
    pub const IBRD: u64 = 0x24;
    pub const FBRD: u64 = 0x28;
    pub const LCRH: u64 = 0x2C;
    pub const CR: u64 = 0x30;
    pub const IMSC: u64 = 0x38;
    pub const ICR: u64 = 0x44;

    /// Transmit FIFO full
    pub const FR_TXFF: u32 = 1 << 5;
    /// Receive FIFO empty
    pub const FR_RXFE: u32 = 1 << 4;

    /// 8 data bits, FIFOs on
    pub const LCRH_8N1_FIFO: u32 = (0b11 << 5) | (1 << 4);
    pub const CR_UARTEN: u32 = 1 << 0;
    pub const CR_TXE: u32 = 1 << 8;
    pub const CR_RXE: u32 = 1 << 9;

    /// Receive and receive-timeout interrupts
    pub const INT_RX: u32 = (1 << 4) | (1 << 6);
}

/// Reference clock the firmware gives UART0 on both boards
const UART_CLOCK_HZ: u32 = 48_000_000;
const BAUD: u32 = 115_200;

/// Divisor = clock / (16 * baud), rounded, fraction in 64ths
const fn baud_divisor_x64() -> u32 {
    (UART_CLOCK_HZ * 4 + BAUD / 2) / BAUD
}

struct Console {
    base: u64,
}

impl Console {
    const fn new() -> Self {
        Self { base: 0 }
    }

    fn read(&self, offset: u64) -> u32 {
        // SAFETY: `base` is only non-zero after `init` was handed the
        // board's PL011 base, which is identity mapped device memory.
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&self, offset: u64, value: u32) {
        // SAFETY: As for `read`.
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn is_ready(&self) -> bool {
        self.base != 0
    }

    fn init(&mut self, base: u64) {
        self.base = base;

        let divisor_x64 = baud_divisor_x64();
        self.write(pl011::CR, 0);
        self.write(pl011::IBRD, divisor_x64 >> 6);
        self.write(pl011::FBRD, divisor_x64 & 0x3F);
        self.write(pl011::LCRH, pl011::LCRH_8N1_FIFO);
        self.write(pl011::IMSC, 0);
        self.write(pl011::CR, pl011::CR_UARTEN | pl011::CR_TXE | pl011::CR_RXE);
    }

    fn putc(&self, c: u8) {
        if !self.is_ready() {
            return;
        }

        // Wait for TX FIFO to have space
        while self.read(pl011::FR) & pl011::FR_TXFF != 0 {
            core::hint::spin_loop();
        }
        self.write(pl011::DR, u32::from(c));
    }

    fn put_bytes(&self, bytes: &[u8]) {
        for &c in bytes {
            if c == b'\n' {
                self.putc(b'\r');
            }
            self.putc(c);
        }
    }

    fn getc(&self) -> Option<u8> {
        if !self.is_ready() || self.read(pl011::FR) & pl011::FR_RXFE != 0 {
            return None;
        }
        // Upper bits carry framing/parity errors
        Some(self.read(pl011::DR) as u8)
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put_bytes(s.as_bytes());
        Ok(())
    }
}

/// Global console instance
static CONSOLE: SpinMutex<Console> = SpinMutex::new(Console::new());

/// Program the UART at `base` for 115200 8N1.
pub fn init(base: u64) {
    CONSOLE.lock().init(base);
}

/// Unmask the receive interrupts
pub fn enable_rx_interrupt() {
    let console = CONSOLE.lock();
    if console.is_ready() {
        console.write(pl011::ICR, pl011::INT_RX);
        console.write(pl011::IMSC, pl011::INT_RX);
    }
}

/// Clear the receive interrupt condition after draining the FIFO
pub fn clear_rx_interrupt() {
    let console = CONSOLE.lock();
    if console.is_ready() {
        console.write(pl011::ICR, pl011::INT_RX);
    }
}

/// Print a string to the console
pub fn puts(s: &str) {
    CONSOLE.lock().put_bytes(s.as_bytes());
}

/// Write raw bytes; they need not be UTF-8
pub fn write_bytes(bytes: &[u8]) {
    CONSOLE.lock().put_bytes(bytes);
}

/// Next received byte, if the FIFO holds one
pub fn read_byte() -> Option<u8> {
    CONSOLE.lock().getc()
}

/// Write from the fatal path.
///
/// Never waits for the lock: a trap may have interrupted its holder, so
/// the registers are driven directly when the lock is taken.
pub fn emergency_puts(s: &str) {
    match CONSOLE.try_lock() {
        Some(console) => console.put_bytes(s.as_bytes()),
        None => {
            // SAFETY: Nothing else runs once the fatal path has started.
            let console = unsafe { &*CONSOLE.as_mut_ptr() };
            console.put_bytes(s.as_bytes());
        }
    }
}

/// Console writer for fmt::Write
pub struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        puts(s);
        Ok(())
    }
}

/// Print formatted output to the console
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::console::ConsoleWriter, $($arg)*);
    }};
}

/// Print formatted output with newline to the console
#[macro_export]
macro_rules! println {
    () => {
        $crate::console::puts("\n")
    };
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::console::ConsoleWriter, $($arg)*);
        $crate::console::puts("\n");
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialised_console_is_silent() {
        let console = Console::new();
        console.put_bytes(b"dropped\n");
        assert_eq!(console.getc(), None);
    }

    #[test]
    fn test_baud_divisor() {
        let divisor_x64 = baud_divisor_x64();
        assert_eq!(divisor_x64 >> 6, 26);
        assert_eq!(divisor_x64 & 0x3F, 3);
    }
}
