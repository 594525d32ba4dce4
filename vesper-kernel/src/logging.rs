//! Kernel Logging
//!
//! Provides logging infrastructure using the `log` crate.
//!
//! Every record is formatted into a stack buffer first (no allocation, no
//! lock held while formatting), then written to the PL011 in one go as
//! `[seconds.millis] LEVEL target: message`.
//!
//! The fatal path bypasses this and writes directly to the UART.

use core::fmt::Write;

use log::{Level, Log, Metadata, Record};
use vesper_core::text::MessageBuffer;
use vesper_pal::{console, timer};

use crate::config;

/// Longest formatted line; longer messages are cut
const LINE_CAPACITY: usize = 320;

/// Kernel logger implementation
struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= config::LOG_LEVEL
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let time_ms = timer::now_ms();
        let level_str = match record.level() {
            Level::Error => "\x1b[31mERROR\x1b[0m",
            Level::Warn => "\x1b[33m WARN\x1b[0m",
            Level::Info => "\x1b[32m INFO\x1b[0m",
            Level::Debug => "\x1b[34mDEBUG\x1b[0m",
            Level::Trace => "\x1b[35mTRACE\x1b[0m",
        };

        let mut line = MessageBuffer::<LINE_CAPACITY>::new();
        let _ = write!(
            line,
            "[{:>8}.{:03}] {} {}: {}",
            time_ms / 1000,
            time_ms % 1000,
            level_str,
            record.target(),
            record.args()
        );
        // Newline written separately so a cut line still ends
        console::write_bytes(line.as_bytes());
        console::puts("\n");
    }

    fn flush(&self) {}
}

/// Global logger instance
static LOGGER: KernelLogger = KernelLogger;

/// Initialise the logging system
pub fn init() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(config::LOG_LEVEL))
        .ok();
}

/// Early println before logging is initialised
#[macro_export]
macro_rules! early_println {
    () => {
        vesper_pal::console::puts("\n")
    };
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!(vesper_pal::console::ConsoleWriter, $($arg)*);
        vesper_pal::console::puts("\n");
    }};
}
