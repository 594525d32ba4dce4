//! Boot-time processes
//!
//! Small programs linked into the kernel image and started as processes.
//! They only talk to the kernel through `svc`, the same way a separately
//! loaded program would.

use core::fmt::Write;

use log::info;
use vesper_core::text::MessageBuffer;
use vesper_core::{Executive, ProcessError, ProcessMode};
use vesper_syscall::invoke;

use crate::config::DEFAULT_STACK_SIZE;

/// Where a process lands when its entry function returns
pub extern "C" fn process_exit() -> ! {
    invoke::stop()
}

/// Runs when no process is Ready. EL1t, interrupts unmasked.
pub extern "C" fn idle_loop() -> ! {
    loop {
        vesper_arch::wait_for_interrupt();
    }
}

/// Format into a stack buffer and print it.
macro_rules! say {
    ($($arg:tt)*) => {{
        let mut line = MessageBuffer::<96>::new();
        let _ = writeln!(line, $($arg)*);
        invoke::print(line.as_str());
    }};
}

/// Prints the uptime five times, a second apart, then returns.
extern "C" fn ticker() {
    for round in 1..=5 {
        say!("ticker: round {} at {} ms", round, invoke::uptime_ms());
        invoke::sleep_ms(1000);
    }
    say!("ticker: done");
}

/// Echoes keystrokes back to the console. Holds input focus.
extern "C" fn echo() {
    say!("echo: type something, '~' quits");
    loop {
        match invoke::read_input() {
            Some(event) => match event.to_ascii() {
                Some(b'~') => break,
                Some(byte) => {
                    let mut text = [0u8; 4];
                    invoke::print(char::from(byte).encode_utf8(&mut text));
                }
                None => {}
            },
            None => invoke::sleep_ms(20),
        }
    }
    say!("\necho: bye");
}

/// Grows and releases a heap region, checking its contents survive
/// preemption.
extern "C" fn heap_check() {
    const SIZE: usize = 3 * 4096;

    let Some(base) = invoke::heap_alloc(SIZE) else {
        say!("heap: allocation refused");
        return;
    };

    // SAFETY: The kernel just handed this process SIZE bytes at `base`.
    let region = unsafe { core::slice::from_raw_parts_mut(base, SIZE) };
    for (i, byte) in region.iter_mut().enumerate() {
        *byte = i as u8;
    }
    invoke::yield_now();
    invoke::sleep_ms(50);

    let intact = region.iter().enumerate().all(|(i, &byte)| byte == i as u8);
    let freed = invoke::heap_free(base).is_ok();
    let again = invoke::heap_free(base).is_ok();
    say!(
        "heap: {} bytes at {:p}, intact={} freed={} double_free_rejected={}",
        SIZE,
        base,
        intact,
        freed,
        !again
    );
}

/// Draws a bar that sweeps across the screen, when there is one.
extern "C" fn painter() {
    const BACKGROUND: u32 = 0x0010_1830;
    const BAR: u32 = 0x00F0_A030;
    const TEXT: u32 = 0x00FF_FFFF;

    let (width, height) = invoke::screen_size();
    if width == 0 || height == 0 {
        say!("painter: no display, exiting");
        return;
    }

    invoke::clear(BACKGROUND);
    let (_, line) = invoke::char_size(2);
    invoke::draw_string(16, 16, "Vesper", 2, TEXT);
    invoke::draw_line(16, 16 + line + 4, width - 16, 16 + line + 4, TEXT);

    let bar_width = width / 8;
    let top = height / 2;
    let mut x = 0;
    for _ in 0..400 {
        invoke::fill_rect(x, top, bar_width, 24, BACKGROUND);
        x = (x + 8) % (width - bar_width);
        invoke::fill_rect(x, top, bar_width, 24, BAR);
        invoke::sleep_ms(16);
    }
    invoke::draw_char(16, height - 32, b'#', 1, BAR);
    invoke::draw_pixel(width - 1, height - 1, TEXT);
}

/// Create the boot processes and give the echo process keyboard focus.
pub fn spawn_all(exec: &mut Executive) -> Result<(), ProcessError> {
    let entries: [(&str, extern "C" fn(), ProcessMode); 4] = [
        ("ticker", ticker, ProcessMode::Kernel),
        ("echo", echo, ProcessMode::User),
        ("heap", heap_check, ProcessMode::User),
        ("painter", painter, ProcessMode::User),
    ];

    for (name, entry, mode) in entries {
        let id = exec.create_process(entry as usize as u64, DEFAULT_STACK_SIZE, mode, name)?;
        info!("demo: {} is pid {} ({:?})", name, id, mode);
        if name == "echo" {
            exec.focus(id)?;
        }
    }
    Ok(())
}
