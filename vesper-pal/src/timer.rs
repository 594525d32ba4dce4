//! ARM Generic Timer Support
//!
//! Two comparators of the architectural timer, one per job:
//! - EL1 physical timer (CNTP): the scheduler quantum, re-armed relative
//!   to now on every tick
//! - EL1 virtual timer (CNTV): the earliest sleep deadline, armed as an
//!   absolute compare value
//!
//! Boot sets CNTVOFF_EL2 to zero, so both count the same ticks and a
//! deadline taken from [`now_ms`] can be programmed into CNTV directly.

/// Convert a counter value to whole milliseconds.
///
/// Split into seconds and remainder so `count * 1000` cannot overflow.
/// Saturates at `u64::MAX`.
#[inline]
pub const fn ticks_to_ms(count: u64, freq: u64) -> u64 {
    if freq == 0 {
        return 0;
    }
    let secs = count / freq;
    let frac = count % freq;
    let Some(whole) = secs.checked_mul(1_000) else {
        return u64::MAX;
    };
    // frac < freq, so the quotient is below 1000
    let part = ((frac as u128 * 1_000) / freq as u128) as u64;
    whole.saturating_add(part)
}

/// Smallest counter value at which `ticks_to_ms` reports `ms`.
///
/// Rounds up, so a comparator programmed with it never fires before the
/// millisecond clock reaches the deadline. Deadlines past the end of the
/// counter saturate to `u64::MAX`, a compare value that is never reached.
#[inline]
pub const fn ms_to_ticks(ms: u64, freq: u64) -> u64 {
    let secs = ms / 1_000;
    let rem = ms % 1_000;
    let Some(whole) = secs.checked_mul(freq) else {
        return u64::MAX;
    };
    // rem < 1000, so the product fits in u128 and the result below freq
    let part = (rem as u128 * freq as u128).div_ceil(1_000) as u64;
    whole.saturating_add(part)
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use core::sync::atomic::{AtomicU64, Ordering};

    use aarch64_cpu::registers::{
        CNTFRQ_EL0, CNTP_CTL_EL0, CNTP_TVAL_EL0, CNTPCT_EL0, CNTV_CTL_EL0, CNTV_CVAL_EL0,
    };
    use tock_registers::interfaces::{Readable, Writeable};

    use super::{ms_to_ticks, ticks_to_ms};

    /// Timer frequency (read from CNTFRQ_EL0 at init)
    static TIMER_FREQ: AtomicU64 = AtomicU64::new(0);

    /// Quantum length in counter ticks
    static QUANTUM_TICKS: AtomicU64 = AtomicU64::new(0);

    /// Timer control register bits
    mod ctl {
        /// Timer enabled
        pub const ENABLE: u64 = 1 << 0;
        /// Interrupt masked
        pub const IMASK: u64 = 1 << 1;
    }

    /// Read the physical counter
    pub fn read_counter() -> u64 {
        CNTPCT_EL0.get()
    }

    /// Initialise both comparators, disabled.
    pub fn init(quantum_ms: u64) {
        let freq = CNTFRQ_EL0.get();
        TIMER_FREQ.store(freq, Ordering::Relaxed);
        QUANTUM_TICKS.store(ms_to_ticks(quantum_ms, freq), Ordering::Relaxed);

        CNTP_CTL_EL0.set(0);
        CNTV_CTL_EL0.set(ctl::IMASK);
    }

    /// Get the timer frequency in Hz
    pub fn frequency() -> u64 {
        TIMER_FREQ.load(Ordering::Relaxed)
    }

    /// Get current time in milliseconds since boot
    pub fn now_ms() -> u64 {
        ticks_to_ms(read_counter(), TIMER_FREQ.load(Ordering::Relaxed))
    }

    /// Fire the scheduler tick one quantum from now.
    ///
    /// Writing TVAL also clears the pending condition of the last tick.
    pub fn rearm_tick() {
        CNTP_TVAL_EL0.set(QUANTUM_TICKS.load(Ordering::Relaxed));
        CNTP_CTL_EL0.set(ctl::ENABLE);
    }

    /// Fire the sleep interrupt once `now_ms() >= deadline_ms`.
    ///
    /// A deadline beyond the counter's range saturates and never fires.
    pub fn arm_sleep(deadline_ms: u64) {
        let freq = TIMER_FREQ.load(Ordering::Relaxed);
        CNTV_CVAL_EL0.set(ms_to_ticks(deadline_ms, freq));
        CNTV_CTL_EL0.set(ctl::ENABLE);
    }

    /// Mask the sleep comparator until the next deadline is armed
    pub fn disarm_sleep() {
        CNTV_CTL_EL0.set(ctl::IMASK);
    }
}

#[cfg(target_arch = "aarch64")]
pub use arch::*;

#[cfg(test)]
mod tests {
    use super::*;

    const QEMU_FREQ: u64 = 62_500_000;
    const PI_FREQ: u64 = 54_000_000;

    #[test]
    fn test_ticks_to_ms() {
        assert_eq!(ticks_to_ms(0, QEMU_FREQ), 0);
        assert_eq!(ticks_to_ms(QEMU_FREQ, QEMU_FREQ), 1_000);
        assert_eq!(ticks_to_ms(QEMU_FREQ / 1_000 - 1, QEMU_FREQ), 0);
        assert_eq!(ticks_to_ms(123, 0), 0);
    }

    #[test]
    fn test_large_counts_do_not_overflow() {
        let count = u64::MAX / 2;
        let expected = (count / PI_FREQ) * 1_000 + ((count % PI_FREQ) * 1_000) / PI_FREQ;
        assert_eq!(ticks_to_ms(count, PI_FREQ), expected);
        assert!(expected > count / PI_FREQ);
    }

    #[test]
    fn test_deadline_never_fires_early() {
        for freq in [QEMU_FREQ, PI_FREQ, 19_200_000, 1_000_003] {
            for ms in [0, 1, 7, 10, 100, 999, 1_000, 1_001, 86_400_000] {
                let ticks = ms_to_ticks(ms, freq);
                assert!(ticks_to_ms(ticks, freq) >= ms, "freq {} ms {}", freq, ms);
                if ticks > 0 {
                    assert!(ticks_to_ms(ticks - 1, freq) < ms, "freq {} ms {}", freq, ms);
                }
            }
        }
    }

    #[test]
    fn test_far_deadlines_saturate() {
        assert_eq!(ms_to_ticks(u64::MAX, QEMU_FREQ), u64::MAX);
        assert_eq!(ms_to_ticks(u64::MAX / 1_000, PI_FREQ), u64::MAX);
        assert_eq!(ms_to_ticks(u64::MAX, 0), 0);
        // Largest deadline that still fits converts exactly
        let ms = (u64::MAX / QEMU_FREQ) * 1_000;
        assert_eq!(ms_to_ticks(ms, QEMU_FREQ), (u64::MAX / QEMU_FREQ) * QEMU_FREQ);
    }

    #[test]
    fn test_huge_counts_saturate() {
        assert_eq!(ticks_to_ms(u64::MAX, 1), u64::MAX);
        let secs = u64::MAX / QEMU_FREQ;
        let frac = u64::MAX % QEMU_FREQ;
        assert_eq!(ticks_to_ms(u64::MAX, QEMU_FREQ), secs * 1_000 + frac * 1_000 / QEMU_FREQ);
    }
}
