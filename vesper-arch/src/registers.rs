//! System Register Definitions
//!
//! Decoding for ESR/SPSR is plain bit arithmetic and builds everywhere.
//! Reading or writing the registers themselves goes through `aarch64-cpu`
//! and exists only on AArch64.

#[cfg(target_arch = "aarch64")]
pub use self::sysreg::*;

#[cfg(target_arch = "aarch64")]
mod sysreg {
    use aarch64_cpu::registers::VBAR_EL1;
    use tock_registers::interfaces::{Readable, Writeable};

    /// Read VBAR_EL1 (Vector Base Address Register)
    #[must_use]
    #[inline]
    pub fn read_vbar_el1() -> u64 {
        VBAR_EL1.get()
    }

    /// Write VBAR_EL1. The address must point to a 2KB aligned vector table.
    #[inline]
    pub fn write_vbar_el1(value: u64) {
        VBAR_EL1.set(value);
    }
}

/// Exception Syndrome Register (ESR) parsing
pub mod esr {
    /// Exception class (EC) field extraction
    #[inline]
    pub const fn exception_class(esr: u64) -> u8 {
        ((esr >> 26) & 0x3F) as u8
    }

    /// Instruction Length (IL) field - true if 32-bit instruction
    #[inline]
    pub const fn instruction_length(esr: u64) -> bool {
        (esr >> 25) & 1 != 0
    }

    /// Instruction Specific Syndrome (ISS) field
    #[inline]
    pub const fn iss(esr: u64) -> u32 {
        (esr & 0x1FF_FFFF) as u32
    }

    /// The 16-bit immediate of an AArch64 `svc`, or `None` for any other class.
    #[inline]
    pub const fn svc_immediate(esr: u64) -> Option<u16> {
        if exception_class(esr) == ec::SVC_AARCH64 {
            Some((iss(esr) & 0xFFFF) as u16)
        } else {
            None
        }
    }

    /// Get human-readable name for exception class
    pub fn ec_name(ec: u8) -> &'static str {
        match ec {
            ec::UNKNOWN => "Unknown",
            ec::WFI_WFE => "WFI/WFE trapped",
            ec::SVE_SIMD_FP => "SVE/SIMD/FP access",
            ec::ILLEGAL_EXECUTION => "Illegal execution state",
            ec::SVC_AARCH32 => "SVC (AArch32)",
            ec::SVC_AARCH64 => "SVC (AArch64)",
            ec::HVC_AARCH64 => "HVC (AArch64)",
            ec::SMC_AARCH64 => "SMC (AArch64)",
            ec::SYS_INSTRUCTION => "MSR/MRS/SYS trapped",
            ec::INSTRUCTION_ABORT_LOWER => "Instruction abort (lower EL)",
            ec::INSTRUCTION_ABORT_SAME => "Instruction abort (same EL)",
            ec::PC_ALIGNMENT => "PC alignment fault",
            ec::DATA_ABORT_LOWER => "Data abort (lower EL)",
            ec::DATA_ABORT_SAME => "Data abort (same EL)",
            ec::SP_ALIGNMENT => "SP alignment fault",
            ec::FP_EXCEPTION => "FP exception (AArch64)",
            ec::SERROR => "SError",
            ec::BREAKPOINT_LOWER => "Breakpoint (lower EL)",
            ec::BREAKPOINT_SAME => "Breakpoint (same EL)",
            ec::SOFTWARE_STEP_LOWER => "Software step (lower EL)",
            ec::SOFTWARE_STEP_SAME => "Software step (same EL)",
            ec::WATCHPOINT_LOWER => "Watchpoint (lower EL)",
            ec::WATCHPOINT_SAME => "Watchpoint (same EL)",
            ec::BRK_AARCH64 => "BRK (AArch64)",
            _ => "Reserved/Unknown",
        }
    }

    /// True for instruction and data aborts from either level.
    #[inline]
    pub const fn is_abort(ec: u8) -> bool {
        matches!(
            ec,
            ec::INSTRUCTION_ABORT_LOWER
                | ec::INSTRUCTION_ABORT_SAME
                | ec::DATA_ABORT_LOWER
                | ec::DATA_ABORT_SAME
        )
    }

    /// Exception class values
    pub mod ec {
        pub const UNKNOWN: u8 = 0b000000;
        pub const WFI_WFE: u8 = 0b000001;
        pub const SVE_SIMD_FP: u8 = 0b000111;
        pub const ILLEGAL_EXECUTION: u8 = 0b001110;
        pub const SVC_AARCH32: u8 = 0b010001;
        pub const SVC_AARCH64: u8 = 0b010101;
        pub const HVC_AARCH64: u8 = 0b010110;
        pub const SMC_AARCH64: u8 = 0b010111;
        pub const SYS_INSTRUCTION: u8 = 0b011000;
        pub const INSTRUCTION_ABORT_LOWER: u8 = 0b100000;
        pub const INSTRUCTION_ABORT_SAME: u8 = 0b100001;
        pub const PC_ALIGNMENT: u8 = 0b100010;
        pub const DATA_ABORT_LOWER: u8 = 0b100100;
        pub const DATA_ABORT_SAME: u8 = 0b100101;
        pub const SP_ALIGNMENT: u8 = 0b100110;
        pub const FP_EXCEPTION: u8 = 0b101100;
        pub const SERROR: u8 = 0b101111;
        pub const BREAKPOINT_LOWER: u8 = 0b110000;
        pub const BREAKPOINT_SAME: u8 = 0b110001;
        pub const SOFTWARE_STEP_LOWER: u8 = 0b110010;
        pub const SOFTWARE_STEP_SAME: u8 = 0b110011;
        pub const WATCHPOINT_LOWER: u8 = 0b110100;
        pub const WATCHPOINT_SAME: u8 = 0b110101;
        pub const BRK_AARCH64: u8 = 0b111100;
    }

    /// Data/Instruction abort ISS fields
    pub mod abort {
        /// Fault Status Code (bits [5:0])
        #[inline]
        pub const fn dfsc(iss: u32) -> u8 {
            (iss & 0x3F) as u8
        }

        /// Write not Read (bit 6)
        #[inline]
        pub const fn wnr(iss: u32) -> bool {
            (iss >> 6) & 1 != 0
        }

        /// FAR not Valid (bit 10)
        #[inline]
        pub const fn fnv(iss: u32) -> bool {
            (iss >> 10) & 1 != 0
        }

        /// Fault kind for a status code. The low two bits carry the
        /// translation level for the level-indexed kinds.
        pub fn dfsc_name(dfsc: u8) -> &'static str {
            match dfsc {
                0b000000..=0b000011 => "Address size fault",
                0b000100..=0b000111 => "Translation fault",
                0b001000..=0b001011 => "Access flag fault",
                0b001100..=0b001111 => "Permission fault",
                0b010000 | 0b010100..=0b010111 => "Synchronous external abort",
                0b011000 | 0b011100..=0b011111 => "Synchronous parity/ECC error",
                0b100001 => "Alignment fault",
                0b110000 => "TLB conflict abort",
                _ => "Unknown/Reserved fault",
            }
        }
    }
}

/// Saved Program Status Register (SPSR) parsing
pub mod spsr {
    /// EL0 using SP_EL0, all of DAIF clear. Initial state of user processes.
    pub const EL0T: u64 = 0b0000;
    /// EL1 using SP_EL0, all of DAIF clear. Initial state of kernel processes.
    pub const EL1T: u64 = 0b0100;

    /// DAIF interrupt mask bits (bits [9:6])
    #[inline]
    pub const fn daif(spsr: u64) -> (bool, bool, bool, bool) {
        (
            (spsr >> 9) & 1 != 0, // D - Debug mask
            (spsr >> 8) & 1 != 0, // A - SError mask
            (spsr >> 7) & 1 != 0, // I - IRQ mask
            (spsr >> 6) & 1 != 0, // F - FIQ mask
        )
    }

    /// Exception level from M[3:2] bits
    #[inline]
    pub const fn exception_level(spsr: u64) -> u8 {
        ((spsr >> 2) & 0x3) as u8
    }

    /// Stack pointer selection from M[0] bit (true = SP_ELx, false = SP_EL0)
    #[inline]
    pub const fn sp_sel(spsr: u64) -> bool {
        spsr & 1 != 0
    }

    /// Execution state from M[4] bit (true = AArch32, false = AArch64)
    #[inline]
    pub const fn is_aarch32(spsr: u64) -> bool {
        (spsr >> 4) & 1 != 0
    }

    /// Get exception level name (e.g., "EL0t", "EL1h")
    pub fn el_name(spsr: u64) -> &'static str {
        if is_aarch32(spsr) {
            return "AArch32";
        }
        match (exception_level(spsr), sp_sel(spsr)) {
            (0, _) => "EL0t",
            (1, false) => "EL1t",
            (1, true) => "EL1h",
            (2, false) => "EL2t",
            (2, true) => "EL2h",
            (3, false) => "EL3t",
            (3, true) => "EL3h",
            _ => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_svc_immediate_decoding() {
        let esr = (u64::from(esr::ec::SVC_AARCH64) << 26) | (1 << 25) | 0x0021;
        assert_eq!(esr::exception_class(esr), esr::ec::SVC_AARCH64);
        assert!(esr::instruction_length(esr));
        assert_eq!(esr::svc_immediate(esr), Some(0x21));
    }

    #[test]
    fn test_non_svc_has_no_immediate() {
        let esr = u64::from(esr::ec::DATA_ABORT_LOWER) << 26 | 0x47;
        assert_eq!(esr::svc_immediate(esr), None);
        assert!(esr::is_abort(esr::exception_class(esr)));
        assert!(esr::abort::wnr(esr::iss(esr)));
        assert_eq!(esr::abort::dfsc_name(esr::abort::dfsc(esr::iss(esr))), "Translation fault");
    }

    #[test]
    fn test_process_modes() {
        assert_eq!(spsr::el_name(spsr::EL0T), "EL0t");
        assert_eq!(spsr::el_name(spsr::EL1T), "EL1t");
        assert_eq!(spsr::el_name(0x3c5), "EL1h");
        assert_eq!(spsr::daif(spsr::EL1T), (false, false, false, false));
        assert_eq!(spsr::daif(0x3c5), (true, true, true, true));
    }
}
