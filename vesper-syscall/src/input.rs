//! Input events
//!
//! `read_input` copies one [`KeyEvent`] into process memory. The layout is
//! a USB HID boot-protocol keyboard report: modifier byte, reserved byte,
//! six key usage codes. Sources that produce characters (a serial console)
//! convert through [`KeyEvent::from_ascii`].

/// Left control modifier bit.
pub const MOD_LCTRL: u8 = 0x01;
/// Left shift modifier bit.
pub const MOD_LSHIFT: u8 = 0x02;

/// HID usage codes the ASCII mapping produces outside the tables.
pub mod usage {
    pub const A: u8 = 0x04;
    pub const Z: u8 = 0x1D;
    pub const ENTER: u8 = 0x28;
    pub const ESCAPE: u8 = 0x29;
    pub const BACKSPACE: u8 = 0x2A;
    pub const TAB: u8 = 0x2B;
    pub const SPACE: u8 = 0x2C;
}

/// One keyboard report.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub modifier: u8,
    pub reserved: u8,
    pub keys: [u8; 6],
}

const _: () = assert!(core::mem::size_of::<KeyEvent>() == 8);

/// Digits, then punctuation, without shift.
const PLAIN: [(u8, u8); 21] = [
    (b'1', 0x1E), (b'2', 0x1F), (b'3', 0x20), (b'4', 0x21), (b'5', 0x22),
    (b'6', 0x23), (b'7', 0x24), (b'8', 0x25), (b'9', 0x26), (b'0', 0x27),
    (b'-', 0x2D), (b'=', 0x2E), (b'[', 0x2F), (b']', 0x30), (b'\\', 0x31),
    (b';', 0x33), (b'\'', 0x34), (b'`', 0x35), (b',', 0x36), (b'.', 0x37),
    (b'/', 0x38),
];

/// The same keys with shift held.
const SHIFTED: [(u8, u8); 21] = [
    (b'!', 0x1E), (b'@', 0x1F), (b'#', 0x20), (b'$', 0x21), (b'%', 0x22),
    (b'^', 0x23), (b'&', 0x24), (b'*', 0x25), (b'(', 0x26), (b')', 0x27),
    (b'_', 0x2D), (b'+', 0x2E), (b'{', 0x2F), (b'}', 0x30), (b'|', 0x31),
    (b':', 0x33), (b'"', 0x34), (b'~', 0x35), (b'<', 0x36), (b'>', 0x37),
    (b'?', 0x38),
];

impl KeyEvent {
    pub const EMPTY: Self = Self {
        modifier: 0,
        reserved: 0,
        keys: [0; 6],
    };

    /// A report with a single key down.
    pub const fn key(modifier: u8, code: u8) -> Self {
        Self {
            modifier,
            reserved: 0,
            keys: [code, 0, 0, 0, 0, 0],
        }
    }

    /// Map a character from a serial line. `None` for bytes with no key.
    pub fn from_ascii(byte: u8) -> Option<Self> {
        let event = match byte {
            b'a'..=b'z' => Self::key(0, usage::A + (byte - b'a')),
            b'A'..=b'Z' => Self::key(MOD_LSHIFT, usage::A + (byte - b'A')),
            b'\r' | b'\n' => Self::key(0, usage::ENTER),
            0x1B => Self::key(0, usage::ESCAPE),
            0x08 | 0x7F => Self::key(0, usage::BACKSPACE),
            b'\t' => Self::key(0, usage::TAB),
            b' ' => Self::key(0, usage::SPACE),
            0x01..=0x1A => Self::key(MOD_LCTRL, usage::A + (byte - 1)),
            _ => {
                if let Some(&(_, code)) = PLAIN.iter().find(|(c, _)| *c == byte) {
                    Self::key(0, code)
                } else if let Some(&(_, code)) = SHIFTED.iter().find(|(c, _)| *c == byte) {
                    Self::key(MOD_LSHIFT, code)
                } else {
                    return None;
                }
            }
        };
        Some(event)
    }

    /// Character for the first pressed key, if it has one.
    pub fn to_ascii(&self) -> Option<u8> {
        let code = self.keys[0];
        let shift = self.modifier & MOD_LSHIFT != 0;
        if self.modifier & MOD_LCTRL != 0 {
            return (usage::A..=usage::Z)
                .contains(&code)
                .then(|| code - usage::A + 1);
        }
        match code {
            usage::A..=usage::Z => {
                let base = if shift { b'A' } else { b'a' };
                Some(base + (code - usage::A))
            }
            usage::ENTER => Some(b'\n'),
            usage::ESCAPE => Some(0x1B),
            usage::BACKSPACE => Some(0x08),
            usage::TAB => Some(b'\t'),
            usage::SPACE => Some(b' '),
            _ => {
                let table = if shift { &SHIFTED } else { &PLAIN };
                table.iter().find(|(_, k)| *k == code).map(|&(c, _)| c)
            }
        }
    }

    pub const fn to_bytes(self) -> [u8; 8] {
        let k = self.keys;
        [self.modifier, self.reserved, k[0], k[1], k[2], k[3], k[4], k[5]]
    }

    pub const fn from_bytes(b: [u8; 8]) -> Self {
        Self {
            modifier: b[0],
            reserved: b[1],
            keys: [b[2], b[3], b[4], b[5], b[6], b[7]],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.iter().all(|&k| k == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_shift() {
        assert_eq!(KeyEvent::from_ascii(b'a'), Some(KeyEvent::key(0, 0x04)));
        assert_eq!(KeyEvent::from_ascii(b'Q'), Some(KeyEvent::key(MOD_LSHIFT, 0x14)));
        assert_eq!(KeyEvent::key(MOD_LSHIFT, 0x14).to_ascii(), Some(b'Q'));
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(KeyEvent::from_ascii(b'\r'), Some(KeyEvent::key(0, usage::ENTER)));
        assert_eq!(KeyEvent::from_ascii(0x7F), Some(KeyEvent::key(0, usage::BACKSPACE)));
        // Ctrl-C
        let ctrl_c = KeyEvent::from_ascii(0x03).unwrap();
        assert_eq!(ctrl_c.modifier, MOD_LCTRL);
        assert_eq!(ctrl_c.to_ascii(), Some(0x03));
    }

    #[test]
    fn test_punctuation_tables_agree() {
        for byte in b"1!0)-_=+/?;:".iter().copied() {
            let event = KeyEvent::from_ascii(byte).unwrap();
            assert_eq!(event.to_ascii(), Some(byte), "byte {:#x}", byte);
        }
        assert_eq!(KeyEvent::from_ascii(0xC3), None);
    }

    #[test]
    fn test_wire_layout() {
        let event = KeyEvent::key(MOD_LSHIFT, 0x04);
        assert_eq!(event.to_bytes(), [0x02, 0, 0x04, 0, 0, 0, 0, 0]);
        assert!(KeyEvent::EMPTY.is_empty());
    }
}
