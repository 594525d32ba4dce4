//! Syscall numbers
//!
//! The numeric values are the wire contract with existing process binaries
//! and must never be renumbered. Gaps are unassigned.

/// Syscall numbers, encoded as the `svc` immediate.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syscall {
    // === Memory ===
    /// Allocate a heap region. x0 = size. Returns base, or 0 if exhausted.
    HeapAlloc = 0,
    /// Release a heap region by base address. x0 = base.
    HeapFree = 1,

    // === Console and input ===
    /// Write bytes to the console. x0 = ptr, x1 = len. Returns len.
    Print = 3,
    /// Copy one buffered input event to x0 (8 bytes). Returns 1 or 0.
    ReadInput = 5,

    // === Drawing primitives (colour is 0x00RRGGBB) ===
    /// Fill the screen. x0 = colour.
    Clear = 10,
    /// x0 = x, x1 = y, x2 = colour.
    DrawPixel = 11,
    /// x0..x3 = x0, y0, x1, y1, x4 = colour.
    DrawLine = 12,
    /// x0 = x, x1 = y, x2 = w, x3 = h, x4 = colour.
    FillRect = 13,
    /// x0 = x, x1 = y, x2 = char, x3 = scale, x4 = colour.
    DrawChar = 14,
    /// x0 = x, x1 = y, x2 = ptr, x3 = len, x4 = scale, x5 = colour.
    DrawString = 15,

    // === Queries ===
    /// Returns `(width << 32) | height` of the screen in pixels.
    ScreenSize = 20,
    /// x0 = scale. Returns `(width << 32) | height` of one glyph.
    CharSize = 21,

    // === Scheduling ===
    /// Block for x0 milliseconds.
    Sleep = 30,
    /// Give up the rest of the quantum.
    Yield = 31,
    /// Milliseconds since boot.
    UptimeMs = 32,
    /// Terminate the calling process. Never returns.
    Stop = 33,
}

impl Syscall {
    /// Convert from the raw `svc` immediate.
    pub const fn from_number(num: u16) -> Option<Self> {
        match num {
            0 => Some(Self::HeapAlloc),
            1 => Some(Self::HeapFree),
            3 => Some(Self::Print),
            5 => Some(Self::ReadInput),
            10 => Some(Self::Clear),
            11 => Some(Self::DrawPixel),
            12 => Some(Self::DrawLine),
            13 => Some(Self::FillRect),
            14 => Some(Self::DrawChar),
            15 => Some(Self::DrawString),
            20 => Some(Self::ScreenSize),
            21 => Some(Self::CharSize),
            30 => Some(Self::Sleep),
            31 => Some(Self::Yield),
            32 => Some(Self::UptimeMs),
            33 => Some(Self::Stop),
            _ => None,
        }
    }

    /// The raw immediate.
    #[inline]
    pub const fn number(self) -> u16 {
        self as u16
    }

    /// Get the syscall name for logging.
    pub const fn name(self) -> &'static str {
        match self {
            Self::HeapAlloc => "heap_alloc",
            Self::HeapFree => "heap_free",
            Self::Print => "print",
            Self::ReadInput => "read_input",
            Self::Clear => "clear",
            Self::DrawPixel => "draw_pixel",
            Self::DrawLine => "draw_line",
            Self::FillRect => "fill_rect",
            Self::DrawChar => "draw_char",
            Self::DrawString => "draw_string",
            Self::ScreenSize => "screen_size",
            Self::CharSize => "char_size",
            Self::Sleep => "sleep",
            Self::Yield => "yield",
            Self::UptimeMs => "uptime_ms",
            Self::Stop => "stop",
        }
    }
}

/// Pack a width/height pair into one return register.
#[inline]
pub const fn pack_pair(width: u32, height: u32) -> u64 {
    ((width as u64) << 32) | height as u64
}

/// Inverse of [`pack_pair`].
#[inline]
pub const fn unpack_pair(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}
