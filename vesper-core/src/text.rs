//! Fixed-capacity formatting buffer
//!
//! Used wherever text must be produced without an allocator: log lines and
//! the fatal diagnostic.

use core::fmt;

/// Stack buffer that silently truncates on overflow.
pub struct MessageBuffer<const N: usize> {
    data: [u8; N],
    len: usize,
}

impl<const N: usize> MessageBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            len: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        // Writes only ever stop on a char boundary
        core::str::from_utf8(&self.data[..self.len]).unwrap_or("<invalid>")
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const N: usize> Default for MessageBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for MessageBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = N - self.len;
        let mut to_copy = s.len().min(remaining);
        while !s.is_char_boundary(to_copy) {
            to_copy -= 1;
        }
        self.data[self.len..self.len + to_copy].copy_from_slice(&s.as_bytes()[..to_copy]);
        self.len += to_copy;
        Ok(())
    }
}
