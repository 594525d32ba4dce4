//! Per-process input event ring
//!
//! Written by the input delivery path, drained by the `read_input` syscall.
//! The ring is lossy: once full, a new event overwrites the oldest unread
//! one and the read cursor advances past it.

use vesper_syscall::KeyEvent;

/// Events a process can have pending before the oldest is dropped.
pub const INPUT_BUFFER_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputBuffer {
    events: [KeyEvent; INPUT_BUFFER_CAPACITY],
    read_index: usize,
    write_index: usize,
    len: usize,
}

impl InputBuffer {
    pub const EMPTY: Self = Self {
        events: [KeyEvent::EMPTY; INPUT_BUFFER_CAPACITY],
        read_index: 0,
        write_index: 0,
        len: 0,
    };

    /// Append an event. Returns `true` if an unread event was dropped.
    pub fn push(&mut self, event: KeyEvent) -> bool {
        self.events[self.write_index] = event;
        self.write_index = (self.write_index + 1) % INPUT_BUFFER_CAPACITY;

        if self.len == INPUT_BUFFER_CAPACITY {
            // Writer lapped the reader
            self.read_index = (self.read_index + 1) % INPUT_BUFFER_CAPACITY;
            true
        } else {
            self.len += 1;
            false
        }
    }

    pub fn pop(&mut self) -> Option<KeyEvent> {
        if self.len == 0 {
            return None;
        }
        let event = self.events[self.read_index];
        self.read_index = (self.read_index + 1) % INPUT_BUFFER_CAPACITY;
        self.len -= 1;
        Some(event)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(code: u8) -> KeyEvent {
        KeyEvent::key(0, code)
    }

    #[test]
    fn test_fifo_order() {
        let mut buf = InputBuffer::EMPTY;
        buf.push(ev(4));
        buf.push(ev(5));
        assert_eq!(buf.pop(), Some(ev(4)));
        assert_eq!(buf.pop(), Some(ev(5)));
        assert_eq!(buf.pop(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut buf = InputBuffer::EMPTY;
        for i in 0..INPUT_BUFFER_CAPACITY {
            assert!(!buf.push(ev(i as u8)));
        }
        assert!(buf.push(ev(200)));
        assert!(buf.push(ev(201)));
        assert_eq!(buf.len(), INPUT_BUFFER_CAPACITY);

        // Events 0 and 1 were overwritten
        assert_eq!(buf.pop(), Some(ev(2)));
        let mut last = None;
        while let Some(e) = buf.pop() {
            last = Some(e);
        }
        assert_eq!(last, Some(ev(201)));
    }
}
