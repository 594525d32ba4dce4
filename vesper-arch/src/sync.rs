//! Trap-context ownership
//!
//! The kernel runs on one core and every handler runs with DAIF fully
//! masked, so kernel state is never touched by two contexts at once. That
//! fact is expressed in the type system instead of with a lock:
//!
//! - [`TrapToken`] is a zero-sized proof of "we are in trap context". Only
//!   exception entry (or boot code before interrupts are unmasked) may mint
//!   one, and minting is `unsafe`.
//! - [`TrapCell<T>`] holds state that may only be borrowed through a token.
//!   Borrowing takes `&mut TrapToken`, so one token can never hand out two
//!   live borrows.
//!
//! # Example
//!
//! ```
//! use vesper_arch::sync::{TrapCell, TrapToken};
//!
//! static TICKS: TrapCell<u64> = TrapCell::new(0);
//!
//! fn on_timer(token: &mut TrapToken) {
//!     *TICKS.borrow_mut(token) += 1;
//! }
//!
//! // SAFETY: single-threaded doctest, no other token exists
//! let mut token = unsafe { TrapToken::mint() };
//! on_timer(&mut token);
//! assert_eq!(*TICKS.borrow_mut(&mut token), 1);
//! ```

use core::cell::UnsafeCell;
use core::marker::PhantomData;

/// Proof that the holder runs in trap context with interrupts masked.
///
/// `!Send` and `!Sync`: a token never leaves the context that minted it.
pub struct TrapToken {
    _not_send: PhantomData<*const ()>,
}

impl TrapToken {
    /// Mint a token.
    ///
    /// # Safety
    ///
    /// - Interrupts must be masked on the current core for the whole lifetime
    ///   of the token
    /// - No other token may be alive (no nesting: a handler mints exactly one
    ///   and drops it before `eret`)
    #[must_use]
    #[inline]
    pub unsafe fn mint() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

/// State owned by trap context.
pub struct TrapCell<T> {
    data: UnsafeCell<T>,
}

// SAFETY: Access goes through `borrow_mut`, which needs a TrapToken. Tokens
// exist only while interrupts are masked on the single core, and one token
// yields at most one live borrow.
unsafe impl<T: Send> Sync for TrapCell<T> {}

impl<T> TrapCell<T> {
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            data: UnsafeCell::new(value),
        }
    }

    /// Borrow the contents for as long as the token stays borrowed.
    #[inline]
    pub fn borrow_mut<'a>(&'a self, _token: &'a mut TrapToken) -> &'a mut T {
        // SAFETY: The token proves exclusive trap context, and the `&mut`
        // on it rules out a second borrow through the same token.
        unsafe { &mut *self.data.get() }
    }

    /// Exclusive access without a token, for owners that hold `&mut self`.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}
