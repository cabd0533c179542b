//! Monotonic recency tokens for supersession checks.
//!
//! The idle-disconnect pattern arms a delayed disconnect after every send and
//! must answer one question when the timer fires: *has any newer activity
//! happened since I was armed?*  That requires ordering, not global
//! uniqueness, so a shared atomic counter replaces the GUID tagging the
//! source system used — cheaper and easier to reason about.
//!
//! The invariant consumers rely on: a timer that captured token `t` at arm
//! time may act **iff** `current() == t` at fire time.  A stale timer firing
//! late simply observes a newer token and no-ops.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing activity counter.
///
/// `Ordering::Relaxed` is sufficient: tokens are compared for equality only
/// and carry no cross-thread memory-synchronisation duties.
pub struct RecencyCounter {
    inner: AtomicU64,
}

impl RecencyCounter {
    /// Creates a counter whose first minted token is `1`.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Mints a fresh token and makes it the current one.
    ///
    /// The returned value equals [`current`](Self::current) until the next
    /// `mint` call.  Wraps at `u64::MAX` without panicking.
    pub fn mint(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Reads the most recently minted token.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }

    /// Returns `true` when `token` is still the latest minted token.
    pub fn is_current(&self, token: u64) -> bool {
        self.current() == token
    }
}

impl Default for RecencyCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_minted_token_is_current_until_next_mint() {
        // Arrange
        let counter = RecencyCounter::new();

        // Act
        let t1 = counter.mint();

        // Assert
        assert!(counter.is_current(t1));
        let t2 = counter.mint();
        assert!(!counter.is_current(t1), "older token superseded");
        assert!(counter.is_current(t2));
    }

    #[test]
    fn test_tokens_increase_monotonically() {
        let counter = RecencyCounter::new();
        let values: Vec<u64> = (0..50).map(|_| counter.mint()).collect();
        for pair in values.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_fresh_counter_has_no_current_token_minted() {
        let counter = RecencyCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.mint(), 1);
    }

    #[test]
    fn test_mint_is_unique_across_threads() {
        // Arrange
        let counter = Arc::new(RecencyCounter::new());

        // Act – mint from many threads simultaneously
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..500).map(|_| c.mint()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert – no two threads ever minted the same token
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 500);
    }

    #[test]
    fn test_wraps_at_u64_max_without_panicking() {
        let counter = RecencyCounter {
            inner: AtomicU64::new(u64::MAX),
        };
        assert_eq!(counter.mint(), 0);
    }
}
