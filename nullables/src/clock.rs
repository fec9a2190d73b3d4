//! Nullable clock: deterministic Unix milliseconds.

use std::sync::atomic::{AtomicU64, Ordering};

use shroud_types::Clock;

/// Time only advances when you tell it to. Shareable across tasks.
#[derive(Debug)]
pub struct NullClock {
    current: AtomicU64,
}

impl NullClock {
    pub fn new(initial_ms: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_ms),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Advance by `ms` and return the new time.
    pub fn advance(&self, ms: u64) -> u64 {
        self.current.fetch_add(ms, Ordering::SeqCst) + ms
    }

    pub fn set(&self, ms: u64) {
        self.current.store(ms, Ordering::SeqCst);
    }
}

impl Clock for NullClock {
    fn now_ms(&self) -> u64 {
        NullClock::now_ms(self)
    }
}

impl Default for NullClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}
