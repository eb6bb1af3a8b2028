//! Bounded concurrency for file mutations.
//!
//! [`ConcurrencyGuard`] is a counting semaphore: at most `max` [`Permit`]s
//! are outstanding at once, further [`ConcurrencyGuard::acquire`] calls block
//! until one is dropped.
use std::sync::{Condvar, Mutex, OnceLock, PoisonError};

use tracing::debug;

/// Default number of concurrent mutations.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

static GLOBAL: OnceLock<ConcurrencyGuard> = OnceLock::new();

/// Counting semaphore bounding concurrent file mutations.
#[derive(Debug)]
pub struct ConcurrencyGuard {
    max: usize,
    in_use: Mutex<usize>,
    available: Condvar,
}

/// An acquired slot; released on drop.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct Permit<'a> {
    guard: &'a ConcurrencyGuard,
}

impl ConcurrencyGuard {
    /// Create a guard allowing `max` concurrent holders (`0` is treated as `1`).
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            in_use: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    /// The process-wide guard.
    ///
    /// The first call fixes the limit; later calls return the same instance
    /// regardless of `max`.
    pub fn global(max: usize) -> &'static Self {
        GLOBAL.get_or_init(|| {
            debug!(max, "initializing concurrency guard");
            Self::new(max)
        })
    }

    /// Maximum number of concurrent holders.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Number of permits currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        *self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a slot is free and take it.
    pub fn acquire(&self) -> Permit<'_> {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        while *in_use >= self.max {
            in_use = self
                .available
                .wait(in_use)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *in_use += 1;
        Permit { guard: self }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        if *in_use >= self.max {
            return None;
        }
        *in_use += 1;
        Some(Permit { guard: self })
    }

    /// Release `permit` explicitly; equivalent to dropping it.
    pub fn release(&self, permit: Permit<'_>) {
        drop(permit);
    }

    fn give_back(&self) {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        *in_use = in_use.saturating_sub(1);
        self.available.notify_one();
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.guard.give_back();
    }
}
