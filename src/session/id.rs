//! Session identities.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable logical identity of a session. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(NonZeroU64);

impl SessionId {
    /// Wrap a raw id; `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw wire value.
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out fresh, monotonically increasing session ids.
#[derive(Debug)]
pub struct SessionIdAllocator {
    next: AtomicU64,
}

impl SessionIdAllocator {
    /// Start allocating at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start allocating at `first` (zero is skipped).
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    /// Allocate the next id.
    pub fn allocate(&self) -> SessionId {
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = SessionId::new(raw) {
                return id;
            }
        }
    }
}

impl Default for SessionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
