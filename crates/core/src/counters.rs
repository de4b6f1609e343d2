//! Frame counters
//!
//! Monotonic, lock-free. Every present observed is later counted as either
//! rendered or skipped, so once calls have returned
//! `observed == rendered + skipped`.

use std::sync::atomic::{AtomicU64, Ordering};

use framehook_sdk::FrameStats;

#[derive(Debug, Default)]
pub struct FrameCounters {
    observed: AtomicU64,
    rendered: AtomicU64,
    skipped: AtomicU64,
}

impl FrameCounters {
    pub const fn new() -> Self {
        Self {
            observed: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Count a present, returning its 1-based frame number
    #[inline]
    pub fn observe(&self) -> u64 {
        self.observed.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn record_rendered(&self) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a skipped present, returning how many were skipped before it
    #[inline]
    pub fn record_skipped(&self) -> u64 {
        self.skipped.fetch_add(1, Ordering::Relaxed)
    }

    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }

    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> FrameStats {
        FrameStats {
            observed: self.observed(),
            rendered: self.rendered(),
            skipped: self.skipped(),
        }
    }
}
