use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

/// Process-wide pipeline counters.
///
/// Construct once at startup and share by `Arc`. Counters only ever increase.
/// Each increment is atomic on its own; there is no ordering between counters,
/// so a snapshot may briefly show `classified` ahead of the matching store
/// write.
#[derive(Debug, Default)]
pub struct Counters {
    ingested: AtomicU64,
    classified: AtomicU64,
    persistence_errors: AtomicU64,
    parse_errors: AtomicU64,
}

/// Point-in-time copy of [`Counters`] for exporters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub ingested: u64,
    pub classified: u64,
    pub persistence_errors: u64,
    pub parse_errors: u64,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            ingested: AtomicU64::new(0),
            classified: AtomicU64::new(0),
            persistence_errors: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
        }
    }

    pub fn record_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classified(&self) {
        self.classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    pub fn classified(&self) -> u64 {
        self.classified.load(Ordering::Relaxed)
    }

    pub fn persistence_errors(&self) -> u64 {
        self.persistence_errors.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            ingested: self.ingested(),
            classified: self.classified(),
            persistence_errors: self.persistence_errors(),
            parse_errors: self.parse_errors(),
        }
    }
}
