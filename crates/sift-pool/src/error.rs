//! Error types for the worker pool.
//!
//! Only conditions that cross the pool boundary are represented here. Failures
//! inside a [`WorkItem`](crate::WorkItem) are the item's own business and never
//! surface through the pool.

pub type Result<T> = core::result::Result<T, Error>;

/// Errors the [`WorkerPool`](crate::WorkerPool) can report.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A pool was requested with zero slots.
    #[error("Pool capacity must be greater than 0")]
    InvalidCapacity,

    /// No slot could accept the item because the slot (or every slot) has
    /// exited. The rejected item is dropped.
    #[error("Slot unavailable: {context}")]
    SlotUnavailable { context: String },

    /// Shutdown gave up waiting for slots to finish their current item.
    #[error("Drain timed out with {remaining} slot(s) still running")]
    DrainTimeout { remaining: usize },
}
