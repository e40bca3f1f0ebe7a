//! Error types for the ingestion pipeline.
//!
//! Errors fall into two tiers:
//!
//! - [`Error`] crosses the pool boundary and ends the ingestion loop. It wraps
//!   a [`SourceError`] (the stream is unusable) or a pool [`sift_pool::Error`].
//! - [`ParseError`] and [`StoreError`] are local to one message. They are
//!   logged and counted by the item that hit them and never leave it.

pub type Result<T> = core::result::Result<T, Error>;

/// Fatal errors returned by [`IngestionLoop::run`](crate::IngestionLoop::run).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The stream source failed; no further messages can be read.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The worker pool rejected work or failed to drain.
    #[error("Pool error: {0}")]
    Pool(#[from] sift_pool::Error),
}

/// Failure reading from a [`StreamSource`](crate::StreamSource).
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// The stream has no more messages.
    #[error("End of stream")]
    EndOfStream,

    /// The source lost its connection to the upstream broker.
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A raw message could not be decoded into a [`Record`](crate::Record).
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// The payload is not a valid record document.
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The amount is NaN or infinite.
    #[error("Amount is not a finite number")]
    NonFiniteAmount,
}

/// A [`RecordStore`](crate::RecordStore) refused or failed an insert.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Insert rejected: {reason}")]
    Rejected { reason: String },
}
