//! Persistence targets for classified records.
//!
//! A [`RecordStore`] receives one [`insert`](RecordStore::insert) per record
//! of interest. Stores are shared by every pool slot, so they must be safe to
//! call concurrently.

use crate::{error::StoreError, record::Record};
use core::future::Future;
use core::time::Duration;
use parking_lot::Mutex as SyncMutex;
use portable_atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

pub trait RecordStore: Send + Sync + 'static {
    fn insert(&self, record: &Record) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Appends each record as one JSON document per line.
///
/// Writes are serialised behind an async mutex and flushed individually so a
/// record is durable in the sink before `insert` reports success.
pub struct JsonLinesStore<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesStore<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> RecordStore for JsonLinesStore<W> {
    async fn insert(&self, record: &Record) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Keeps inserted records in memory. Can simulate latency and failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: SyncMutex<Vec<Record>>,
    calls: AtomicU64,
    latency: Option<Duration>,
    fail: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every insert.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Delays every insert by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `insert` calls, successful or not.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Copies of every record stored so far.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }
}

impl RecordStore for MemoryStore {
    async fn insert(&self, record: &Record) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail {
            return Err(StoreError::Rejected {
                reason: format!("record {} refused", record.id),
            });
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}
