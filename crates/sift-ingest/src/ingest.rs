//! Pull-and-dispatch driver.
//!
//! [`IngestionLoop::run`] reads one message at a time from a [`StreamSource`],
//! wraps it in a [`ClassificationItem`] and submits it to a [`WorkerPool`].
//! Because submission waits for an idle slot, a saturated pool stops the loop
//! from reading further, and the throttling reaches the source.
//!
//! The loop moves through [`LoopState::Running`], [`LoopState::Draining`] and
//! [`LoopState::Stopped`] in that order on every exit path, so every submitted
//! item finishes before `run` returns.

use crate::{
    classify::ClassificationItem,
    counters::{Counters, CountersSnapshot},
    error::{Error, Result, SourceError},
    record::Classifier,
    source::StreamSource,
    store::RecordStore,
};
use sift_pool::WorkerPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of an [`IngestionLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, `run` not called yet.
    Idle,
    /// Reading and submitting.
    Running,
    /// Reads stopped; waiting for the pool to finish submitted items.
    Draining,
    /// Pool drained.
    Stopped,
}

/// Outcome of a run that ended on the shutdown signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestReport {
    /// Messages handed to the pool.
    pub submitted: u64,
    /// Counter values after the pool drained.
    pub counters: CountersSnapshot,
}

/// Why the read loop stopped.
enum Stop {
    Signal,
    Source(SourceError),
    Pool(sift_pool::Error),
}

/// Drives a source into a pool of [`ClassificationItem`]s.
pub struct IngestionLoop<S> {
    classifier: Classifier,
    counters: Arc<Counters>,
    store: Arc<S>,
    state: LoopState,
}

impl<S: RecordStore> IngestionLoop<S> {
    pub const fn new(classifier: Classifier, counters: Arc<Counters>, store: Arc<S>) -> Self {
        Self {
            classifier,
            counters,
            store,
            state: LoopState::Idle,
        }
    }

    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Reads from `source` until `shutdown` fires or the source fails, then
    /// drains `pool`.
    ///
    /// A read in progress when `shutdown` fires is abandoned. A message that
    /// was already read is always submitted.
    ///
    /// # Errors
    ///
    /// - [`Error::Source`] if the source failed. The pool has been drained.
    /// - [`Error::Pool`] if a submission was rejected or the drain timed out.
    #[tracing::instrument(skip_all, fields(threshold = self.classifier.threshold()))]
    pub async fn run<R: StreamSource>(
        &mut self,
        mut source: R,
        pool: WorkerPool<ClassificationItem<S>>,
        shutdown: CancellationToken,
    ) -> Result<IngestReport> {
        self.transition(LoopState::Running);
        let mut submitted = 0_u64;

        let stop = loop {
            let message = tokio::select! {
                biased;
                () = shutdown.cancelled() => break Stop::Signal,
                read = source.read_one() => match read {
                    Ok(message) => message,
                    Err(e) => break Stop::Source(e),
                },
            };

            let item = ClassificationItem::new(
                message,
                self.classifier,
                Arc::clone(&self.counters),
                Arc::clone(&self.store),
            );
            if let Err(e) = pool.submit(item).await {
                break Stop::Pool(e);
            }
            submitted += 1;
        };

        match &stop {
            Stop::Signal => tracing::info!("Shutdown requested after {submitted} messages"),
            Stop::Source(e) => tracing::error!("Source failed after {submitted} messages: {e}"),
            Stop::Pool(e) => tracing::error!("Pool rejected work after {submitted} messages: {e}"),
        }

        self.transition(LoopState::Draining);
        let drained = pool.shutdown().await;
        self.transition(LoopState::Stopped);

        let counters = self.counters.snapshot();
        tracing::info!(
            ingested = counters.ingested,
            classified = counters.classified,
            parse_errors = counters.parse_errors,
            persistence_errors = counters.persistence_errors,
            "Ingestion stopped"
        );

        match stop {
            Stop::Signal => {
                drained?;
                Ok(IngestReport {
                    submitted,
                    counters,
                })
            }
            Stop::Source(e) => {
                if let Err(drain_err) = drained {
                    tracing::warn!("Drain after source failure incomplete: {drain_err}");
                }
                Err(Error::Source(e))
            }
            Stop::Pool(e) => {
                if let Err(drain_err) = drained {
                    tracing::warn!("Drain after pool failure incomplete: {drain_err}");
                }
                Err(Error::Pool(e))
            }
        }
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!("Ingestion loop {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
