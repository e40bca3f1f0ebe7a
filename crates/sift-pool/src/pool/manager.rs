//! Fixed-capacity pool of asynchronous slots that execute [`WorkItem`]s.
//!
//! This module defines the [`WorkerPool`] struct. Each slot is a long-lived
//! Tokio task with its own single-item channel. Slots announce themselves on a
//! shared idle queue when they are ready, and [`WorkerPool::submit`] only hands
//! an item to a slot whose announcement it has taken. The idle queue is the
//! rendezvous point: when every slot is busy, `submit` waits, which is how a
//! slow pool throttles its producer.
//!
//! Shutdown closes every slot's channel and waits for the slot tasks to exit.
//! Items that are already running always finish.

use super::worker::worker_loop;
use crate::{
    error::{Error, Result},
    item::WorkItem,
};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, error::TrySendError},
    },
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Construction parameters for a [`WorkerPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of slots, and therefore the maximum number of items executing
    /// at once.
    pub capacity: usize,
    /// Upper bound on how long [`WorkerPool::shutdown`] waits for slots to
    /// finish. `None` waits indefinitely.
    pub drain_timeout: Option<Duration>,
}

impl PoolConfig {
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            drain_timeout: None,
        }
    }

    #[must_use]
    pub const fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = Some(drain_timeout);
        self
    }
}

/// A pool of `capacity` slots that each execute one [`WorkItem`] at a time.
///
/// There is no queue in front of the slots: [`submit`](Self::submit) completes
/// only once an idle slot has taken the item. Consuming the pool in
/// [`shutdown`](Self::shutdown) makes submitting after shutdown impossible.
pub struct WorkerPool<W: WorkItem> {
    slots: Vec<mpsc::Sender<W>>,
    idle: Mutex<mpsc::Receiver<usize>>,
    handles: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
    drain_timeout: Option<Duration>,
}

impl<W: WorkItem> WorkerPool<W> {
    /// Starts a pool with `capacity` slots and no drain timeout.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        match Self::try_new(capacity) {
            Ok(pool) => pool,
            Err(e) => panic!("{e}"),
        }
    }

    /// Starts a pool with `capacity` slots, rejecting a zero capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `capacity` is zero.
    pub fn try_new(capacity: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(capacity))
    }

    /// Starts a pool from a [`PoolConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `config.capacity` is zero.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        // Each slot has at most one announcement outstanding, so a queue of
        // `capacity` never makes a slot wait to report itself idle.
        let (idle_tx, idle_rx) = mpsc::channel(config.capacity);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let shutdown_token = CancellationToken::new();

        let mut slots = Vec::with_capacity(config.capacity);
        let mut handles = Vec::with_capacity(config.capacity);

        for slot_id in 0..config.capacity {
            // A slot only receives an item after announcing itself idle, so
            // its channel never needs to hold more than one.
            let (tx, rx) = mpsc::channel(1);
            slots.push(tx);

            handles.push(tokio::spawn(worker_loop(
                slot_id,
                rx,
                idle_tx.clone(),
                Arc::clone(&in_flight),
                shutdown_token.child_token(),
            )));
        }

        tracing::debug!("Started worker pool with {} slots", config.capacity);

        Ok(Self {
            slots,
            idle: Mutex::new(idle_rx),
            handles,
            in_flight,
            shutdown_token,
            drain_timeout: config.drain_timeout,
        })
    }

    /// Number of slots in the pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of items executing at this instant.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Hands `item` to an idle slot, waiting until one is available.
    ///
    /// Concurrent callers are served one at a time; each item goes to exactly
    /// one slot.
    ///
    /// # Cancel safety
    ///
    /// Cancel safe. If the future is dropped before it completes, the item was
    /// not handed to any slot and every slot stays available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SlotUnavailable`] if the chosen slot (or every slot)
    /// has exited. The item is dropped in that case.
    pub async fn submit(&self, item: W) -> Result<()> {
        let slot_idx = {
            let mut idle = self.idle.lock().await;
            idle.recv().await.ok_or_else(|| Error::SlotUnavailable {
                context: "all slots have exited".to_string(),
            })?
        };

        // The slot announced itself idle, so its channel is empty. Nothing is
        // awaited past this point, so a dropped `submit` cannot strand the
        // slot whose index it took.
        self.slots[slot_idx].try_send(item).map_err(|e| match e {
            TrySendError::Closed(_) => Error::SlotUnavailable {
                context: format!("slot {slot_idx} channel closed"),
            },
            TrySendError::Full(_) => Error::SlotUnavailable {
                context: format!("slot {slot_idx} already holds an item"),
            },
        })
    }

    /// Stops accepting work and waits for every slot to exit.
    ///
    /// - Closes each slot's channel; a busy slot exits after its current item.
    /// - Cancels the context handed to items.
    /// - Joins every slot task, bounded by the drain timeout if one is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DrainTimeout`] if the drain timeout elapsed first.
    /// Slots still running at that point are left to finish on their own.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            slots,
            idle,
            mut handles,
            in_flight,
            shutdown_token,
            drain_timeout,
        } = self;

        // === Phase 1: Close the handoff ===
        tracing::info!(
            "Closing worker pool ({} of {} slots busy)",
            in_flight.load(Ordering::Acquire),
            slots.len()
        );
        drop(slots);
        drop(idle);
        shutdown_token.cancel();

        // === Phase 2: Wait for slots to drain ===
        let join_all = futures::future::join_all(handles.iter_mut());
        let drained = match drain_timeout {
            Some(limit) => timeout(limit, join_all).await.ok(),
            None => Some(join_all.await),
        };

        let Some(joined) = drained else {
            let remaining = handles.iter().filter(|h| !h.is_finished()).count();
            tracing::warn!("Worker pool drain timed out ({remaining} slots still running)");
            return Err(Error::DrainTimeout { remaining });
        };

        for (slot_id, res) in joined.into_iter().enumerate() {
            if let Err(e) = res {
                tracing::error!("Slot {slot_id} terminated abnormally: {e}");
            }
        }

        tracing::info!("Worker pool shutdown complete");
        Ok(())
    }
}
