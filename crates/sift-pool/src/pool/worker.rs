use crate::item::WorkItem;
use core::panic::AssertUnwindSafe;
use futures::FutureExt;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Slot task: executes one [`WorkItem`] at a time until the handoff closes.
///
/// Every iteration starts by announcing `slot_id` on `idle_tx`. The pool only
/// hands an item to a slot whose announcement it has consumed, so a slot's own
/// channel never holds more than the single item it is about to run.
///
/// # Arguments
///
/// - `slot_id`: Index of this slot, used for logs.
/// - `rx`: This slot's end of the handoff. Closed by the pool on shutdown.
/// - `idle_tx`: Shared queue of idle slot indices.
/// - `in_flight`: Pool-wide count of executing items.
/// - `ctx`: Context handed to every item.
///
/// A panicking item is caught and logged; the slot keeps serving.
pub async fn worker_loop<W: WorkItem>(
    slot_id: usize,
    mut rx: mpsc::Receiver<W>,
    idle_tx: mpsc::Sender<usize>,
    in_flight: Arc<AtomicUsize>,
    ctx: CancellationToken,
) {
    tracing::trace!("Slot {slot_id} started");

    loop {
        if idle_tx.send(slot_id).await.is_err() {
            tracing::debug!("Slot {slot_id} lost the idle queue");
            break;
        }

        let Some(item) = rx.recv().await else {
            tracing::debug!("Slot {slot_id} handoff closed");
            break;
        };

        in_flight.fetch_add(1, Ordering::AcqRel);
        // Build the item's future inside the guarded block so a panic while
        // constructing it is caught too.
        let item_ctx = ctx.clone();
        let outcome = AssertUnwindSafe(async move { item.execute(item_ctx).await })
            .catch_unwind()
            .await;
        in_flight.fetch_sub(1, Ordering::AcqRel);

        if let Err(panic) = outcome {
            tracing::error!("Slot {slot_id} item panicked: {}", panic_message(&*panic));
        }
    }

    tracing::trace!("Slot {slot_id} stopped");
}

fn panic_message(panic: &(dyn core::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
