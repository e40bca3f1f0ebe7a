use crate::{
    counters::Counters,
    record::{Classifier, Message, Record},
    store::RecordStore,
};
use sift_pool::WorkItem;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Turns one raw [`Message`] into a classification and, for records of
/// interest, one store insert.
///
/// Failures stay inside the item: a parse or insert error is counted, logged
/// with the message offset, and the item completes normally. Nothing is
/// retried.
pub struct ClassificationItem<S> {
    message: Message,
    classifier: Classifier,
    counters: Arc<Counters>,
    store: Arc<S>,
}

impl<S: RecordStore> ClassificationItem<S> {
    pub const fn new(
        message: Message,
        classifier: Classifier,
        counters: Arc<Counters>,
        store: Arc<S>,
    ) -> Self {
        Self {
            message,
            classifier,
            counters,
            store,
        }
    }
}

impl<S: RecordStore> WorkItem for ClassificationItem<S> {
    // Runs to completion even if `ctx` is cancelled, so a record that was
    // classified is always handed to the store.
    async fn execute(self, _ctx: CancellationToken) {
        let Self {
            message,
            classifier,
            counters,
            store,
        } = self;

        counters.record_ingested();

        let record = match Record::parse(&message, &classifier) {
            Ok(record) => record,
            Err(e) => {
                counters.record_parse_error();
                tracing::warn!(
                    offset = message.offset,
                    "Dropping unparseable message: {e} (payload: {})",
                    message.preview()
                );
                return;
            }
        };

        if !record.of_interest {
            tracing::trace!(offset = record.offset, id = %record.id, "Not of interest");
            return;
        }

        counters.record_classified();
        if let Err(e) = store.insert(&record).await {
            counters.record_persistence_error();
            tracing::warn!(
                offset = record.offset,
                id = %record.id,
                "Failed to persist record: {e}"
            );
            return;
        }

        tracing::debug!(offset = record.offset, id = %record.id, "Persisted record");
    }
}
