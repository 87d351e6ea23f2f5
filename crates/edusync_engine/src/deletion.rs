//! Tombstone-based deletion propagation.
//!
//! A local delete removes the row and records a pending deletion intent in
//! one step, then asks the outbox to push it. The push drains the intent
//! into the remote deletion log. Other devices learn about the delete only
//! by consuming that log during their sync passes.

use crate::adapter::AdapterRegistry;
use crate::clock::Clock;
use crate::error::SyncResult;
use crate::outbox::OutboxWriter;
use crate::records::SyncRecord;
use crate::remote::RemoteBackend;
use edusync_protocol::{EntityType, PendingDeletionIntent, RecordId, Timestamp};
use edusync_storage::LocalStore;
use std::sync::Arc;

/// Counts reported by [`DeletionPropagator::consume_tombstones`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TombstoneReport {
    /// Log entries read.
    pub seen: usize,
    /// Local rows removed.
    pub removed: usize,
    /// Entries that could not be dispatched or applied.
    pub skipped: usize,
    /// Largest entry timestamp read.
    pub max_timestamp: Option<Timestamp>,
}

/// Records local deletes and applies remote ones.
pub struct DeletionPropagator {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteBackend>,
    registry: Arc<AdapterRegistry>,
    outbox: Arc<OutboxWriter>,
    clock: Arc<dyn Clock>,
}

impl DeletionPropagator {
    /// Creates a propagator.
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteBackend>,
        registry: Arc<AdapterRegistry>,
        outbox: Arc<OutboxWriter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            remote,
            registry,
            outbox,
            clock,
        }
    }

    /// Deletes a record locally and schedules the tombstone push.
    ///
    /// The intent is recorded even if the row was already gone, so a delete
    /// issued for a record not yet mirrored still reaches the backend.
    /// Returns true if a local row was removed.
    pub fn delete(&self, id: RecordId, entity: EntityType) -> SyncResult<bool> {
        let intent = PendingDeletionIntent::new(entity, id, self.clock.now_millis());
        let removed = self.store.delete_with_intent(intent)?;
        tracing::debug!(%entity, %id, removed, "deleted locally");

        self.outbox.request_push(entity);
        Ok(removed)
    }

    /// Typed form of [`delete`](Self::delete).
    pub fn delete_record<R: SyncRecord>(&self, id: RecordId) -> SyncResult<bool> {
        self.delete(id, R::ENTITY)
    }

    /// Applies remote deletion log entries recorded after `after`.
    ///
    /// Each entry is dispatched to its entity's adapter. An entry naming an
    /// unknown entity type, or whose local delete fails, is logged and
    /// skipped; the rest are still applied.
    ///
    /// # Errors
    ///
    /// Returns an error only if the log itself cannot be fetched.
    pub async fn consume_tombstones(&self, after: Timestamp) -> SyncResult<TombstoneReport> {
        let entries = self.remote.fetch_tombstones_since(after).await?;
        let mut report = TombstoneReport {
            seen: entries.len(),
            ..TombstoneReport::default()
        };

        for entry in entries {
            report.max_timestamp = report.max_timestamp.max(Some(entry.timestamp));

            let adapter = match self.registry.dispatch(&entry.entity_type) {
                Ok(adapter) => adapter,
                Err(e) => {
                    tracing::warn!(id = %entry.record_id, error = %e, "skipping tombstone");
                    report.skipped += 1;
                    continue;
                }
            };

            match adapter.apply_tombstone(entry.record_id, entry.timestamp).await {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        entity = %entry.entity_type,
                        id = %entry.record_id,
                        error = %e,
                        "tombstone not applied"
                    );
                    report.skipped += 1;
                }
            }
        }

        tracing::debug!(
            after,
            seen = report.seen,
            removed = report.removed,
            skipped = report.skipped,
            "consumed tombstones"
        );
        Ok(report)
    }
}
