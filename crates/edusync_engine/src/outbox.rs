//! Local-first writes and the push side of the outbox.

use crate::clock::Clock;
use crate::error::SyncResult;
use crate::hydrate::ReferenceLookup;
use crate::records::{self, SyncRecord};
use crate::remote::RemoteBackend;
use crate::scheduler::{DurableJobScheduler, JobHandler, JobRequest, JobWork};
use async_trait::async_trait;
use edusync_protocol::EntityType;
use edusync_storage::{LocalRecord, LocalStore};
use std::sync::Arc;
use std::time::Duration;

/// Writes records locally and schedules their push.
///
/// A save never waits on the network: the row is written with
/// `is_synced = false` and `updated_at = now`, then a unique push job is
/// requested for the record's entity type.
pub struct OutboxWriter {
    store: Arc<dyn LocalStore>,
    scheduler: Arc<dyn DurableJobScheduler>,
    clock: Arc<dyn Clock>,
    min_interval: Duration,
}

impl OutboxWriter {
    /// Creates a writer.
    ///
    /// `min_interval` is the lower bound on the retry delay of push jobs.
    pub fn new(
        store: Arc<dyn LocalStore>,
        scheduler: Arc<dyn DurableJobScheduler>,
        clock: Arc<dyn Clock>,
        min_interval: Duration,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
            min_interval,
        }
    }

    /// Creates or updates a record locally and schedules its push.
    ///
    /// Returns the record as stored, with its display fields hydrated.
    pub fn save<R: SyncRecord>(&self, mut record: R) -> SyncResult<R> {
        record.set_sync_state(self.clock.now_millis(), false);
        record.hydrate(&ReferenceLookup::new(self.store.as_ref()));

        self.store
            .put_local(LocalRecord::dirty(records::to_envelope(&record)?))?;
        tracing::debug!(entity = %R::ENTITY, id = %record.id(), "saved locally");

        self.request_push(R::ENTITY);
        Ok(record)
    }

    /// Requests the push job of an entity type.
    ///
    /// A scheduling failure is logged: the outbox rows stay in place and
    /// [`resume_pending`](Self::resume_pending) picks them up.
    pub fn request_push(&self, entity: EntityType) {
        if let Err(e) = self
            .scheduler
            .schedule_unique(JobRequest::push_outbox(entity, self.min_interval))
        {
            tracing::warn!(%entity, error = %e, "could not schedule push");
        }
    }

    /// Schedules pushes for every entity type with dirty rows or pending
    /// deletion intents. Returns the entity types scheduled.
    pub fn resume_pending(&self) -> SyncResult<Vec<EntityType>> {
        let mut scheduled = Vec::new();
        for entity in EntityType::ALL {
            let pending = !self.store.unsynced(entity)?.is_empty()
                || !self.store.pending_deletions(Some(entity))?.is_empty();
            if pending {
                self.request_push(entity);
                scheduled.push(entity);
            }
        }

        if !scheduled.is_empty() {
            tracing::info!(count = scheduled.len(), "resumed pending pushes");
        }
        Ok(scheduled)
    }
}

/// Counts reported by one push run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Rows sent.
    pub pushed: usize,
    /// Rows flipped to synced.
    pub confirmed: usize,
    /// Deletion intents drained to the remote log.
    pub tombstones: usize,
}

/// Pushes the outbox of one entity type.
pub struct PushWorker {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteBackend>,
    batch_size: usize,
}

impl PushWorker {
    /// Creates a worker.
    pub fn new(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteBackend>, batch_size: usize) -> Self {
        Self {
            store,
            remote,
            batch_size: batch_size.max(1),
        }
    }

    /// Pushes dirty rows, then drains deletion intents.
    ///
    /// A row edited again while its push was in flight stays dirty and is
    /// sent by the next run.
    pub async fn push_entity(&self, entity: EntityType) -> SyncResult<PushReport> {
        let mut report = PushReport::default();

        let dirty = self.store.unsynced(entity)?;
        for chunk in dirty.chunks(self.batch_size) {
            let envelopes = chunk.iter().map(|row| row.envelope.clone()).collect();
            let ack = self.remote.push(entity, envelopes).await?;
            report.pushed += chunk.len();

            for acked in ack.accepted {
                if self
                    .store
                    .mark_synced(entity, acked.id, acked.pushed_at, acked.updated_at)?
                {
                    report.confirmed += 1;
                }
            }
        }

        for intent in self.store.pending_deletions(Some(entity))? {
            let logged_at = self
                .remote
                .push_tombstone(entity, intent.id, intent.timestamp)
                .await?;
            // Raise the local mark to the authority time before dropping the intent.
            self.store.apply_tombstone(entity, intent.id, logged_at)?;
            self.store.clear_deletion_intent(entity, intent.id)?;
            report.tombstones += 1;
        }

        tracing::debug!(
            %entity,
            pushed = report.pushed,
            confirmed = report.confirmed,
            tombstones = report.tombstones,
            "outbox pushed"
        );
        Ok(report)
    }
}

#[async_trait]
impl JobHandler for PushWorker {
    async fn run(&self, work: JobWork) -> SyncResult<()> {
        match work {
            JobWork::PushOutbox(entity) => self.push_entity(entity).await.map(|_| ()),
        }
    }
}
