//! Test doubles shared by the unit tests.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteBackend;
use crate::scheduler::{DurableJobScheduler, JobRequest};
use async_trait::async_trait;
use edusync_protocol::{
    AckedRecord, DeletionLogEntry, EntityType, PageToken, PushAck, RecordEnvelope, RecordId,
    RecordPage, RemoteFilter, Timestamp,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// A minimal in-memory backend with a logical clock.
#[derive(Default)]
pub(crate) struct MemoryRemote {
    records: Mutex<BTreeMap<(EntityType, RecordId), RecordEnvelope>>,
    log: Mutex<Vec<DeletionLogEntry>>,
    clock: Mutex<Timestamp>,
    offline: AtomicBool,
    failing: Mutex<Vec<EntityType>>,
}

impl MemoryRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn stamp(&self) -> Timestamp {
        let mut clock = self.clock.lock();
        *clock += 1;
        *clock
    }

    pub(crate) fn set_clock(&self, at: Timestamp) {
        *self.clock.lock() = at;
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn fail_entity(&self, entity: EntityType) {
        self.failing.lock().push(entity);
    }

    pub(crate) fn heal_entity(&self, entity: EntityType) {
        self.failing.lock().retain(|e| *e != entity);
    }

    /// Writes a record as another device would, returning its stamp.
    pub(crate) fn insert(&self, mut envelope: RecordEnvelope) -> Timestamp {
        envelope.updated_at = self.stamp();
        let at = envelope.updated_at;
        self.records.lock().insert((envelope.entity, envelope.id), envelope);
        at
    }

    pub(crate) fn log_deletion(&self, entry: DeletionLogEntry) {
        self.log.lock().push(entry);
    }

    pub(crate) fn contains(&self, entity: EntityType, id: RecordId) -> bool {
        self.records.lock().contains_key(&(entity, id))
    }

    pub(crate) fn tombstones(&self) -> Vec<DeletionLogEntry> {
        self.log.lock().clone()
    }

    fn check(&self, entity: Option<EntityType>) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::remote_retryable("offline"));
        }
        if entity.is_some_and(|e| self.failing.lock().contains(&e)) {
            return Err(SyncError::remote_retryable("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for MemoryRemote {
    async fn fetch_updated_since(
        &self,
        entity: EntityType,
        after: Timestamp,
        filter: &RemoteFilter,
        _page: Option<PageToken>,
        _page_size: usize,
    ) -> SyncResult<RecordPage> {
        self.check(Some(entity))?;
        let records = self
            .records
            .lock()
            .values()
            .filter(|r| r.entity == entity && r.updated_at > after && filter.matches(&r.scope))
            .cloned()
            .collect();
        Ok(RecordPage::last(records))
    }

    async fn push(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> SyncResult<PushAck> {
        self.check(Some(entity))?;
        let mut ack = PushAck::default();
        for mut record in records {
            let pushed_at = record.updated_at;
            record.updated_at = self.stamp();
            ack.accepted.push(AckedRecord {
                id: record.id,
                pushed_at,
                updated_at: record.updated_at,
            });
            self.records.lock().insert((entity, record.id), record);
        }
        Ok(ack)
    }

    async fn push_tombstone(&self, entity: EntityType, id: RecordId, timestamp: Timestamp) -> SyncResult<Timestamp> {
        self.check(Some(entity))?;
        self.records.lock().remove(&(entity, id));
        let at = timestamp.max(self.stamp());
        self.log.lock().push(DeletionLogEntry::new(entity, id, at));
        Ok(at)
    }

    async fn fetch_tombstones_since(&self, after: Timestamp) -> SyncResult<Vec<DeletionLogEntry>> {
        self.check(None)?;
        Ok(self
            .log
            .lock()
            .iter()
            .filter(|e| e.timestamp > after)
            .cloned()
            .collect())
    }
}

/// Records scheduling requests without running them.
#[derive(Default)]
pub(crate) struct RecordingScheduler {
    pub(crate) requests: Mutex<Vec<JobRequest>>,
}

impl RecordingScheduler {
    pub(crate) fn names(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.name.clone()).collect()
    }
}

impl DurableJobScheduler for RecordingScheduler {
    fn schedule_unique(&self, request: JobRequest) -> SyncResult<()> {
        self.requests.lock().push(request);
        Ok(())
    }
}
