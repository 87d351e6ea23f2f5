//! Reference backend of record.

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::tables::RecordTables;
use edusync_protocol::{
    DeletionLogEntry, EntityType, PageToken, PushAck, RecordEnvelope, RecordId, RecordPage,
    RemoteFilter, Timestamp,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The reference backend of record.
///
/// This backend answers the remote operations the sync engine relies on:
/// paged fetch by `updated_at`, batch upserts, tombstone writes and reads
/// of the deletion log. It is the authority for timestamps: every accepted
/// write is stamped from its own clock.
///
/// # Example
///
/// ```
/// use edusync_backend::{BackendConfig, ReferenceBackend};
/// use edusync_protocol::{EntityType, RecordEnvelope, RecordScope, RemoteFilter};
///
/// let backend = ReferenceBackend::new(BackendConfig::new().with_logical_clock(0));
/// let record = RecordEnvelope {
///     entity: EntityType::Events,
///     id: uuid::Uuid::new_v4(),
///     updated_at: 0,
///     scope: RecordScope::UNSCOPED,
///     payload: Vec::new(),
/// };
/// backend.push(EntityType::Events, vec![record]).unwrap();
///
/// let page = backend
///     .fetch_updated_since(EntityType::Events, 0, &RemoteFilter::All, None, 10)
///     .unwrap();
/// assert_eq!(page.records.len(), 1);
/// ```
#[derive(Clone)]
pub struct ReferenceBackend {
    config: BackendConfig,
    tables: Arc<RecordTables>,
    available: Arc<AtomicBool>,
}

impl ReferenceBackend {
    /// Creates an empty backend.
    pub fn new(config: BackendConfig) -> Self {
        let tables = Arc::new(RecordTables::new(config.clock));
        Self {
            config,
            tables,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Simulates the backend going offline or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if the backend answers requests.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> BackendResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BackendError::Unavailable)
        }
    }

    /// Returns one page of records with `updated_at > after` matching `filter`.
    ///
    /// The page size is capped at the configured maximum.
    pub fn fetch_updated_since(
        &self,
        entity: EntityType,
        after: Timestamp,
        filter: &RemoteFilter,
        page: Option<PageToken>,
        page_size: usize,
    ) -> BackendResult<RecordPage> {
        self.ensure_available()?;
        let size = page_size.clamp(1, self.config.max_page_size);
        self.tables.updated_since(entity, after, filter, page, size)
    }

    /// Upserts a batch of records.
    pub fn push(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> BackendResult<PushAck> {
        self.ensure_available()?;
        let count = records.len();
        let ack = self.tables.upsert(entity, records)?;
        tracing::debug!(%entity, count, "push accepted");
        Ok(ack)
    }

    /// Records a tombstone. Idempotent per record.
    pub fn push_tombstone(
        &self,
        entity: EntityType,
        id: RecordId,
        timestamp: Timestamp,
    ) -> BackendResult<Timestamp> {
        self.ensure_available()?;
        Ok(self.tables.tombstone(entity, id, timestamp))
    }

    /// Returns deletion log entries with `timestamp > after`.
    pub fn fetch_tombstones_since(&self, after: Timestamp) -> BackendResult<Vec<DeletionLogEntry>> {
        self.ensure_available()?;
        Ok(self.tables.tombstones_since(after))
    }

    /// Seeds records as if written by another client, returning their stamps.
    pub fn seed(&self, records: Vec<RecordEnvelope>) -> Vec<Timestamp> {
        let mut stamps = Vec::with_capacity(records.len());
        for record in records {
            let entity = record.entity;
            if let Ok(ack) = self.tables.upsert(entity, vec![record]) {
                stamps.extend(ack.accepted.iter().map(|a| a.updated_at));
            }
        }
        stamps
    }

    /// Appends a raw deletion log entry.
    pub fn append_log_entry(&self, entry: DeletionLogEntry) {
        self.tables.append_log_entry(entry);
    }

    /// Returns a record by id.
    pub fn get(&self, entity: EntityType, id: RecordId) -> Option<RecordEnvelope> {
        self.tables.get(entity, id)
    }

    /// Returns the number of records of an entity type.
    pub fn record_count(&self, entity: EntityType) -> usize {
        self.tables.count(entity)
    }

    /// Returns the number of deletion log entries.
    pub fn tombstone_count(&self) -> usize {
        self.tables.log_len()
    }

    /// Returns the latest authority timestamp.
    pub fn now(&self) -> Timestamp {
        self.tables.last_stamp()
    }

    /// Moves the authority clock forward to at least `at`.
    pub fn advance_clock(&self, at: Timestamp) {
        self.tables.advance_to(at);
    }
}
