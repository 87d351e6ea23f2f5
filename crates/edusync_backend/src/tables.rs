//! Record tables and the deletion log of the backend of record.

use crate::config::AuthorityClock;
use crate::error::{BackendError, BackendResult};
use edusync_protocol::{
    AckedRecord, DeletionLogEntry, EntityType, PageToken, PushAck, RecordEnvelope, RecordId,
    RecordPage, RemoteFilter, Timestamp,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

/// Server-side state.
///
/// The backend maintains:
/// - One table per entity type, keyed by record id
/// - An append-only deletion log
/// - The authority clock that stamps every accepted write
///
/// # Invariants
///
/// - `updated_at` values handed out are strictly increasing
/// - A tombstoned record is physically absent from its table
/// - The deletion log is never rewritten
pub struct RecordTables {
    tables: RwLock<HashMap<EntityType, BTreeMap<RecordId, RecordEnvelope>>>,
    deletions: RwLock<Vec<DeletionLogEntry>>,
    clock: AuthorityClock,
    last_stamp: Mutex<Timestamp>,
}

impl RecordTables {
    /// Creates empty tables.
    pub fn new(clock: AuthorityClock) -> Self {
        let start = match clock {
            AuthorityClock::System => 0,
            AuthorityClock::Logical { start } => start,
        };
        Self {
            tables: RwLock::new(HashMap::new()),
            deletions: RwLock::new(Vec::new()),
            clock,
            last_stamp: Mutex::new(start),
        }
    }

    /// Returns a fresh authority timestamp.
    pub fn stamp(&self) -> Timestamp {
        let mut last = self.last_stamp.lock();
        let next = match self.clock {
            AuthorityClock::System => wall_clock_millis().max(*last + 1),
            AuthorityClock::Logical { .. } => *last + 1,
        };
        *last = next;
        next
    }

    /// Returns the last timestamp handed out.
    pub fn last_stamp(&self) -> Timestamp {
        *self.last_stamp.lock()
    }

    /// Moves the clock forward so the next stamp is above `at`.
    /// Never moves it backwards.
    pub fn advance_to(&self, at: Timestamp) {
        let mut last = self.last_stamp.lock();
        *last = (*last).max(at);
    }

    /// Returns one page of records with `updated_at > after` matching `filter`.
    ///
    /// Records are paged in `(updated_at, id)` order so that a page boundary
    /// never splits records sharing a timestamp ambiguously.
    pub fn updated_since(
        &self,
        entity: EntityType,
        after: Timestamp,
        filter: &RemoteFilter,
        page: Option<PageToken>,
        page_size: usize,
    ) -> BackendResult<RecordPage> {
        let tables = self.tables.read();
        let mut matching: Vec<&RecordEnvelope> = tables
            .get(&entity)
            .map(|table| {
                table
                    .values()
                    .filter(|r| r.updated_at > after && filter.matches(&r.scope))
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by_key(|r| (r.updated_at, r.id));

        let offset = match page {
            Some(PageToken(offset)) => {
                let offset = usize::try_from(offset).map_err(|_| BackendError::InvalidPageToken(offset))?;
                if offset > matching.len() {
                    return Err(BackendError::InvalidPageToken(offset as u64));
                }
                offset
            }
            None => 0,
        };

        let end = (offset + page_size).min(matching.len());
        let records = matching[offset..end].iter().map(|r| (*r).clone()).collect();
        let next = (end < matching.len()).then(|| PageToken(end as u64));

        Ok(RecordPage { records, next })
    }

    /// Upserts records, stamping each with a new authority timestamp.
    pub fn upsert(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> BackendResult<PushAck> {
        if let Some(stray) = records.iter().find(|r| r.entity != entity) {
            return Err(BackendError::InvalidRequest(format!(
                "record {} of type {} pushed as {}",
                stray.id, stray.entity, entity
            )));
        }

        let mut tables = self.tables.write();
        let table = tables.entry(entity).or_default();
        let mut ack = PushAck::default();

        for mut record in records {
            let pushed_at = record.updated_at;
            record.updated_at = self.stamp();
            ack.accepted.push(AckedRecord {
                id: record.id,
                pushed_at,
                updated_at: record.updated_at,
            });
            table.insert(record.id, record);
        }

        Ok(ack)
    }

    /// Deletes a record and appends it to the deletion log.
    ///
    /// The entry is stamped with `max(client_at, authority now)` so the
    /// tombstone always covers every version the authority handed out.
    /// Repeating a tombstone returns the original entry's timestamp.
    pub fn tombstone(&self, entity: EntityType, id: RecordId, client_at: Timestamp) -> Timestamp {
        let mut tables = self.tables.write();
        let mut deletions = self.deletions.write();

        let removed = tables
            .get_mut(&entity)
            .and_then(|table| table.remove(&id))
            .is_some();

        if !removed {
            if let Some(existing) = deletions
                .iter()
                .rev()
                .find(|e| e.record_id == id && e.entity() == Some(entity))
            {
                return existing.timestamp;
            }
        }

        let timestamp = client_at.max(self.stamp());
        {
            let mut last = self.last_stamp.lock();
            *last = (*last).max(timestamp);
        }
        deletions.push(DeletionLogEntry::new(entity, id, timestamp));
        tracing::debug!(%entity, %id, timestamp, removed, "tombstone recorded");
        timestamp
    }

    /// Appends a raw log entry, for entity types this backend does not host.
    pub fn append_log_entry(&self, entry: DeletionLogEntry) {
        self.deletions.write().push(entry);
    }

    /// Returns log entries with `timestamp > after`.
    pub fn tombstones_since(&self, after: Timestamp) -> Vec<DeletionLogEntry> {
        self.deletions
            .read()
            .iter()
            .filter(|e| e.timestamp > after)
            .cloned()
            .collect()
    }

    /// Returns a record by id.
    pub fn get(&self, entity: EntityType, id: RecordId) -> Option<RecordEnvelope> {
        self.tables
            .read()
            .get(&entity)
            .and_then(|table| table.get(&id).cloned())
    }

    /// Returns the number of records of an entity type.
    pub fn count(&self, entity: EntityType) -> usize {
        self.tables.read().get(&entity).map_or(0, BTreeMap::len)
    }

    /// Returns the number of deletion log entries.
    pub fn log_len(&self) -> usize {
        self.deletions.read().len()
    }
}

fn wall_clock_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
