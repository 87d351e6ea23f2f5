//! In-memory local store.

use crate::error::StorageResult;
use crate::store::{LocalRecord, LocalStore, MergeStats};
use crate::table::Table;
use edusync_protocol::{
    EntityType, PendingDeletionIntent, RecordEnvelope, RecordId, Timestamp,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An in-memory local store.
///
/// Suitable for:
/// - Unit and integration tests
/// - Sessions that do not need to survive a restart
///
/// Every entity type has its own lock, so jobs writing different entity
/// types never contend.
///
/// # Example
///
/// ```rust
/// use edusync_storage::{LocalStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.put_value("greeting", b"hello".to_vec()).unwrap();
/// assert_eq!(store.get_value("greeting").unwrap(), Some(b"hello".to_vec()));
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    tables: Vec<RwLock<Table>>,
    intents: RwLock<BTreeMap<(EntityType, RecordId), PendingDeletionIntent>>,
    values: RwLock<BTreeMap<String, Vec<u8>>>,
}

/// Serializable image of a [`MemoryStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    tables: Vec<(EntityType, Table)>,
    intents: Vec<PendingDeletionIntent>,
    values: Vec<(String, Vec<u8>)>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: EntityType::ALL
                .iter()
                .map(|_| RwLock::new(Table::default()))
                .collect(),
            intents: RwLock::new(BTreeMap::new()),
            values: RwLock::new(BTreeMap::new()),
        }
    }

    fn table(&self, entity: EntityType) -> &RwLock<Table> {
        &self.tables[entity as usize]
    }

    /// Returns the number of rows in a table.
    pub fn count(&self, entity: EntityType) -> usize {
        self.table(entity).read().rows().count()
    }

    /// Returns the number of tombstone marks kept for a table.
    pub fn tombstone_count(&self, entity: EntityType) -> usize {
        self.table(entity).read().tombstone_count()
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            tables: EntityType::ALL
                .iter()
                .map(|&entity| (entity, self.table(entity).read().clone()))
                .collect(),
            intents: self.intents.read().values().copied().collect(),
            values: self
                .values
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        for (entity, table) in snapshot.tables {
            *store.table(entity).write() = table;
        }
        {
            let mut intents = store.intents.write();
            for intent in snapshot.intents {
                intents.insert((intent.entity, intent.id), intent);
            }
        }
        store.values.write().extend(snapshot.values);
        store
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, entity: EntityType, id: RecordId) -> StorageResult<Option<LocalRecord>> {
        Ok(self.table(entity).read().get(&id).cloned())
    }

    fn list(&self, entity: EntityType) -> StorageResult<Vec<LocalRecord>> {
        Ok(self.table(entity).read().rows().cloned().collect())
    }

    fn updated_since(&self, entity: EntityType, after: Timestamp) -> StorageResult<Vec<LocalRecord>> {
        Ok(self
            .table(entity)
            .read()
            .rows()
            .filter(|row| row.envelope.updated_at > after)
            .cloned()
            .collect())
    }

    fn unsynced(&self, entity: EntityType) -> StorageResult<Vec<LocalRecord>> {
        Ok(self
            .table(entity)
            .read()
            .rows()
            .filter(|row| !row.is_synced)
            .cloned()
            .collect())
    }

    fn put_local(&self, record: LocalRecord) -> StorageResult<()> {
        self.table(record.envelope.entity).write().put_local(record);
        Ok(())
    }

    fn merge_remote(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> StorageResult<MergeStats> {
        if records.is_empty() {
            return Ok(MergeStats::default());
        }
        Ok(self.table(entity).write().merge_remote(records))
    }

    fn mark_synced(
        &self,
        entity: EntityType,
        id: RecordId,
        pushed_at: Timestamp,
        updated_at: Timestamp,
    ) -> StorageResult<bool> {
        Ok(self
            .table(entity)
            .write()
            .mark_synced(&id, pushed_at, updated_at))
    }

    fn refresh_payload(
        &self,
        entity: EntityType,
        id: RecordId,
        updated_at: Timestamp,
        payload: Vec<u8>,
    ) -> StorageResult<bool> {
        Ok(self
            .table(entity)
            .write()
            .refresh_payload(&id, updated_at, payload))
    }

    fn delete(&self, entity: EntityType, id: RecordId) -> StorageResult<bool> {
        Ok(self.table(entity).write().delete(&id))
    }

    fn delete_with_intent(&self, intent: PendingDeletionIntent) -> StorageResult<bool> {
        // Lock order: table, then intents.
        let mut table = self.table(intent.entity).write();
        let mut intents = self.intents.write();

        intents.insert((intent.entity, intent.id), intent);
        table.record_tombstone(intent.id, intent.timestamp);
        Ok(table.delete(&intent.id))
    }

    fn apply_tombstone(&self, entity: EntityType, id: RecordId, at: Timestamp) -> StorageResult<bool> {
        Ok(self.table(entity).write().apply_tombstone(id, at))
    }

    fn prune_tombstones(&self, before: Timestamp) -> StorageResult<usize> {
        Ok(self
            .tables
            .iter()
            .map(|table| table.write().prune_tombstones(before))
            .sum())
    }

    fn pending_deletions(&self, entity: Option<EntityType>) -> StorageResult<Vec<PendingDeletionIntent>> {
        Ok(self
            .intents
            .read()
            .values()
            .filter(|intent| entity.map_or(true, |e| intent.entity == e))
            .copied()
            .collect())
    }

    fn clear_deletion_intent(&self, entity: EntityType, id: RecordId) -> StorageResult<()> {
        self.intents.write().remove(&(entity, id));
        Ok(())
    }

    fn clear(&self, entity: EntityType) -> StorageResult<()> {
        self.table(entity).write().clear();
        Ok(())
    }

    fn get_value(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn put_value(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove_value(&self, key: &str) -> StorageResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
