//! The local store trait.

use crate::error::StorageResult;
use edusync_protocol::{
    EntityType, PendingDeletionIntent, RecordEnvelope, RecordId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// A row of a local entity table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// The record as last written locally or fetched.
    pub envelope: RecordEnvelope,
    /// False while a local mutation has not been confirmed by the backend.
    pub is_synced: bool,
}

impl LocalRecord {
    /// A row confirmed by the backend.
    pub fn synced(envelope: RecordEnvelope) -> Self {
        Self {
            envelope,
            is_synced: true,
        }
    }

    /// A row written locally and not yet pushed.
    pub fn dirty(envelope: RecordEnvelope) -> Self {
        Self {
            envelope,
            is_synced: false,
        }
    }
}

/// Counts reported by [`LocalStore::merge_remote`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows inserted or replaced.
    pub applied: usize,
    /// Incoming records older than the local row.
    pub kept_local: usize,
    /// Incoming records refused because a tombstone covers them.
    pub tombstoned: usize,
}

/// The local mirror of the remote store.
///
/// The store owns one table per entity type, the outbox of pending deletion
/// intents, the tombstone marks applied per table, and a small key-value
/// area for scalars such as the sync watermark and the cached identity.
///
/// # Invariants
///
/// - `merge_remote` and `apply_tombstone` on the same entity are linearizable:
///   a record covered by a tombstone is never present after both complete,
///   whatever their order.
/// - `delete_with_intent` removes the row and records the intent atomically.
/// - Implementations must be `Send + Sync`; different entity tables must not
///   block each other.
pub trait LocalStore: Send + Sync {
    /// Returns a row by id.
    fn get(&self, entity: EntityType, id: RecordId) -> StorageResult<Option<LocalRecord>>;

    /// Returns every row of a table.
    fn list(&self, entity: EntityType) -> StorageResult<Vec<LocalRecord>>;

    /// Returns rows with `updated_at > after`.
    fn updated_since(&self, entity: EntityType, after: Timestamp) -> StorageResult<Vec<LocalRecord>>;

    /// Returns rows not yet confirmed by the backend.
    fn unsynced(&self, entity: EntityType) -> StorageResult<Vec<LocalRecord>>;

    /// Writes a row from the local mutation path, unconditionally.
    fn put_local(&self, record: LocalRecord) -> StorageResult<()>;

    /// Upserts fetched records with last-write-wins and the tombstone guard.
    fn merge_remote(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> StorageResult<MergeStats>;

    /// Flips a pushed row to synced if it was not edited since the push read
    /// it at `pushed_at`. Returns true if the row was flipped.
    fn mark_synced(
        &self,
        entity: EntityType,
        id: RecordId,
        pushed_at: Timestamp,
        updated_at: Timestamp,
    ) -> StorageResult<bool>;

    /// Replaces the payload of a row that still has `updated_at`, keeping
    /// its sync flag. Returns true if the row was rewritten.
    fn refresh_payload(
        &self,
        entity: EntityType,
        id: RecordId,
        updated_at: Timestamp,
        payload: Vec<u8>,
    ) -> StorageResult<bool>;

    /// Physically removes a row. Missing rows are not an error.
    fn delete(&self, entity: EntityType, id: RecordId) -> StorageResult<bool>;

    /// Removes a row and records a pending deletion intent atomically.
    fn delete_with_intent(&self, intent: PendingDeletionIntent) -> StorageResult<bool>;

    /// Applies a remote tombstone. Returns true if a row was removed.
    fn apply_tombstone(&self, entity: EntityType, id: RecordId, at: Timestamp) -> StorageResult<bool>;

    /// Drops tombstone marks older than `before` from every table and
    /// returns how many were dropped.
    ///
    /// Only safe once no fetch can return records at or below `before`.
    fn prune_tombstones(&self, before: Timestamp) -> StorageResult<usize>;

    /// Returns pending deletion intents, optionally for one entity type.
    fn pending_deletions(&self, entity: Option<EntityType>) -> StorageResult<Vec<PendingDeletionIntent>>;

    /// Clears a pending deletion intent once the backend confirmed it.
    fn clear_deletion_intent(&self, entity: EntityType, id: RecordId) -> StorageResult<()>;

    /// Wipes a table and its tombstone marks.
    fn clear(&self, entity: EntityType) -> StorageResult<()>;

    /// Reads a key-value cell.
    fn get_value(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes a key-value cell.
    fn put_value(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Removes a key-value cell.
    fn remove_value(&self, key: &str) -> StorageResult<()>;
}
