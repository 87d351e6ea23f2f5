//! The backend of record, as seen by the engine.

use crate::error::SyncResult;
use async_trait::async_trait;
use edusync_protocol::{
    DeletionLogEntry, EntityType, PageToken, PushAck, RecordEnvelope, RecordId, RecordPage,
    RemoteFilter, Timestamp,
};

/// A paged, timestamp-filterable record source and sink.
///
/// This trait abstracts the wire layer, allowing for different backends
/// (HTTP, an in-process reference backend, fault-injecting test doubles).
///
/// # Contract
///
/// - `fetch_updated_since` returns records with `updated_at > after`
///   (strictly greater) matching `filter`, one page at a time.
/// - `push` upserts by id; the returned ack carries the authority timestamp
///   of every accepted record.
/// - `push_tombstone` is idempotent per record.
/// - `fetch_tombstones_since` returns deletion log entries with
///   `timestamp > after`.
///
/// Errors are reported as [`SyncError::Remote`](crate::SyncError::Remote).
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Fetches one page of records updated after `after`.
    async fn fetch_updated_since(
        &self,
        entity: EntityType,
        after: Timestamp,
        filter: &RemoteFilter,
        page: Option<PageToken>,
        page_size: usize,
    ) -> SyncResult<RecordPage>;

    /// Upserts a batch of records.
    async fn push(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> SyncResult<PushAck>;

    /// Records a tombstone and returns the timestamp it was logged at.
    async fn push_tombstone(
        &self,
        entity: EntityType,
        id: RecordId,
        timestamp: Timestamp,
    ) -> SyncResult<Timestamp>;

    /// Fetches deletion log entries recorded after `after`.
    async fn fetch_tombstones_since(&self, after: Timestamp) -> SyncResult<Vec<DeletionLogEntry>>;
}
