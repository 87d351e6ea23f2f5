//! Last-write-wins resolution and the tombstone tie-break.
//!
//! The backend of record is authoritative for `updated_at`, so comparing
//! timestamps is the only conflict resolution the client performs.

use crate::types::Timestamp;

/// Outcome of comparing an incoming remote record with the local row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Replace the local row with the incoming record.
    AcceptRemote,
    /// Keep the local row; the incoming record is older.
    KeepLocal,
}

/// Resolves an incoming record against the local row, if any.
///
/// Equal timestamps accept the incoming record so that re-applying the same
/// fetch is idempotent. A dirty local edit with a newer `updated_at` is kept
/// and will be pushed by the outbox.
pub fn resolve(local_updated_at: Option<Timestamp>, incoming_updated_at: Timestamp) -> Resolution {
    match local_updated_at {
        Some(local) if local > incoming_updated_at => Resolution::KeepLocal,
        _ => Resolution::AcceptRemote,
    }
}

/// Returns true if a tombstone recorded at `tombstone_at` deletes a record
/// version written at `record_updated_at`.
///
/// Tombstones win ties.
pub fn tombstone_covers(tombstone_at: Timestamp, record_updated_at: Timestamp) -> bool {
    tombstone_at >= record_updated_at
}
