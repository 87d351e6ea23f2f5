//! Deletion intents and the remote deletion log.

use crate::types::{EntityType, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// A local outbox row recorded at the moment of a local delete.
///
/// Cleared once the matching tombstone is durably recorded remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeletionIntent {
    /// Deleted record id.
    pub id: RecordId,
    /// Entity type of the deleted record.
    pub entity: EntityType,
    /// Device time of the delete.
    pub timestamp: Timestamp,
}

impl PendingDeletionIntent {
    /// Creates a new intent.
    pub fn new(entity: EntityType, id: RecordId, timestamp: Timestamp) -> Self {
        Self {
            id,
            entity,
            timestamp,
        }
    }
}

/// An entry of the remote, append-only deletion log.
///
/// `entity_type` is kept as the raw wire name: a log written by a newer
/// client may name types this client does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionLogEntry {
    /// Deleted record id.
    pub record_id: RecordId,
    /// Wire name of the entity type.
    pub entity_type: String,
    /// Authority time at which the tombstone was recorded.
    pub timestamp: Timestamp,
}

impl DeletionLogEntry {
    /// Creates a log entry for a known entity type.
    pub fn new(entity: EntityType, record_id: RecordId, timestamp: Timestamp) -> Self {
        Self {
            record_id,
            entity_type: entity.as_str().to_string(),
            timestamp,
        }
    }

    /// Parses the entity type, if it is known.
    pub fn entity(&self) -> Option<EntityType> {
        self.entity_type.parse().ok()
    }
}
