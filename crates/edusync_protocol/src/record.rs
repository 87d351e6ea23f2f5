//! Record envelopes, scope fields and remote filters.

use crate::types::{EntityType, RecordId, Timestamp};
use serde::{Deserialize, Serialize};

/// The scope fields of a record.
///
/// These are the only fields a backend may filter on besides `updated_at`.
/// `class_id = None` marks records that are not tied to a cohort (staff
/// directory entries, school-wide announcements, terms, events).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordScope {
    /// Cohort the record belongs to.
    pub class_id: Option<RecordId>,
    /// Member the record belongs to.
    pub owner_id: Option<RecordId>,
}

impl RecordScope {
    /// A record not tied to any cohort or owner.
    pub const UNSCOPED: RecordScope = RecordScope {
        class_id: None,
        owner_id: None,
    };

    /// Scope for a cohort-wide record.
    pub fn class(class_id: RecordId) -> Self {
        Self {
            class_id: Some(class_id),
            owner_id: None,
        }
    }

    /// Scope for a record owned by a member of a cohort.
    pub fn owned(class_id: Option<RecordId>, owner_id: RecordId) -> Self {
        Self {
            class_id,
            owner_id: Some(owner_id),
        }
    }
}

/// An equality filter on a record's scope fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteFilter {
    /// No scope restriction.
    All,
    /// Only records with no cohort.
    Unscoped,
    /// Only records of the given cohort.
    Class(RecordId),
    /// Only records owned by the given member.
    Owner(RecordId),
}

impl RemoteFilter {
    /// Returns true if a record with this scope passes the filter.
    pub fn matches(&self, scope: &RecordScope) -> bool {
        match self {
            RemoteFilter::All => true,
            RemoteFilter::Unscoped => scope.class_id.is_none(),
            RemoteFilter::Class(id) => scope.class_id == Some(*id),
            RemoteFilter::Owner(id) => scope.owner_id == Some(*id),
        }
    }
}

/// A record as it travels between the backend and the local store.
///
/// The domain fields are carried as an opaque CBOR payload; only the
/// identity, timestamp and scope are visible to storage and transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEnvelope {
    /// Entity type of the record.
    pub entity: EntityType,
    /// Record id.
    pub id: RecordId,
    /// Authority timestamp of the last accepted write.
    pub updated_at: Timestamp,
    /// Scope fields.
    pub scope: RecordScope,
    /// CBOR-encoded domain record.
    pub payload: Vec<u8>,
}

/// Opaque continuation token for paged fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken(pub u64);

/// One page of a `fetch_updated_since` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
    /// Records in this page, in no particular order.
    pub records: Vec<RecordEnvelope>,
    /// Token for the next page, `None` on the last page.
    pub next: Option<PageToken>,
}

impl RecordPage {
    /// Creates a final page.
    pub fn last(records: Vec<RecordEnvelope>) -> Self {
        Self {
            records,
            next: None,
        }
    }

    /// Returns the largest `updated_at` in this page.
    pub fn max_updated_at(&self) -> Option<Timestamp> {
        self.records.iter().map(|r| r.updated_at).max()
    }
}

/// Confirmation of one pushed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckedRecord {
    /// Record id.
    pub id: RecordId,
    /// The `updated_at` the client sent.
    pub pushed_at: Timestamp,
    /// The `updated_at` the authority assigned.
    pub updated_at: Timestamp,
}

/// Acknowledgement for a push batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushAck {
    /// Records the authority accepted.
    pub accepted: Vec<AckedRecord>,
}
