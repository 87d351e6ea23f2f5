//! Domain records of the mirrored entity types.
//!
//! Every entity type has one serde struct implementing [`SyncRecord`]. The
//! struct is stored as the CBOR payload of a [`RecordEnvelope`]; the
//! envelope carries the canonical `updated_at` and scope, and the local row
//! carries the canonical `is_synced` flag.
//!
//! Display fields (`class_name`, `student_name`, ...) are denormalized
//! copies of reference rows. They are `#[serde(default)]` and rewritten by
//! [`SyncRecord::hydrate`] every time a record is written locally.

mod academic;
mod community;
mod directory;

pub use academic::{AttendanceEntry, AttendanceStatus, ExamResult, Homework, Material, SyllabusUnit, TimetableSlot};
pub use community::{Announcement, FeeInvoice, LeaveRequest, LeaveStatus, SchoolEvent};
pub use directory::{Class, Section, Subject, Term, User, UserRole};

use crate::error::SyncResult;
use crate::hydrate::ReferenceLookup;
use edusync_protocol::{from_cbor, to_cbor, EntityType, RecordEnvelope, RecordId, RecordScope, Timestamp};
use edusync_storage::{LocalRecord, LocalStore};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Bookkeeping fields every mirrored record carries.
pub trait SyncFields {
    /// Record id.
    fn id(&self) -> RecordId;
    /// Authority timestamp of the last accepted write, or device time while dirty.
    fn updated_at(&self) -> Timestamp;
    /// False while a local mutation is not confirmed by the backend.
    fn is_synced(&self) -> bool;
    /// Overwrites the bookkeeping fields.
    fn set_sync_state(&mut self, updated_at: Timestamp, is_synced: bool);
}

macro_rules! impl_sync_fields {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::records::SyncFields for $ty {
                fn id(&self) -> edusync_protocol::RecordId {
                    self.id
                }

                fn updated_at(&self) -> edusync_protocol::Timestamp {
                    self.updated_at
                }

                fn is_synced(&self) -> bool {
                    self.is_synced
                }

                fn set_sync_state(&mut self, updated_at: edusync_protocol::Timestamp, is_synced: bool) {
                    self.updated_at = updated_at;
                    self.is_synced = is_synced;
                }
            }
        )+
    };
}
pub(crate) use impl_sync_fields;

/// A record type mirrored by the engine.
pub trait SyncRecord: SyncFields + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The entity type this record belongs to.
    const ENTITY: EntityType;

    /// Scope fields the backend filters on.
    fn scope(&self) -> RecordScope;

    /// Refreshes display fields from the local reference tables.
    fn hydrate(&mut self, _refs: &ReferenceLookup<'_>) {}
}

/// Returns the reference tables an entity type copies display names from
/// in [`SyncRecord::hydrate`].
pub fn references(entity: EntityType) -> &'static [EntityType] {
    match entity {
        EntityType::Classes | EntityType::Terms | EntityType::Events => &[],
        EntityType::Sections => &[EntityType::Classes],
        EntityType::Users => &[EntityType::Classes, EntityType::Sections],
        EntityType::Subjects => &[EntityType::Classes, EntityType::Users],
        EntityType::Attendance => &[EntityType::Classes, EntityType::Users],
        EntityType::Homework => &[EntityType::Classes, EntityType::Subjects],
        EntityType::Results => &[EntityType::Users, EntityType::Subjects, EntityType::Terms],
        EntityType::Syllabus | EntityType::Materials => &[EntityType::Subjects],
        EntityType::Timetable => &[EntityType::Subjects, EntityType::Users],
        EntityType::Fees | EntityType::Announcements | EntityType::Leaves => &[EntityType::Users],
    }
}

/// Wraps a record in an envelope.
pub fn to_envelope<R: SyncRecord>(record: &R) -> SyncResult<RecordEnvelope> {
    Ok(RecordEnvelope {
        entity: R::ENTITY,
        id: record.id(),
        updated_at: record.updated_at(),
        scope: record.scope(),
        payload: to_cbor(record)?,
    })
}

/// Decodes a fetched envelope as a synced record.
pub fn from_envelope<R: SyncRecord>(envelope: &RecordEnvelope) -> SyncResult<R> {
    let mut record: R = from_cbor(&envelope.payload)?;
    record.set_sync_state(envelope.updated_at, true);
    Ok(record)
}

/// Decodes a local row, taking bookkeeping fields from the row.
pub fn from_row<R: SyncRecord>(row: &LocalRecord) -> SyncResult<R> {
    let mut record: R = from_cbor(&row.envelope.payload)?;
    record.set_sync_state(row.envelope.updated_at, row.is_synced);
    Ok(record)
}

/// Reads one record from the local mirror.
pub fn load<R: SyncRecord>(store: &dyn LocalStore, id: RecordId) -> SyncResult<Option<R>> {
    store
        .get(R::ENTITY, id)?
        .map(|row| from_row(&row))
        .transpose()
}

/// Reads every record of a type from the local mirror.
pub fn load_all<R: SyncRecord>(store: &dyn LocalStore) -> SyncResult<Vec<R>> {
    store.list(R::ENTITY)?.iter().map(from_row).collect()
}
