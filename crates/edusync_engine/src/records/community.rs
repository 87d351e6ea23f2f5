//! Fees, notices, leave requests and school events.

use super::{impl_sync_fields, SyncRecord};
use crate::hydrate::ReferenceLookup;
use edusync_protocol::{EntityType, RecordId, RecordScope, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fee invoice issued to a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeInvoice {
    /// Record id.
    pub id: RecordId,
    /// Class of the member at issue time.
    pub class_id: RecordId,
    /// Member billed.
    pub student_id: RecordId,
    /// Amount in minor currency units.
    pub amount_minor: i64,
    /// Amount paid so far.
    #[serde(default)]
    pub paid_minor: i64,
    /// ISO-8601 due date.
    pub due_on: String,
    /// Hydrated from the member.
    #[serde(default)]
    pub student_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl FeeInvoice {
    /// Creates an unsaved invoice.
    pub fn new(class_id: RecordId, student_id: RecordId, amount_minor: i64, due_on: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            student_id,
            amount_minor,
            paid_minor: 0,
            due_on: due_on.into(),
            student_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }

    /// Returns the outstanding amount.
    pub fn outstanding_minor(&self) -> i64 {
        (self.amount_minor - self.paid_minor).max(0)
    }
}

impl SyncRecord for FeeInvoice {
    const ENTITY: EntityType = EntityType::Fees;

    fn scope(&self) -> RecordScope {
        RecordScope::owned(Some(self.class_id), self.student_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.student_name = refs.user_name(self.student_id);
    }
}

/// A notice for everyone or for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    /// Record id.
    pub id: RecordId,
    /// Target class, `None` for everyone.
    pub class_id: Option<RecordId>,
    /// Author.
    pub author_id: RecordId,
    /// Headline.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Hydrated from the author.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl Announcement {
    /// Creates an unsaved announcement.
    pub fn new(
        class_id: Option<RecordId>,
        author_id: RecordId,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            author_id,
            title: title.into(),
            body: body.into(),
            author_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for Announcement {
    const ENTITY: EntityType = EntityType::Announcements;

    fn scope(&self) -> RecordScope {
        RecordScope {
            class_id: self.class_id,
            owner_id: None,
        }
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.author_name = refs.user_name(self.author_id);
    }
}

/// Review state of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    /// Awaiting review.
    Pending,
    /// Approved.
    Approved,
    /// Rejected.
    Rejected,
}

/// A leave request filed by a person.
///
/// Leaves are keyed by applicant only, so staff see the leaves of their
/// classes by resolving the class members from the local directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    /// Record id.
    pub id: RecordId,
    /// Applicant.
    pub applicant_id: RecordId,
    /// First day, ISO-8601 date.
    pub starts_on: String,
    /// Last day, ISO-8601 date.
    pub ends_on: String,
    /// Reason given.
    pub reason: String,
    /// Review state.
    pub status: LeaveStatus,
    /// Hydrated from the applicant.
    #[serde(default)]
    pub applicant_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl LeaveRequest {
    /// Creates an unsaved, pending request.
    pub fn new(
        applicant_id: RecordId,
        starts_on: impl Into<String>,
        ends_on: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            applicant_id,
            starts_on: starts_on.into(),
            ends_on: ends_on.into(),
            reason: reason.into(),
            status: LeaveStatus::Pending,
            applicant_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for LeaveRequest {
    const ENTITY: EntityType = EntityType::Leaves;

    fn scope(&self) -> RecordScope {
        RecordScope::owned(None, self.applicant_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.applicant_name = refs.user_name(self.applicant_id);
    }
}

/// A school-wide calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolEvent {
    /// Record id.
    pub id: RecordId,
    /// Title.
    pub title: String,
    /// ISO-8601 date.
    pub date: String,
    /// Optional location.
    #[serde(default)]
    pub location: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl SchoolEvent {
    /// Creates an unsaved event.
    pub fn new(title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            date: date.into(),
            location: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for SchoolEvent {
    const ENTITY: EntityType = EntityType::Events;

    fn scope(&self) -> RecordScope {
        RecordScope::UNSCOPED
    }
}

impl_sync_fields!(FeeInvoice, Announcement, LeaveRequest, SchoolEvent);
