//! Cohort-scoped teaching records.

use super::{impl_sync_fields, SyncRecord};
use crate::hydrate::ReferenceLookup;
use edusync_protocol::{EntityType, RecordId, RecordScope, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attendance mark for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// Present for the day.
    Present,
    /// Absent for the day.
    Absent,
    /// Arrived late.
    Late,
}

/// One member's attendance on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    /// Record id.
    pub id: RecordId,
    /// Class the attendance was taken in.
    pub class_id: RecordId,
    /// Member.
    pub student_id: RecordId,
    /// ISO-8601 date.
    pub date: String,
    /// Mark.
    pub status: AttendanceStatus,
    /// Hydrated from the member.
    #[serde(default)]
    pub student_name: Option<String>,
    /// Hydrated from the class.
    #[serde(default)]
    pub class_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl AttendanceEntry {
    /// Creates an unsaved attendance entry.
    pub fn new(class_id: RecordId, student_id: RecordId, date: impl Into<String>, status: AttendanceStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            student_id,
            date: date.into(),
            status,
            student_name: None,
            class_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for AttendanceEntry {
    const ENTITY: EntityType = EntityType::Attendance;

    fn scope(&self) -> RecordScope {
        RecordScope::owned(Some(self.class_id), self.student_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.student_name = refs.user_name(self.student_id);
        self.class_name = refs.class_name(self.class_id);
    }
}

/// A homework assignment for a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Homework {
    /// Record id.
    pub id: RecordId,
    /// Class the homework is set for.
    pub class_id: RecordId,
    /// Subject.
    pub subject_id: RecordId,
    /// Title.
    pub title: String,
    /// Instructions.
    pub details: String,
    /// ISO-8601 due date.
    #[serde(default)]
    pub due_on: Option<String>,
    /// Hydrated from the class.
    #[serde(default)]
    pub class_name: Option<String>,
    /// Hydrated from the subject.
    #[serde(default)]
    pub subject_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl Homework {
    /// Creates an unsaved assignment.
    pub fn new(class_id: RecordId, subject_id: RecordId, title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            subject_id,
            title: title.into(),
            details: details.into(),
            due_on: None,
            class_name: None,
            subject_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for Homework {
    const ENTITY: EntityType = EntityType::Homework;

    fn scope(&self) -> RecordScope {
        RecordScope::class(self.class_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.class_name = refs.class_name(self.class_id);
        self.subject_name = refs.subject_name(self.subject_id);
    }
}

/// A graded result for one member, subject and term.
///
/// Results aggregate every other reference table, so they sync last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    /// Record id.
    pub id: RecordId,
    /// Member.
    pub student_id: RecordId,
    /// Class at the time of grading.
    pub class_id: RecordId,
    /// Subject.
    pub subject_id: RecordId,
    /// Term.
    pub term_id: RecordId,
    /// Marks obtained.
    pub marks: u32,
    /// Maximum marks.
    pub max_marks: u32,
    /// Hydrated from the member.
    #[serde(default)]
    pub student_name: Option<String>,
    /// Hydrated from the subject.
    #[serde(default)]
    pub subject_name: Option<String>,
    /// Hydrated from the term.
    #[serde(default)]
    pub term_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl ExamResult {
    /// Creates an unsaved result.
    pub fn new(
        student_id: RecordId,
        class_id: RecordId,
        subject_id: RecordId,
        term_id: RecordId,
        marks: u32,
        max_marks: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            class_id,
            subject_id,
            term_id,
            marks,
            max_marks,
            student_name: None,
            subject_name: None,
            term_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for ExamResult {
    const ENTITY: EntityType = EntityType::Results;

    fn scope(&self) -> RecordScope {
        RecordScope::owned(Some(self.class_id), self.student_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.student_name = refs.user_name(self.student_id);
        self.subject_name = refs.subject_name(self.subject_id);
        self.term_name = refs.term_name(self.term_id);
    }
}

/// One unit of a subject's syllabus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllabusUnit {
    /// Record id.
    pub id: RecordId,
    /// Class.
    pub class_id: RecordId,
    /// Subject.
    pub subject_id: RecordId,
    /// Unit title.
    pub title: String,
    /// Position within the subject.
    pub position: u32,
    /// Hydrated from the subject.
    #[serde(default)]
    pub subject_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl SyllabusUnit {
    /// Creates an unsaved syllabus unit.
    pub fn new(class_id: RecordId, subject_id: RecordId, title: impl Into<String>, position: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            subject_id,
            title: title.into(),
            position,
            subject_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for SyllabusUnit {
    const ENTITY: EntityType = EntityType::Syllabus;

    fn scope(&self) -> RecordScope {
        RecordScope::class(self.class_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.subject_name = refs.subject_name(self.subject_id);
    }
}

/// Study material shared with a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Record id.
    pub id: RecordId,
    /// Class.
    pub class_id: RecordId,
    /// Subject.
    pub subject_id: RecordId,
    /// Title.
    pub title: String,
    /// Location of the uploaded file.
    pub url: String,
    /// Hydrated from the subject.
    #[serde(default)]
    pub subject_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl Material {
    /// Creates an unsaved material.
    pub fn new(class_id: RecordId, subject_id: RecordId, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            subject_id,
            title: title.into(),
            url: url.into(),
            subject_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for Material {
    const ENTITY: EntityType = EntityType::Materials;

    fn scope(&self) -> RecordScope {
        RecordScope::class(self.class_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.subject_name = refs.subject_name(self.subject_id);
    }
}

/// A weekly timetable period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimetableSlot {
    /// Record id.
    pub id: RecordId,
    /// Class.
    pub class_id: RecordId,
    /// Subject.
    pub subject_id: RecordId,
    /// Teacher taking the period.
    pub teacher_id: Option<RecordId>,
    /// Day of week, 1 = Monday.
    pub weekday: u8,
    /// Period number within the day.
    pub period: u8,
    /// Hydrated from the subject.
    #[serde(default)]
    pub subject_name: Option<String>,
    /// Hydrated from the teacher.
    #[serde(default)]
    pub teacher_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl TimetableSlot {
    /// Creates an unsaved slot.
    pub fn new(class_id: RecordId, subject_id: RecordId, weekday: u8, period: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            subject_id,
            teacher_id: None,
            weekday,
            period,
            subject_name: None,
            teacher_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for TimetableSlot {
    const ENTITY: EntityType = EntityType::Timetable;

    fn scope(&self) -> RecordScope {
        RecordScope::class(self.class_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.subject_name = refs.subject_name(self.subject_id);
        self.teacher_name = self.teacher_id.and_then(|id| refs.user_name(id));
    }
}

impl_sync_fields!(AttendanceEntry, Homework, ExamResult, SyllabusUnit, Material, TimetableSlot);
