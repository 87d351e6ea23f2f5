//! Identifiers, timestamps and the entity type catalogue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds since the Unix epoch.
///
/// Remote `updated_at` values are assigned by the backend of record; device
/// times come from the local clock. Both share this representation so they
/// can be compared directly when computing the sync watermark.
pub type Timestamp = i64;

/// Globally unique record identifier (unique per entity type).
pub type RecordId = uuid::Uuid;

/// Every entity type the client mirrors locally.
///
/// Each variant owns exactly one local table and one sync adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Cohort directory.
    Classes,
    /// Sub-cohort directory.
    Sections,
    /// Members, staff and administrators.
    Users,
    /// Subjects taught in a class.
    Subjects,
    /// Examination terms.
    Terms,
    /// Daily attendance marks.
    Attendance,
    /// Fee invoices and payments.
    Fees,
    /// Homework assignments.
    Homework,
    /// Announcements to everyone or to a cohort.
    Announcements,
    /// Leave applications.
    Leaves,
    /// Aggregate exam results.
    Results,
    /// Syllabus entries per subject.
    Syllabus,
    /// Study materials.
    Materials,
    /// Timetable slots.
    Timetable,
    /// Calendar events.
    Events,
}

impl EntityType {
    /// All entity types, reference tables first.
    pub const ALL: [EntityType; 15] = [
        EntityType::Classes,
        EntityType::Sections,
        EntityType::Users,
        EntityType::Subjects,
        EntityType::Terms,
        EntityType::Attendance,
        EntityType::Fees,
        EntityType::Homework,
        EntityType::Announcements,
        EntityType::Leaves,
        EntityType::Results,
        EntityType::Syllabus,
        EntityType::Materials,
        EntityType::Timetable,
        EntityType::Events,
    ];

    /// Returns the stable wire name of this entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Classes => "classes",
            EntityType::Sections => "sections",
            EntityType::Users => "users",
            EntityType::Subjects => "subjects",
            EntityType::Terms => "terms",
            EntityType::Attendance => "attendance",
            EntityType::Fees => "fees",
            EntityType::Homework => "homework",
            EntityType::Announcements => "announcements",
            EntityType::Leaves => "leaves",
            EntityType::Results => "results",
            EntityType::Syllabus => "syllabus",
            EntityType::Materials => "materials",
            EntityType::Timetable => "timetable",
            EntityType::Events => "events",
        }
    }

    /// Returns true for the cohort directories every other entity
    /// hydrates against.
    pub fn is_directory(&self) -> bool {
        matches!(self, EntityType::Classes | EntityType::Sections)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityType(pub String);

impl fmt::Display for UnknownEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown entity type: {}", self.0)
    }
}

impl std::error::Error for UnknownEntityType {}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|entity| entity.as_str() == s)
            .ok_or_else(|| UnknownEntityType(s.to_string()))
    }
}
