//! Reference tables: cohorts, sub-cohorts, people, subjects and terms.

use super::{impl_sync_fields, SyncRecord};
use crate::hydrate::ReferenceLookup;
use edusync_protocol::{EntityType, RecordId, RecordScope, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    /// Record id.
    pub id: RecordId,
    /// Display name.
    pub name: String,
    /// Grade level.
    pub grade: u8,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl Class {
    /// Creates an unsaved class.
    pub fn new(name: impl Into<String>, grade: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            grade,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for Class {
    const ENTITY: EntityType = EntityType::Classes;

    fn scope(&self) -> RecordScope {
        RecordScope::class(self.id)
    }
}

/// A sub-cohort of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Record id.
    pub id: RecordId,
    /// Parent class.
    pub class_id: RecordId,
    /// Display name.
    pub name: String,
    /// Hydrated from the class.
    #[serde(default)]
    pub class_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl Section {
    /// Creates an unsaved section.
    pub fn new(class_id: RecordId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            name: name.into(),
            class_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for Section {
    const ENTITY: EntityType = EntityType::Sections;

    fn scope(&self) -> RecordScope {
        RecordScope::class(self.class_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.class_name = refs.class_name(self.class_id);
    }
}

/// Role of a person in the school directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// School administrator.
    Admin,
    /// Teacher or other staff.
    Staff,
    /// Enrolled student.
    Member,
}

/// A person: administrator, staff or enrolled member.
///
/// Members carry their class; staff and administrators do not, which is
/// what puts them in the unscoped staff directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Record id, also the actor id of this person.
    pub id: RecordId,
    /// Full name.
    pub full_name: String,
    /// Directory role.
    pub role: UserRole,
    /// Enrolled class, members only.
    pub class_id: Option<RecordId>,
    /// Enrolled section, members only.
    pub section_id: Option<RecordId>,
    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,
    /// Hydrated from the class.
    #[serde(default)]
    pub class_name: Option<String>,
    /// Hydrated from the section.
    #[serde(default)]
    pub section_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl User {
    /// Creates an unsaved staff or admin directory entry.
    pub fn staff(full_name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.into(),
            role,
            class_id: None,
            section_id: None,
            email: None,
            class_name: None,
            section_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }

    /// Creates an unsaved member enrolled in a class.
    pub fn member(full_name: impl Into<String>, class_id: RecordId, section_id: Option<RecordId>) -> Self {
        Self {
            class_id: Some(class_id),
            section_id,
            ..Self::staff(full_name, UserRole::Member)
        }
    }
}

impl SyncRecord for User {
    const ENTITY: EntityType = EntityType::Users;

    fn scope(&self) -> RecordScope {
        RecordScope::owned(self.class_id, self.id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.class_name = self.class_id.and_then(|id| refs.class_name(id));
        self.section_name = self.section_id.and_then(|id| refs.section_name(id));
    }
}

/// A subject taught to a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Record id.
    pub id: RecordId,
    /// Class the subject is taught to.
    pub class_id: RecordId,
    /// Display name.
    pub name: String,
    /// Assigned teacher.
    pub teacher_id: Option<RecordId>,
    /// Hydrated from the class.
    #[serde(default)]
    pub class_name: Option<String>,
    /// Hydrated from the teacher.
    #[serde(default)]
    pub teacher_name: Option<String>,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl Subject {
    /// Creates an unsaved subject.
    pub fn new(class_id: RecordId, name: impl Into<String>, teacher_id: Option<RecordId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            class_id,
            name: name.into(),
            teacher_id,
            class_name: None,
            teacher_name: None,
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for Subject {
    const ENTITY: EntityType = EntityType::Subjects;

    fn scope(&self) -> RecordScope {
        RecordScope::class(self.class_id)
    }

    fn hydrate(&mut self, refs: &ReferenceLookup<'_>) {
        self.class_name = refs.class_name(self.class_id);
        self.teacher_name = self.teacher_id.and_then(|id| refs.user_name(id));
    }
}

/// An academic term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    /// Record id.
    pub id: RecordId,
    /// Display name.
    pub name: String,
    /// First day, ISO-8601 date.
    pub starts_on: String,
    /// Last day, ISO-8601 date.
    pub ends_on: String,
    /// Last accepted write.
    pub updated_at: Timestamp,
    /// Confirmed by the backend.
    #[serde(default)]
    pub is_synced: bool,
}

impl Term {
    /// Creates an unsaved term.
    pub fn new(name: impl Into<String>, starts_on: impl Into<String>, ends_on: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            starts_on: starts_on.into(),
            ends_on: ends_on.into(),
            updated_at: 0,
            is_synced: false,
        }
    }
}

impl SyncRecord for Term {
    const ENTITY: EntityType = EntityType::Terms;

    fn scope(&self) -> RecordScope {
        RecordScope::UNSCOPED
    }
}

impl_sync_fields!(Class, Section, User, Subject, Term);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_scope_names_class_and_self() {
        let class_id = Uuid::new_v4();
        let member = User::member("Asha", class_id, None);
        assert_eq!(member.role, UserRole::Member);
        assert_eq!(member.scope(), RecordScope::owned(Some(class_id), member.id));
    }

    #[test]
    fn staff_are_unscoped_by_class() {
        let teacher = User::staff("Mr. Okafor", UserRole::Staff);
        assert_eq!(teacher.scope().class_id, None);
        assert_eq!(teacher.scope().owner_id, Some(teacher.id));
    }

    #[test]
    fn class_scope_is_its_own_id() {
        let class = Class::new("Grade 4", 4);
        assert_eq!(class.scope(), RecordScope::class(class.id));
    }
}
