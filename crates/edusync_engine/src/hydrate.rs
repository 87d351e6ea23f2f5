//! Lookup of display names from the local reference tables.

use crate::records::{self, Class, Section, Subject, SyncRecord, Term, User};
use edusync_protocol::RecordId;
use edusync_storage::LocalStore;

/// Reads reference rows for hydration.
///
/// Every call reads the local store; nothing is cached, so records applied
/// after a reference table was refreshed in the same pass see the new names.
pub struct ReferenceLookup<'a> {
    store: &'a dyn LocalStore,
}

impl<'a> ReferenceLookup<'a> {
    /// Creates a lookup over a local store.
    pub fn new(store: &'a dyn LocalStore) -> Self {
        Self { store }
    }

    fn find<R: SyncRecord>(&self, id: RecordId) -> Option<R> {
        match records::load::<R>(self.store, id) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(entity = %R::ENTITY, %id, error = %e, "reference lookup failed");
                None
            }
        }
    }

    /// Returns the name of a class.
    pub fn class_name(&self, id: RecordId) -> Option<String> {
        self.find::<Class>(id).map(|c| c.name)
    }

    /// Returns the name of a section.
    pub fn section_name(&self, id: RecordId) -> Option<String> {
        self.find::<Section>(id).map(|s| s.name)
    }

    /// Returns the full name of a person.
    pub fn user_name(&self, id: RecordId) -> Option<String> {
        self.find::<User>(id).map(|u| u.full_name)
    }

    /// Returns the name of a subject.
    pub fn subject_name(&self, id: RecordId) -> Option<String> {
        self.find::<Subject>(id).map(|s| s.name)
    }

    /// Returns the name of a term.
    pub fn term_name(&self, id: RecordId) -> Option<String> {
        self.find::<Term>(id).map(|t| t.name)
    }
}
