//! # EduSync Storage
//!
//! The local mirror of the remote store.
//!
//! This crate provides the [`LocalStore`] capability the sync engine writes
//! through: one table per entity type, the outbox of pending deletion
//! intents, per-table tombstone marks and a small key-value area for the
//! sync watermark and the cached identity.
//!
//! ## Design Principles
//!
//! - Rows are opaque [`RecordEnvelope`](edusync_protocol::RecordEnvelope)s;
//!   the store never decodes domain payloads
//! - Last-write-wins and the tombstone guard are enforced under the table
//!   lock, never by callers
//! - Must be `Send + Sync`; each entity table has its own lock
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - Snapshot-on-write store that survives restarts
//!
//! ## Example
//!
//! ```rust
//! use edusync_protocol::{EntityType, RecordEnvelope, RecordScope};
//! use edusync_storage::{LocalStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let envelope = RecordEnvelope {
//!     entity: EntityType::Events,
//!     id: uuid::Uuid::new_v4(),
//!     updated_at: 10,
//!     scope: RecordScope::UNSCOPED,
//!     payload: Vec::new(),
//! };
//! let stats = store.merge_remote(EntityType::Events, vec![envelope]).unwrap();
//! assert_eq!(stats.applied, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;
mod table;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{LocalRecord, LocalStore, MergeStats};
