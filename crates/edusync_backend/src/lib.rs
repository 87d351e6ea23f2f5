//! # EduSync Backend
//!
//! In-process reference backend of record for EduSync.
//!
//! This crate provides:
//! - One table per entity type, paged by `updated_at`
//! - Equality filters on the record scope fields
//! - An append-only deletion log
//! - An authority clock that stamps every accepted write
//!
//! # Architecture
//!
//! The backend never trusts client timestamps for records: pushes are
//! re-stamped with strictly increasing authority times, which is what
//! lets clients use a single `updated_at` watermark. Tombstones take the
//! later of the client's delete time and the authority clock.
//!
//! It is used by the engine's integration tests and by hosts that want a
//! local authority for demos.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod server;
mod tables;

pub use config::{AuthorityClock, BackendConfig};
pub use error::{BackendError, BackendResult};
pub use server::ReferenceBackend;
pub use tables::RecordTables;
