//! # EduSync Protocol
//!
//! Types shared by the EduSync client engine, the local store and the
//! backend of record.
//!
//! This crate provides:
//! - `EntityType`, `RecordId` and `Timestamp`
//! - `RecordEnvelope` with its `RecordScope` and the `RemoteFilter` equality filters
//! - `PendingDeletionIntent` and `DeletionLogEntry` for tombstone propagation
//! - CBOR payload encoding
//! - Last-write-wins and tombstone tie-break rules
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod conflict;
mod record;
mod tombstone;
mod types;

pub use codec::{from_cbor, to_cbor, CodecError, CodecResult};
pub use conflict::{resolve, tombstone_covers, Resolution};
pub use record::{
    AckedRecord, PageToken, PushAck, RecordEnvelope, RecordPage, RecordScope, RemoteFilter,
};
pub use tombstone::{DeletionLogEntry, PendingDeletionIntent};
pub use types::{EntityType, RecordId, Timestamp, UnknownEntityType};
