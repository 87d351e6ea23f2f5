//! # EduSync Engine
//!
//! Offline-first sync engine for the school records mirror.
//!
//! This crate provides:
//! - A single-flight sync coordinator with a persisted watermark
//! - Role-scoped planning of per-entity fetch jobs
//! - One adapter per entity type, run concurrently stage by stage
//! - A local-first outbox with deduplicated background push jobs
//! - Tombstone-based deletion propagation
//!
//! ## Architecture
//!
//! Pulls and pushes are separate paths:
//! 1. [`SyncCoordinator::sync_all`] plans a pass from the signed-in actor's
//!    role, fetches every entity type updated after the watermark, applies
//!    remote deletions, and advances the watermark
//! 2. [`OutboxWriter::save`] writes locally and schedules a push job; the
//!    push job drains dirty rows and pending deletion intents
//!
//! ## Key Invariants
//!
//! - The watermark never decreases, except when a wiped store is detected
//! - A failed job never blocks or cancels its siblings
//! - A deleted record is never resurrected by a concurrent fetch
//! - Applying the same fetch twice leaves the same local state
//! - Only a failure to determine the current actor aborts a pass

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod clock;
mod config;
mod coordinator;
mod deletion;
mod error;
mod executor;
mod hydrate;
mod identity;
mod outbox;
mod planner;
pub mod records;
mod remote;
mod scheduler;
mod session;
mod watermark;

#[cfg(test)]
mod testing;

pub use adapter::{AdapterRegistry, EntityAdapter, EntityJob, JobOutcome, TableAdapter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{SkipReason, SyncCoordinator, SyncOutcome, SyncSummary};
pub use deletion::{DeletionPropagator, TombstoneReport};
pub use error::{SyncError, SyncResult};
pub use executor::{JobReport, ParallelJobExecutor, ScheduledJob, SyncJobResult};
pub use hydrate::ReferenceLookup;
pub use identity::{Actor, IdentityProvider, Role, SessionIdentity};
pub use outbox::{OutboxWriter, PushReport, PushWorker};
pub use planner::{JobGraph, JobKind, JobStage, PlannedJob, RoleSyncPlanner, ScopeFilter, SyncScope};
pub use records::{SyncFields, SyncRecord};
pub use remote::RemoteBackend;
pub use scheduler::{
    BackoffKind, BackoffPolicy, CollisionPolicy, DurableJobScheduler, JobConstraints, JobHandler,
    JobRequest, JobWork, TokioJobScheduler,
};
pub use session::{SyncSession, SyncSessionBuilder};
pub use watermark::{WatermarkReducer, WatermarkStore};
