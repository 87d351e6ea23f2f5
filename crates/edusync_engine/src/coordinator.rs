//! The single-flight sync coordinator.

use crate::adapter::AdapterRegistry;
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::deletion::DeletionPropagator;
use crate::error::{SyncError, SyncResult};
use crate::executor::{JobReport, ParallelJobExecutor, ScheduledJob};
use crate::identity::IdentityProvider;
use crate::planner::{JobKind, RoleSyncPlanner};
use crate::records;
use crate::watermark::{WatermarkReducer, WatermarkStore};
use edusync_protocol::{EntityType, Timestamp};
use edusync_storage::LocalStore;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Why a pass did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass was already running.
    InFlight,
    /// The watermark is within the freshness threshold.
    Fresh,
}

/// What a pass did.
#[derive(Debug)]
pub struct SyncSummary {
    /// True if the pass started from horizon zero.
    pub first_sync: bool,
    /// Horizon the pass planned with.
    pub horizon: Timestamp,
    /// Watermark persisted at the end of the pass.
    pub watermark: Timestamp,
    /// Reports of every job, stage by stage.
    pub reports: Vec<JobReport>,
}

impl SyncSummary {
    /// Jobs that will fetch from their old horizon on the next pass.
    pub fn retried(&self) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(|report| report.needs_retry())
    }

    /// Returns the report of a job, if it ran.
    pub fn report(&self, kind: JobKind) -> Option<&JobReport> {
        self.reports.iter().find(|report| report.kind == kind)
    }
}

/// Result of [`SyncCoordinator::sync_all`].
#[derive(Debug)]
pub enum SyncOutcome {
    /// No pass ran.
    Skipped(SkipReason),
    /// A pass ran to completion, possibly with failed jobs.
    Completed(SyncSummary),
}

impl SyncOutcome {
    /// Returns the summary of a completed pass.
    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            SyncOutcome::Completed(summary) => Some(summary),
            SyncOutcome::Skipped(_) => None,
        }
    }
}

/// A lock-guarded "pass in progress" flag.
#[derive(Debug, Default)]
struct SingleFlight {
    running: Mutex<bool>,
}

impl SingleFlight {
    fn try_begin(&self) -> Option<FlightGuard<'_>> {
        let mut running = self.running.lock();
        if *running {
            return None;
        }
        *running = true;
        Some(FlightGuard { flight: self })
    }

    fn is_running(&self) -> bool {
        *self.running.lock()
    }
}

struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        *self.flight.running.lock() = false;
    }
}

/// Top-level entry point of the pull side.
///
/// # Pass lifecycle
///
/// 1. A concurrent call returns [`SkipReason::InFlight`] without work
/// 2. The current actor is resolved; failure aborts the pass
/// 3. If the watermark is set but the actor's own user row is missing,
///    the local store was wiped: the watermark is reset to zero
/// 4. Unless forced, a watermark younger than the freshness threshold
///    skips the pass
/// 5. The role plan runs stage by stage; each job fetches from
///    `min(retry floor, horizon)`
/// 6. Local rows that copy names from a reference table changed in this
///    pass are re-hydrated
/// 7. The new watermark `max(prior, device time at start, max seen)` is
///    persisted, and retry floors are updated
/// 8. Tombstone marks below every horizon a later pass can fetch from are
///    pruned
pub struct SyncCoordinator {
    config: SyncConfig,
    store: Arc<dyn LocalStore>,
    identity: Arc<dyn IdentityProvider>,
    registry: Arc<AdapterRegistry>,
    executor: ParallelJobExecutor,
    watermarks: WatermarkStore,
    clock: Arc<dyn Clock>,
    flight: SingleFlight,
}

impl SyncCoordinator {
    /// Creates a coordinator.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        identity: Arc<dyn IdentityProvider>,
        registry: Arc<AdapterRegistry>,
        propagator: Arc<DeletionPropagator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let executor = ParallelJobExecutor::new(Arc::clone(&store), Arc::clone(&registry), propagator);
        Self {
            config,
            watermarks: WatermarkStore::new(Arc::clone(&store)),
            store,
            identity,
            registry,
            executor,
            clock,
            flight: SingleFlight::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the persisted watermark.
    pub fn watermark(&self) -> SyncResult<Timestamp> {
        self.watermarks.load()
    }

    /// Returns the retry floor of a job.
    pub fn retry_floor(&self, kind: JobKind) -> SyncResult<Option<Timestamp>> {
        self.watermarks.floor(kind)
    }

    /// Returns true while a pass is running.
    pub fn is_syncing(&self) -> bool {
        self.flight.is_running()
    }

    /// Runs one sync pass.
    ///
    /// Individual job failures do not fail the pass: they are logged,
    /// reported in the summary, and retried on the next pass.
    ///
    /// # Errors
    ///
    /// Returns an error, without touching the watermark, if the current
    /// actor cannot be determined or the watermark cannot be read.
    pub async fn sync_all(&self, force_refresh: bool) -> SyncResult<SyncOutcome> {
        let Some(_guard) = self.flight.try_begin() else {
            tracing::debug!("sync already in flight");
            return Ok(SyncOutcome::Skipped(SkipReason::InFlight));
        };

        let started_at = self.clock.now_millis();
        let actor = self.identity.current_actor().await?;
        let mut watermark = self.watermarks.load()?;

        if watermark != 0 && self.store.get(EntityType::Users, actor.id)?.is_none() {
            tracing::warn!(
                actor = %actor.id,
                watermark,
                "local store lost the signed-in user; starting over with a first sync"
            );
            self.watermarks.reset()?;
            self.watermarks.clear_floors()?;
            watermark = 0;
        }

        if !force_refresh && watermark != 0 && started_at - watermark < self.config.freshness_millis() {
            tracing::debug!(watermark, "local mirror is fresh");
            return Ok(SyncOutcome::Skipped(SkipReason::Fresh));
        }

        let first_sync = watermark == 0;
        let horizon = if first_sync { 0 } else { watermark + 1 };
        let graph = RoleSyncPlanner::plan(&actor, horizon, first_sync);
        tracing::info!(actor = %actor.id, horizon, first_sync, "sync pass started");

        let mut reports = Vec::new();
        for stage in graph.stages {
            let jobs = stage
                .jobs
                .into_iter()
                .map(|job| ScheduledJob {
                    after: self.job_horizon(job.kind, horizon),
                    job,
                })
                .collect();

            let stage_reports = self.executor.run_group(jobs).await;
            tracing::debug!(
                stage = stage.label,
                jobs = stage_reports.len(),
                failed = stage_reports.iter().filter(|r| r.needs_retry()).count(),
                "stage finished"
            );
            reports.extend(stage_reports);
        }

        self.refresh_display_fields(&reports).await;
        for report in &reports {
            self.update_floor(report);
        }

        let reduced = WatermarkReducer::reduce(reports.iter().map(|r| &r.result), started_at, watermark);
        let persisted = self.watermarks.persist(reduced)?;
        self.prune_tombstones(persisted);

        let summary = SyncSummary {
            first_sync,
            horizon,
            watermark: persisted,
            reports,
        };
        tracing::info!(
            watermark = persisted,
            jobs = summary.reports.len(),
            retried = summary.retried().count(),
            "sync pass finished"
        );
        Ok(SyncOutcome::Completed(summary))
    }

    /// Clears the local mirror: every entity table with its tombstone
    /// marks, pending deletion intents, retry floors and the watermark.
    ///
    /// # Errors
    ///
    /// Returns `InProgress` if a pass is running.
    pub async fn reset_local_state(&self) -> SyncResult<()> {
        let Some(_guard) = self.flight.try_begin() else {
            return Err(SyncError::InProgress);
        };

        for adapter in self.registry.iter() {
            adapter.clear_local().await?;
        }
        for intent in self.store.pending_deletions(None)? {
            self.store.clear_deletion_intent(intent.entity, intent.id)?;
        }
        self.watermarks.clear_floors()?;
        self.watermarks.reset()?;

        tracing::info!("local sync state cleared");
        Ok(())
    }

    /// Clears the local mirror and forgets the signed-in actor.
    pub async fn logout(&self) -> SyncResult<()> {
        self.reset_local_state().await?;
        self.identity.forget_actor().await
    }

    fn job_horizon(&self, kind: JobKind, horizon: Timestamp) -> Timestamp {
        match self.watermarks.floor(kind) {
            Ok(Some(floor)) => floor.min(horizon),
            Ok(None) => horizon,
            Err(e) => {
                tracing::warn!(job = %kind, error = %e, "could not read retry floor");
                horizon
            }
        }
    }

    async fn refresh_display_fields(&self, reports: &[JobReport]) {
        let changed: BTreeSet<EntityType> = reports
            .iter()
            .filter(|report| report.applied > 0)
            .filter_map(|report| match report.kind {
                JobKind::Entity(entity) => Some(entity),
                JobKind::Tombstones => None,
            })
            .collect();
        if changed.is_empty() {
            return;
        }

        for entity in EntityType::ALL {
            if !records::references(entity).iter().any(|r| changed.contains(r)) {
                continue;
            }
            if let Err(e) = self.registry.get(entity).rehydrate_local().await {
                tracing::warn!(%entity, error = %e, "could not refresh display fields");
            }
        }
    }

    /// The adapters drop fetched records at or below their horizon, so a
    /// mark older than the watermark and every retry floor can no longer
    /// shield anything.
    fn prune_tombstones(&self, watermark: Timestamp) {
        let mut before = watermark;
        for kind in JobKind::all() {
            match self.watermarks.floor(kind) {
                Ok(Some(floor)) => before = before.min(floor),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(job = %kind, error = %e, "could not read retry floor, keeping tombstone marks");
                    return;
                }
            }
        }

        match self.store.prune_tombstones(before) {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(pruned, before, "pruned tombstone marks"),
            Err(e) => tracing::warn!(error = %e, "could not prune tombstone marks"),
        }
    }

    fn update_floor(&self, report: &JobReport) {
        let result = if report.needs_retry() {
            self.watermarks.lower_floor(report.kind, report.after).map(|_| ())
        } else {
            self.watermarks.clear_floor(report.kind)
        };
        if let Err(e) = result {
            tracing::warn!(job = %report.kind, error = %e, "could not update retry floor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::{Actor, Role, SessionIdentity};
    use crate::outbox::OutboxWriter;
    use crate::records::{to_envelope, Class, Homework, SyncFields, SyncRecord, User, UserRole};
    use crate::testing::{MemoryRemote, RecordingScheduler};
    use edusync_protocol::{DeletionLogEntry, PendingDeletionIntent, RecordEnvelope, RecordId};
    use edusync_storage::{LocalRecord, MemoryStore, MergeStats, StorageError, StorageResult};
    use std::io;
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        remote: Arc<MemoryRemote>,
        identity: Arc<SessionIdentity>,
        clock: Arc<ManualClock>,
        coordinator: SyncCoordinator,
    }

    /// Fails the next `merge_remote` of one entity type.
    struct FlakyStore {
        inner: Arc<MemoryStore>,
        fail_merge: Mutex<Option<EntityType>>,
    }

    impl FlakyStore {
        fn fail_next_merge(&self, entity: EntityType) {
            *self.fail_merge.lock() = Some(entity);
        }
    }

    impl LocalStore for FlakyStore {
        fn get(&self, entity: EntityType, id: RecordId) -> StorageResult<Option<LocalRecord>> {
            self.inner.get(entity, id)
        }

        fn list(&self, entity: EntityType) -> StorageResult<Vec<LocalRecord>> {
            self.inner.list(entity)
        }

        fn updated_since(&self, entity: EntityType, after: Timestamp) -> StorageResult<Vec<LocalRecord>> {
            self.inner.updated_since(entity, after)
        }

        fn unsynced(&self, entity: EntityType) -> StorageResult<Vec<LocalRecord>> {
            self.inner.unsynced(entity)
        }

        fn put_local(&self, record: LocalRecord) -> StorageResult<()> {
            self.inner.put_local(record)
        }

        fn merge_remote(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> StorageResult<MergeStats> {
            let mut fail = self.fail_merge.lock();
            if *fail == Some(entity) {
                *fail = None;
                return Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
            }
            drop(fail);
            self.inner.merge_remote(entity, records)
        }

        fn mark_synced(
            &self,
            entity: EntityType,
            id: RecordId,
            pushed_at: Timestamp,
            updated_at: Timestamp,
        ) -> StorageResult<bool> {
            self.inner.mark_synced(entity, id, pushed_at, updated_at)
        }

        fn refresh_payload(
            &self,
            entity: EntityType,
            id: RecordId,
            updated_at: Timestamp,
            payload: Vec<u8>,
        ) -> StorageResult<bool> {
            self.inner.refresh_payload(entity, id, updated_at, payload)
        }

        fn delete(&self, entity: EntityType, id: RecordId) -> StorageResult<bool> {
            self.inner.delete(entity, id)
        }

        fn delete_with_intent(&self, intent: PendingDeletionIntent) -> StorageResult<bool> {
            self.inner.delete_with_intent(intent)
        }

        fn apply_tombstone(&self, entity: EntityType, id: RecordId, at: Timestamp) -> StorageResult<bool> {
            self.inner.apply_tombstone(entity, id, at)
        }

        fn prune_tombstones(&self, before: Timestamp) -> StorageResult<usize> {
            self.inner.prune_tombstones(before)
        }

        fn pending_deletions(&self, entity: Option<EntityType>) -> StorageResult<Vec<PendingDeletionIntent>> {
            self.inner.pending_deletions(entity)
        }

        fn clear_deletion_intent(&self, entity: EntityType, id: RecordId) -> StorageResult<()> {
            self.inner.clear_deletion_intent(entity, id)
        }

        fn clear(&self, entity: EntityType) -> StorageResult<()> {
            self.inner.clear(entity)
        }

        fn get_value(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get_value(key)
        }

        fn put_value(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
            self.inner.put_value(key, value)
        }

        fn remove_value(&self, key: &str) -> StorageResult<()> {
            self.inner.remove_value(key)
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|store| store)
    }

    /// Builds the components on top of `wrap(store)`; `Fixture::store`
    /// stays the bare store for inspection.
    fn fixture_with(wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn LocalStore>) -> Fixture {
        let memory = Arc::new(MemoryStore::new());
        let store = wrap(memory.clone());
        let remote = Arc::new(MemoryRemote::new());
        remote.set_clock(10_000);
        let identity = Arc::new(SessionIdentity::new(store.clone()));
        let clock = Arc::new(ManualClock::new(1_000_000));
        let registry = Arc::new(AdapterRegistry::standard(store.clone(), remote.clone(), 50));
        let outbox = Arc::new(OutboxWriter::new(
            store.clone(),
            Arc::new(RecordingScheduler::default()),
            clock.clone(),
            Duration::from_millis(1),
        ));
        let propagator = Arc::new(DeletionPropagator::new(
            store.clone(),
            remote.clone(),
            Arc::clone(&registry),
            outbox,
            clock.clone(),
        ));
        let coordinator = SyncCoordinator::new(
            SyncConfig::default().with_freshness_threshold(Duration::from_secs(60)),
            store,
            identity.clone(),
            registry,
            propagator,
            clock.clone(),
        );
        Fixture {
            store: memory,
            remote,
            identity,
            clock,
            coordinator,
        }
    }

    fn publish<R: SyncRecord>(remote: &MemoryRemote, record: &R) -> Timestamp {
        remote.insert(to_envelope(record).unwrap())
    }

    /// Signs in an administrator whose user row exists remotely.
    fn sign_in_admin(f: &Fixture) -> User {
        let admin = User::staff("Principal", UserRole::Admin);
        publish(&f.remote, &admin);
        f.identity
            .sign_in(Actor::new(admin.id(), Role::Admin))
            .unwrap();
        admin
    }

    fn completed(outcome: SyncOutcome) -> SyncSummary {
        match outcome {
            SyncOutcome::Completed(summary) => summary,
            SyncOutcome::Skipped(reason) => panic!("pass skipped: {reason:?}"),
        }
    }

    #[tokio::test]
    async fn first_sync_pulls_everything_and_persists_watermark() {
        let f = fixture();
        sign_in_admin(&f);
        let class = Class::new("Grade 5", 5);
        publish(&f.remote, &class);
        publish(&f.remote, &Homework::new(class.id, Uuid::new_v4(), "Fractions", ""));

        let summary = completed(f.coordinator.sync_all(false).await.unwrap());
        assert!(summary.first_sync);
        assert_eq!(summary.horizon, 0);
        assert!(summary.report(JobKind::Tombstones).is_none());
        assert_eq!(summary.retried().count(), 0);

        assert_eq!(f.store.count(EntityType::Classes), 1);
        let homework = f.store.list(EntityType::Homework).unwrap();
        assert_eq!(homework.len(), 1);
        assert_eq!(summary.watermark, 1_000_000);
        assert_eq!(f.coordinator.watermark().unwrap(), 1_000_000);
        assert!(!f.coordinator.is_syncing());
    }

    #[tokio::test]
    async fn missing_actor_aborts_without_touching_watermark() {
        let f = fixture();
        WatermarkStore::new(f.store.clone()).persist(700).unwrap();

        let result = f.coordinator.sync_all(true).await;
        assert!(matches!(result, Err(SyncError::Identity(_))));
        assert_eq!(f.coordinator.watermark().unwrap(), 700);
        assert!(!f.coordinator.is_syncing());
    }

    #[tokio::test]
    async fn in_flight_pass_coalesces_callers() {
        let f = fixture();
        sign_in_admin(&f);

        let guard = f.coordinator.flight.try_begin();
        assert!(guard.is_some());
        assert!(matches!(
            f.coordinator.sync_all(true).await.unwrap(),
            SyncOutcome::Skipped(SkipReason::InFlight)
        ));
        drop(guard);
        assert!(f.coordinator.sync_all(true).await.unwrap().summary().is_some());
    }

    #[tokio::test]
    async fn fresh_watermark_skips_unless_forced() {
        let f = fixture();
        sign_in_admin(&f);
        completed(f.coordinator.sync_all(false).await.unwrap());

        f.clock.advance(30_000);
        assert!(matches!(
            f.coordinator.sync_all(false).await.unwrap(),
            SyncOutcome::Skipped(SkipReason::Fresh)
        ));

        let forced = completed(f.coordinator.sync_all(true).await.unwrap());
        assert!(!forced.first_sync);
        assert_eq!(forced.horizon, 1_000_001);

        f.clock.advance(120_000);
        assert!(f.coordinator.sync_all(false).await.unwrap().summary().is_some());
    }

    #[tokio::test]
    async fn wiped_store_triggers_first_sync() {
        let f = fixture();
        sign_in_admin(&f);
        let old = Class::new("Grade 1", 1);
        publish(&f.remote, &old);
        WatermarkStore::new(f.store.clone()).persist(5_000_000).unwrap();

        let summary = completed(f.coordinator.sync_all(true).await.unwrap());
        assert!(summary.first_sync);
        assert_eq!(summary.horizon, 0);
        assert!(f.store.get(EntityType::Classes, old.id).unwrap().is_some());
        assert_eq!(summary.watermark, 1_000_000);
    }

    #[tokio::test]
    async fn failed_job_is_retried_from_its_floor() {
        let f = fixture();
        sign_in_admin(&f);
        completed(f.coordinator.sync_all(false).await.unwrap());

        f.remote.set_clock(1_050_000);
        let homework = Homework::new(Uuid::new_v4(), Uuid::new_v4(), "Essay", "");
        publish(&f.remote, &homework);
        f.remote.fail_entity(EntityType::Homework);
        f.clock.advance(120_000);

        let failed = completed(f.coordinator.sync_all(false).await.unwrap());
        let report = failed.report(JobKind::Entity(EntityType::Homework)).unwrap();
        assert!(report.needs_retry());
        assert_eq!(failed.watermark, 1_120_000);
        assert_eq!(
            f.coordinator
                .retry_floor(JobKind::Entity(EntityType::Homework))
                .unwrap(),
            Some(1_000_001)
        );

        f.remote.heal_entity(EntityType::Homework);
        f.clock.advance(120_000);
        let retried = completed(f.coordinator.sync_all(false).await.unwrap());
        let report = retried.report(JobKind::Entity(EntityType::Homework)).unwrap();
        assert_eq!(retried.horizon, 1_120_001);
        assert_eq!(report.after, 1_000_001);
        assert_eq!(report.result.max_timestamp(), Some(1_050_001));
        assert!(f.store.get(EntityType::Homework, homework.id).unwrap().is_some());
        assert_eq!(
            f.coordinator
                .retry_floor(JobKind::Entity(EntityType::Homework))
                .unwrap(),
            None
        );
        assert_eq!(retried.watermark, 1_240_000);
    }

    #[tokio::test]
    async fn failed_local_write_is_refetched_from_its_floor() {
        let flaky = Arc::new(Mutex::new(None::<Arc<FlakyStore>>));
        let slot = Arc::clone(&flaky);
        let f = fixture_with(move |inner| {
            let store = Arc::new(FlakyStore {
                inner,
                fail_merge: Mutex::new(None),
            });
            *slot.lock() = Some(Arc::clone(&store));
            store
        });
        let flaky = flaky.lock().clone().unwrap();
        sign_in_admin(&f);
        completed(f.coordinator.sync_all(false).await.unwrap());

        f.remote.set_clock(1_050_000);
        let homework = Homework::new(Uuid::new_v4(), Uuid::new_v4(), "Map work", "");
        publish(&f.remote, &homework);
        flaky.fail_next_merge(EntityType::Homework);
        f.clock.advance(120_000);

        let failed = completed(f.coordinator.sync_all(false).await.unwrap());
        let report = failed.report(JobKind::Entity(EntityType::Homework)).unwrap();
        // The fetch itself succeeded.
        assert_eq!(report.result.max_timestamp(), Some(1_050_001));
        assert!(matches!(report.local_error, Some(SyncError::LocalStorage(_))));
        assert!(report.needs_retry());
        assert_eq!(failed.watermark, 1_120_000);
        assert_eq!(
            f.coordinator
                .retry_floor(JobKind::Entity(EntityType::Homework))
                .unwrap(),
            Some(1_000_001)
        );
        assert!(f.store.get(EntityType::Homework, homework.id).unwrap().is_none());

        f.clock.advance(120_000);
        let retried = completed(f.coordinator.sync_all(false).await.unwrap());
        let report = retried.report(JobKind::Entity(EntityType::Homework)).unwrap();
        assert_eq!(report.after, 1_000_001);
        assert!(!report.needs_retry());
        assert!(f.store.get(EntityType::Homework, homework.id).unwrap().is_some());
        assert_eq!(
            f.coordinator
                .retry_floor(JobKind::Entity(EntityType::Homework))
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn tombstone_marks_are_kept_until_behind_watermark_and_floors() {
        let f = fixture();
        sign_in_admin(&f);
        let class = Class::new("Grade 8", 8);
        publish(&f.remote, &class);
        completed(f.coordinator.sync_all(false).await.unwrap());

        f.remote
            .log_deletion(DeletionLogEntry::new(EntityType::Classes, class.id, 1_050_000));
        f.remote.fail_entity(EntityType::Homework);
        f.clock.advance(120_000);
        let summary = completed(f.coordinator.sync_all(false).await.unwrap());
        assert_eq!(summary.watermark, 1_120_000);
        assert!(f.store.get(EntityType::Classes, class.id).unwrap().is_none());
        // The homework floor at 1_000_001 still covers the mark.
        assert_eq!(f.store.tombstone_count(EntityType::Classes), 1);

        f.remote.heal_entity(EntityType::Homework);
        f.clock.advance(120_000);
        completed(f.coordinator.sync_all(false).await.unwrap());
        assert_eq!(f.store.tombstone_count(EntityType::Classes), 0);

        f.clock.advance(120_000);
        completed(f.coordinator.sync_all(false).await.unwrap());
        assert_eq!(f.store.tombstone_count(EntityType::Classes), 0);
        assert!(f.store.get(EntityType::Classes, class.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_reference_job_leaves_names_for_the_next_pass() {
        let f = fixture();
        sign_in_admin(&f);
        let class = Class::new("Grade 2", 2);
        let homework = Homework::new(class.id, Uuid::new_v4(), "Counting", "");
        publish(&f.remote, &class);
        publish(&f.remote, &homework);
        f.remote.fail_entity(EntityType::Classes);

        completed(f.coordinator.sync_all(false).await.unwrap());
        let stored: Homework = records::load(f.store.as_ref(), homework.id).unwrap().unwrap();
        assert_eq!(stored.class_name, None);

        f.remote.heal_entity(EntityType::Classes);
        f.clock.advance(120_000);
        let summary = completed(f.coordinator.sync_all(false).await.unwrap());
        assert_eq!(
            summary.report(JobKind::Entity(EntityType::Homework)).unwrap().fetched,
            0
        );
        let stored: Homework = records::load(f.store.as_ref(), homework.id).unwrap().unwrap();
        assert_eq!(stored.class_name.as_deref(), Some("Grade 2"));
        assert!(stored.is_synced());
    }

    #[tokio::test]
    async fn tombstones_remove_rows_on_incremental_pass() {
        let f = fixture();
        sign_in_admin(&f);
        let class = Class::new("Grade 3", 3);
        publish(&f.remote, &class);
        completed(f.coordinator.sync_all(false).await.unwrap());
        assert!(f.store.get(EntityType::Classes, class.id).unwrap().is_some());

        f.remote
            .log_deletion(DeletionLogEntry::new(EntityType::Classes, class.id, 2_000_000));
        f.clock.advance(120_000);
        let summary = completed(f.coordinator.sync_all(false).await.unwrap());

        assert_eq!(summary.report(JobKind::Tombstones).unwrap().applied, 1);
        assert!(f.store.get(EntityType::Classes, class.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let f = fixture();
        sign_in_admin(&f);
        publish(&f.remote, &Class::new("Grade 4", 4));
        completed(f.coordinator.sync_all(false).await.unwrap());
        f.store
            .delete_with_intent(PendingDeletionIntent::new(
                EntityType::Events,
                Uuid::new_v4(),
                1,
            ))
            .unwrap();

        f.coordinator.logout().await.unwrap();
        assert_eq!(f.coordinator.watermark().unwrap(), 0);
        assert_eq!(f.store.count(EntityType::Classes), 0);
        assert_eq!(f.store.count(EntityType::Users), 0);
        assert!(f.store.pending_deletions(None).unwrap().is_empty());
        assert!(f.identity.actor().unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_refuses_while_syncing() {
        let f = fixture();
        let _guard = f.coordinator.flight.try_begin();
        assert!(matches!(
            f.coordinator.reset_local_state().await,
            Err(SyncError::InProgress)
        ));
    }
}
