//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use edusync_backend::{BackendConfig, BackendError, ReferenceBackend};
use edusync_engine::records::to_envelope;
use edusync_engine::{
    Actor, Clock, ManualClock, RemoteBackend, RetryConfig, SyncConfig, SyncError, SyncResult,
    SyncRecord, SyncSession,
};
use edusync_protocol::{
    DeletionLogEntry, EntityType, PageToken, PushAck, RecordEnvelope, RecordId, RecordPage,
    RemoteFilter, Timestamp,
};
use edusync_storage::{LocalStore, MemoryStore};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Device and authority clocks start here.
pub const START: Timestamp = 1_000_000;

/// Longer than the freshness threshold of [`config`].
pub const STALE: i64 = 120_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> SyncConfig {
    SyncConfig::default()
        .with_freshness_threshold(Duration::from_secs(60))
        .with_page_size(3)
        .with_push_batch_size(2)
        .with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5))
                .without_jitter(),
        )
}

fn remote_error(error: BackendError) -> SyncError {
    if error.is_client_error() {
        SyncError::remote_fatal(error.to_string())
    } else {
        SyncError::remote_retryable(error.to_string())
    }
}

/// A device's view of the reference backend, with fault injection.
pub struct TestRemote {
    backend: ReferenceBackend,
    failing: Mutex<HashSet<EntityType>>,
    ignore_filters: AtomicBool,
    stale: Mutex<Vec<RecordEnvelope>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    pushes: AtomicUsize,
}

impl TestRemote {
    pub fn new(backend: ReferenceBackend) -> Self {
        Self {
            backend,
            failing: Mutex::new(HashSet::new()),
            ignore_filters: AtomicBool::new(false),
            stale: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            pushes: AtomicUsize::new(0),
        }
    }

    /// Makes every call touching `entity` fail with a retryable error.
    pub fn fail(&self, entity: EntityType) {
        self.failing.lock().insert(entity);
    }

    pub fn heal(&self, entity: EntityType) {
        self.failing.lock().remove(&entity);
    }

    /// Returns every record of the requested type, whatever the filter.
    pub fn ignore_filters(&self) {
        self.ignore_filters.store(true, Ordering::SeqCst);
    }

    /// Appends an outdated copy of a record to every fetch of its type,
    /// like a lagging read replica.
    pub fn serve_stale(&self, envelope: RecordEnvelope) {
        self.stale.lock().push(envelope);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.fetches.store(0, Ordering::SeqCst);
        self.pushes.store(0, Ordering::SeqCst);
    }

    async fn enter(&self, entity: Option<EntityType>) -> SyncResult<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if entity.is_some_and(|e| self.failing.lock().contains(&e)) {
            return Err(SyncError::remote_retryable("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for TestRemote {
    async fn fetch_updated_since(
        &self,
        entity: EntityType,
        after: Timestamp,
        filter: &RemoteFilter,
        page: Option<PageToken>,
        page_size: usize,
    ) -> SyncResult<RecordPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.enter(Some(entity)).await?;

        let filter = if self.ignore_filters.load(Ordering::SeqCst) {
            &RemoteFilter::All
        } else {
            filter
        };
        let mut result = self
            .backend
            .fetch_updated_since(entity, after, filter, page, page_size)
            .map_err(remote_error)?;

        if result.next.is_none() {
            result.records.extend(
                self.stale
                    .lock()
                    .iter()
                    .filter(|r| r.entity == entity)
                    .cloned(),
            );
        }
        Ok(result)
    }

    async fn push(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> SyncResult<PushAck> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.enter(Some(entity)).await?;
        self.backend.push(entity, records).map_err(remote_error)
    }

    async fn push_tombstone(&self, entity: EntityType, id: RecordId, timestamp: Timestamp) -> SyncResult<Timestamp> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.enter(Some(entity)).await?;
        self.backend
            .push_tombstone(entity, id, timestamp)
            .map_err(remote_error)
    }

    async fn fetch_tombstones_since(&self, after: Timestamp) -> SyncResult<Vec<DeletionLogEntry>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.enter(None).await?;
        self.backend
            .fetch_tombstones_since(after)
            .map_err(remote_error)
    }
}

/// One signed-in device.
pub struct Device {
    pub store: Arc<MemoryStore>,
    pub remote: Arc<TestRemote>,
    pub session: SyncSession,
}

impl Device {
    pub fn get<R: SyncRecord>(&self, id: RecordId) -> Option<R> {
        self.session.get::<R>(id).unwrap()
    }

    pub fn count(&self, entity: EntityType) -> usize {
        self.store.list(entity).unwrap().len()
    }
}

/// A backend of record, a shared clock, and any number of devices.
pub struct World {
    pub backend: ReferenceBackend,
    pub clock: Arc<ManualClock>,
}

impl World {
    pub fn new() -> Self {
        Self::starting_at(START)
    }

    pub fn starting_at(start: Timestamp) -> Self {
        init_tracing();
        Self {
            backend: ReferenceBackend::new(BackendConfig::new().with_logical_clock(start)),
            clock: Arc::new(ManualClock::new(start)),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now_millis()
    }

    /// Moves device time and the authority clock forward together.
    pub fn tick(&self, millis: i64) {
        self.clock.advance(millis);
        self.backend.advance_clock(self.clock.now_millis());
    }

    /// Writes a record as another client would, returning its stamp.
    pub fn publish<R: SyncRecord>(&self, record: &R) -> Timestamp {
        self.backend.seed(vec![to_envelope(record).unwrap()])[0]
    }

    pub fn remote(&self) -> Arc<TestRemote> {
        Arc::new(TestRemote::new(self.backend.clone()))
    }

    pub fn device(&self, actor: Actor) -> Device {
        self.device_with(actor, self.remote(), None)
    }

    pub fn device_with(
        &self,
        actor: Actor,
        remote: Arc<TestRemote>,
        network: Option<watch::Receiver<bool>>,
    ) -> Device {
        let store = Arc::new(MemoryStore::new());
        let mut builder = SyncSession::builder(store.clone(), remote.clone())
            .with_config(config())
            .with_clock(self.clock.clone());
        if let Some(network) = network {
            builder = builder.with_network(network);
        }
        let session = builder.login(actor).unwrap();
        Device {
            store,
            remote,
            session,
        }
    }
}
