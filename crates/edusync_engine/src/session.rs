//! A signed-in sync session wiring every component together.

use crate::adapter::{AdapterRegistry, EntityJob};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::coordinator::{SyncCoordinator, SyncOutcome};
use crate::deletion::DeletionPropagator;
use crate::error::{SyncError, SyncResult};
use crate::identity::{Actor, SessionIdentity};
use crate::outbox::{OutboxWriter, PushWorker};
use crate::records::{self, SyncRecord};
use crate::remote::RemoteBackend;
use crate::scheduler::TokioJobScheduler;
use edusync_protocol::{EntityType, RecordId};
use edusync_storage::LocalStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Builds a [`SyncSession`].
pub struct SyncSessionBuilder {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteBackend>,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    network: Option<watch::Receiver<bool>>,
    adapters: Vec<Arc<dyn EntityJob>>,
}

impl SyncSessionBuilder {
    /// Sets the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the device clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the network availability signal push jobs wait on.
    ///
    /// Without it the network is assumed to be always available.
    pub fn with_network(mut self, network: watch::Receiver<bool>) -> Self {
        self.network = Some(network);
        self
    }

    /// Replaces the standard adapter of one entity type.
    pub fn with_adapter(mut self, adapter: Arc<dyn EntityJob>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Signs an actor in and starts the session.
    ///
    /// Must be called inside a tokio runtime.
    pub fn login(self, actor: Actor) -> SyncResult<SyncSession> {
        let session = self.build()?;
        session.identity.sign_in(actor)?;
        Ok(session)
    }

    /// Resumes the session of the actor cached in the local store.
    ///
    /// # Errors
    ///
    /// Returns `Identity` if nobody is signed in.
    pub fn resume(self) -> SyncResult<SyncSession> {
        let session = self.build()?;
        if session.identity.actor()?.is_none() {
            return Err(SyncError::Identity("no cached session".into()));
        }
        Ok(session)
    }

    fn build(self) -> SyncResult<SyncSession> {
        let Self {
            store,
            remote,
            config,
            clock,
            network,
            adapters,
        } = self;

        let (online, network) = match network {
            Some(network) => (None, network),
            None => {
                let (online, network) = watch::channel(true);
                (Some(online), network)
            }
        };

        let worker = Arc::new(PushWorker::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            config.push_batch_size,
        ));
        let scheduler = TokioJobScheduler::new(worker, network, config.retry.clone())?;

        let registry = adapters.into_iter().fold(
            AdapterRegistry::standard(Arc::clone(&store), Arc::clone(&remote), config.page_size),
            AdapterRegistry::with_adapter,
        );
        let registry = Arc::new(registry);

        let outbox = Arc::new(OutboxWriter::new(
            Arc::clone(&store),
            Arc::new(scheduler.clone()),
            Arc::clone(&clock),
            config.retry.initial_delay,
        ));
        let deletions = Arc::new(DeletionPropagator::new(
            Arc::clone(&store),
            remote,
            Arc::clone(&registry),
            Arc::clone(&outbox),
            Arc::clone(&clock),
        ));
        let identity = Arc::new(SessionIdentity::new(Arc::clone(&store)));
        let coordinator = SyncCoordinator::new(
            config,
            Arc::clone(&store),
            identity.clone(),
            registry,
            Arc::clone(&deletions),
            clock,
        );

        outbox.resume_pending()?;

        Ok(SyncSession {
            store,
            identity,
            coordinator,
            outbox,
            deletions,
            scheduler,
            _online: online,
        })
    }
}

/// A sync session for one signed-in actor.
///
/// Reads go straight to the local mirror; writes go through the outbox
/// and never wait on the network.
///
/// # Example
///
/// ```ignore
/// let session = SyncSession::builder(store, remote).login(actor)?;
/// let class = session.save(Class::new("Grade 4", 4))?;
/// session.sync_all(false).await?;
/// ```
pub struct SyncSession {
    store: Arc<dyn LocalStore>,
    identity: Arc<SessionIdentity>,
    coordinator: SyncCoordinator,
    outbox: Arc<OutboxWriter>,
    deletions: Arc<DeletionPropagator>,
    scheduler: TokioJobScheduler,
    _online: Option<watch::Sender<bool>>,
}

impl SyncSession {
    /// Starts building a session.
    pub fn builder(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteBackend>) -> SyncSessionBuilder {
        SyncSessionBuilder {
            store,
            remote,
            config: SyncConfig::default(),
            clock: Arc::new(SystemClock),
            network: None,
            adapters: Vec::new(),
        }
    }

    /// Returns the signed-in actor.
    pub fn actor(&self) -> SyncResult<Option<Actor>> {
        self.identity.actor()
    }

    /// Returns the coordinator.
    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Runs a sync pass. See [`SyncCoordinator::sync_all`].
    pub async fn sync_all(&self, force_refresh: bool) -> SyncResult<SyncOutcome> {
        self.coordinator.sync_all(force_refresh).await
    }

    /// Creates or updates a record. See [`OutboxWriter::save`].
    pub fn save<R: SyncRecord>(&self, record: R) -> SyncResult<R> {
        self.outbox.save(record)
    }

    /// Deletes a record of a known type.
    pub fn delete<R: SyncRecord>(&self, id: RecordId) -> SyncResult<bool> {
        self.deletions.delete_record::<R>(id)
    }

    /// Deletes a record by entity type.
    pub fn delete_entity(&self, entity: EntityType, id: RecordId) -> SyncResult<bool> {
        self.deletions.delete(id, entity)
    }

    /// Reads one record from the local mirror.
    pub fn get<R: SyncRecord>(&self, id: RecordId) -> SyncResult<Option<R>> {
        records::load(self.store.as_ref(), id)
    }

    /// Reads every record of a type from the local mirror.
    pub fn list<R: SyncRecord>(&self) -> SyncResult<Vec<R>> {
        records::load_all(self.store.as_ref())
    }

    /// Returns the number of push jobs queued or running.
    pub fn pending_pushes(&self) -> usize {
        self.scheduler.active_jobs()
    }

    /// Waits until every scheduled push has finished or given up.
    pub async fn wait_for_outbox(&self) {
        self.scheduler.wait_idle().await;
    }

    /// Clears the local mirror and signs the actor out.
    pub async fn logout(self) -> SyncResult<()> {
        self.coordinator.logout().await?;
        tracing::info!("logged out");
        Ok(())
    }
}
