//! Durable, deduplicated background jobs.
//!
//! Pushes run outside of sync passes through a [`DurableJobScheduler`].
//! Requests are unique by name: at most one instance of a name is queued
//! and at most one is running. A request for a queued name replaces it; a
//! request for a running name appends a single re-run.
//!
//! Durability across restarts does not depend on the runner: the work a
//! push job does is fully described by the outbox rows, and
//! [`OutboxWriter::resume_pending`](crate::OutboxWriter::resume_pending)
//! re-schedules it at session start.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use edusync_protocol::EntityType;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// The work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobWork {
    /// Push the dirty rows and pending deletion intents of one entity type.
    PushOutbox(EntityType),
}

/// Conditions a job waits for before each attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobConstraints {
    /// Only run while the network is reachable.
    pub requires_network: bool,
}

/// Backoff curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// Delay grows geometrically.
    Exponential,
}

/// Backoff between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Curve.
    pub kind: BackoffKind,
    /// Lower bound on any retry delay.
    pub min_interval: Duration,
}

/// What happens when a request names an existing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Replace a queued instance, or append one re-run to a running one.
    AppendOrReplace,
}

/// A request to run a unique job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Unique name.
    pub name: String,
    /// Work to perform.
    pub work: JobWork,
    /// Run constraints.
    pub constraints: JobConstraints,
    /// Retry backoff.
    pub backoff: BackoffPolicy,
    /// Collision policy.
    pub collision: CollisionPolicy,
}

impl JobRequest {
    /// The outbox push job of an entity type.
    pub fn push_outbox(entity: EntityType, min_interval: Duration) -> Self {
        Self {
            name: format!("push-{entity}"),
            work: JobWork::PushOutbox(entity),
            constraints: JobConstraints {
                requires_network: true,
            },
            backoff: BackoffPolicy {
                kind: BackoffKind::Exponential,
                min_interval,
            },
            collision: CollisionPolicy::AppendOrReplace,
        }
    }
}

/// Schedules unique background jobs.
pub trait DurableJobScheduler: Send + Sync {
    /// Schedules a job, applying its collision policy to an existing one.
    fn schedule_unique(&self, request: JobRequest) -> SyncResult<()>;
}

/// Performs the work of a job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs one attempt.
    async fn run(&self, work: JobWork) -> SyncResult<()>;
}

enum Slot {
    Queued(JobRequest),
    Running { rerun: Option<JobRequest> },
}

struct Runner {
    handler: Arc<dyn JobHandler>,
    network: watch::Receiver<bool>,
    retry: RetryConfig,
    runtime: Handle,
    slots: Mutex<HashMap<String, Slot>>,
    active: watch::Sender<usize>,
}

/// Runs jobs as tokio tasks.
///
/// # Example
///
/// ```ignore
/// let (online, network) = tokio::sync::watch::channel(true);
/// let scheduler = TokioJobScheduler::new(worker, network, RetryConfig::default())?;
/// scheduler.schedule_unique(JobRequest::push_outbox(EntityType::Homework, Duration::from_secs(1)))?;
/// ```
#[derive(Clone)]
pub struct TokioJobScheduler {
    runner: Arc<Runner>,
}

impl TokioJobScheduler {
    /// Creates a scheduler on the current tokio runtime.
    ///
    /// `network` reports whether the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `Scheduler` when called outside a tokio runtime.
    pub fn new(
        handler: Arc<dyn JobHandler>,
        network: watch::Receiver<bool>,
        retry: RetryConfig,
    ) -> SyncResult<Self> {
        let runtime = Handle::try_current().map_err(|e| SyncError::Scheduler(e.to_string()))?;
        let (active, _) = watch::channel(0);
        Ok(Self {
            runner: Arc::new(Runner {
                handler,
                network,
                retry,
                runtime,
                slots: Mutex::new(HashMap::new()),
                active,
            }),
        })
    }

    /// Returns the number of job names queued or running.
    pub fn active_jobs(&self) -> usize {
        *self.runner.active.borrow()
    }

    /// Waits until no job is queued or running.
    pub async fn wait_idle(&self) {
        let mut active = self.runner.active.subscribe();
        // The sender lives as long as `self`.
        let _ = active.wait_for(|count| *count == 0).await;
    }
}

impl DurableJobScheduler for TokioJobScheduler {
    fn schedule_unique(&self, request: JobRequest) -> SyncResult<()> {
        let mut slots = self.runner.slots.lock();
        match slots.get_mut(&request.name) {
            Some(Slot::Queued(queued)) => {
                tracing::trace!(job = %request.name, "replacing queued job");
                *queued = request;
            }
            Some(Slot::Running { rerun }) => {
                tracing::trace!(job = %request.name, "appending re-run");
                *rerun = Some(request);
            }
            None => {
                let name = request.name.clone();
                slots.insert(name.clone(), Slot::Queued(request));
                self.runner.active.send_replace(slots.len());
                self.runner.runtime.spawn(Arc::clone(&self.runner).drive(name));
            }
        }
        Ok(())
    }
}

impl Runner {
    async fn drive(self: Arc<Self>, name: String) {
        loop {
            let request = {
                let mut slots = self.slots.lock();
                let Some(Slot::Queued(request)) = slots.remove(&name) else {
                    self.active.send_replace(slots.len());
                    return;
                };
                slots.insert(name.clone(), Slot::Running { rerun: None });
                request
            };

            self.execute(&request).await;

            let mut slots = self.slots.lock();
            let next = match slots.get_mut(&name) {
                Some(Slot::Running { rerun }) => rerun.take(),
                _ => None,
            };
            match next {
                Some(next) => {
                    slots.insert(name.clone(), Slot::Queued(next));
                }
                None => {
                    slots.remove(&name);
                    self.active.send_replace(slots.len());
                    return;
                }
            }
        }
    }

    async fn execute(&self, request: &JobRequest) {
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self
                    .retry
                    .delay_for_attempt(attempt)
                    .max(request.backoff.min_interval);
                tokio::time::sleep(delay).await;
            }
            if request.constraints.requires_network {
                self.wait_for_network().await;
            }

            // A panicking handler must not leave the slot stuck in `Running`.
            let handler = Arc::clone(&self.handler);
            let work = request.work;
            let outcome = match self.runtime.spawn(async move { handler.run(work).await }).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(job = %request.name, attempt, error = %e, "job attempt ended abnormally");
                    Err(SyncError::JobAborted {
                        job: request.name.clone(),
                    })
                }
            };

            match outcome {
                Ok(()) => {
                    tracing::debug!(job = %request.name, attempt, "job finished");
                    return;
                }
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    tracing::warn!(job = %request.name, attempt, error = %e, "job failed, retrying");
                }
                Err(e) => {
                    tracing::error!(job = %request.name, attempt, error = %e, "job gave up");
                    return;
                }
            }
        }
    }

    async fn wait_for_network(&self) {
        let mut network = self.network.clone();
        if network.wait_for(|online| *online).await.is_err() {
            tracing::warn!("network monitor closed, assuming online");
        }
    }
}
