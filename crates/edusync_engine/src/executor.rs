//! Concurrent execution of one stage of a job graph.

use crate::adapter::AdapterRegistry;
use crate::deletion::DeletionPropagator;
use crate::error::{SyncError, SyncResult};
use crate::planner::{JobKind, PlannedJob, ScopeFilter};
use edusync_protocol::{EntityType, RemoteFilter, Timestamp};
use edusync_storage::LocalStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::watch;

/// Result of one job.
#[derive(Debug)]
pub enum SyncJobResult {
    /// The fetch succeeded; carries the largest timestamp observed, if any.
    Success(Option<Timestamp>),
    /// The job failed; its entity type is retried on the next pass.
    Failure(SyncError),
}

impl SyncJobResult {
    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncJobResult::Success(_))
    }

    /// Returns the largest observed timestamp of a successful job.
    pub fn max_timestamp(&self) -> Option<Timestamp> {
        match self {
            SyncJobResult::Success(max) => *max,
            SyncJobResult::Failure(_) => None,
        }
    }
}

/// A planned job with the horizon it fetches from.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    /// The job.
    pub job: PlannedJob,
    /// Fetch records with `updated_at` greater than this.
    pub after: Timestamp,
}

/// What one job did.
#[derive(Debug)]
pub struct JobReport {
    /// Which job.
    pub kind: JobKind,
    /// Horizon it fetched from.
    pub after: Timestamp,
    /// Outcome.
    pub result: SyncJobResult,
    /// Records or log entries fetched.
    pub fetched: usize,
    /// Rows written or removed locally.
    pub applied: usize,
    /// A local write that failed after a successful fetch.
    pub local_error: Option<SyncError>,
}

impl JobReport {
    fn failed(kind: JobKind, after: Timestamp, error: SyncError) -> Self {
        Self {
            kind,
            after,
            result: SyncJobResult::Failure(error),
            fetched: 0,
            applied: 0,
            local_error: None,
        }
    }

    /// Returns true if the job must fetch from the same horizon again.
    pub fn needs_retry(&self) -> bool {
        !self.result.is_success() || self.local_error.is_some()
    }
}

struct JobContext {
    store: Arc<dyn LocalStore>,
    registry: Arc<AdapterRegistry>,
    propagator: Arc<DeletionPropagator>,
}

/// Runs the jobs of a stage as concurrent tokio tasks.
///
/// # Guarantees
///
/// - Every job of the group runs; `run_group` returns once all have ended
/// - A failed or panicked job never cancels or blocks its siblings
/// - A job waits only for the same-stage jobs named in its `after` list
#[derive(Clone)]
pub struct ParallelJobExecutor {
    context: Arc<JobContext>,
}

impl ParallelJobExecutor {
    /// Creates an executor.
    pub fn new(
        store: Arc<dyn LocalStore>,
        registry: Arc<AdapterRegistry>,
        propagator: Arc<DeletionPropagator>,
    ) -> Self {
        Self {
            context: Arc::new(JobContext {
                store,
                registry,
                propagator,
            }),
        }
    }

    /// Runs a group of jobs concurrently and collects their reports, in
    /// the order the jobs were given.
    pub async fn run_group(&self, jobs: Vec<ScheduledJob>) -> Vec<JobReport> {
        let mut finished_tx = HashMap::new();
        let mut finished_rx = HashMap::new();
        for scheduled in &jobs {
            let (tx, rx) = watch::channel(false);
            finished_tx.entry(scheduled.job.kind).or_insert(tx);
            finished_rx.entry(scheduled.job.kind).or_insert(rx);
        }

        let mut handles = Vec::with_capacity(jobs.len());
        for scheduled in jobs {
            let kind = scheduled.job.kind;
            let after = scheduled.after;
            let predecessors: Vec<_> = scheduled
                .job
                .after
                .iter()
                .filter_map(|k| finished_rx.get(k).cloned())
                .collect();
            let finished = finished_tx.remove(&kind);
            let context = Arc::clone(&self.context);

            let handle = tokio::spawn(async move {
                for mut predecessor in predecessors {
                    // A dropped sender means the predecessor ended abnormally.
                    let _ = predecessor.wait_for(|done| *done).await;
                }
                let report = context.run_job(scheduled).await;
                if let Some(finished) = finished {
                    finished.send_replace(true);
                }
                report
            });
            handles.push((kind, after, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (kind, after, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(job = %kind, error = %e, "job task ended abnormally");
                    reports.push(JobReport::failed(
                        kind,
                        after,
                        SyncError::JobAborted {
                            job: kind.name().to_string(),
                        },
                    ));
                }
            }
        }
        reports
    }
}

impl JobContext {
    async fn run_job(&self, scheduled: ScheduledJob) -> JobReport {
        let ScheduledJob { job, after } = scheduled;
        let kind = job.kind;

        let report = match kind {
            JobKind::Entity(entity) => self.run_entity(entity, &job.scope, after).await,
            JobKind::Tombstones => match self.propagator.consume_tombstones(after).await {
                // Replaying the log is idempotent, so it never advances the watermark.
                Ok(consumed) => JobReport {
                    kind,
                    after,
                    result: SyncJobResult::Success(None),
                    fetched: consumed.seen,
                    applied: consumed.removed,
                    local_error: None,
                },
                Err(e) => JobReport::failed(kind, after, e),
            },
        };

        match &report.result {
            SyncJobResult::Success(max) => tracing::debug!(
                job = %kind,
                after,
                fetched = report.fetched,
                applied = report.applied,
                max = ?max,
                "job finished"
            ),
            SyncJobResult::Failure(e) => tracing::warn!(job = %kind, after, error = %e, "job failed"),
        }
        report
    }

    async fn run_entity(&self, entity: EntityType, scope: &ScopeFilter, after: Timestamp) -> JobReport {
        let kind = JobKind::Entity(entity);
        let filters = match self.resolve(scope) {
            Ok(filters) => filters,
            Err(e) => return JobReport::failed(kind, after, e),
        };

        match self.registry.get(entity).run(after, &filters).await {
            Ok(outcome) => JobReport {
                kind,
                after,
                result: SyncJobResult::Success(outcome.max_seen),
                fetched: outcome.fetched,
                applied: outcome.stats.applied,
                local_error: outcome.local_error,
            },
            Err(e) => JobReport::failed(kind, after, e),
        }
    }

    fn resolve(&self, scope: &ScopeFilter) -> SyncResult<Vec<RemoteFilter>> {
        match scope {
            ScopeFilter::Global => Ok(vec![RemoteFilter::All]),
            ScopeFilter::AnyOf(filters) => Ok(filters.clone()),
            ScopeFilter::MembersOf(class_ids) => {
                let members: BTreeSet<_> = self
                    .store
                    .list(EntityType::Users)?
                    .into_iter()
                    .filter(|row| {
                        row.envelope
                            .scope
                            .class_id
                            .is_some_and(|class| class_ids.contains(&class))
                    })
                    .filter_map(|row| row.envelope.scope.owner_id)
                    .collect();
                Ok(members.into_iter().map(RemoteFilter::Owner).collect())
            }
        }
    }
}
