//! Role-scoped sync planning.
//!
//! The planner turns an actor into a declarative [`JobGraph`]: ordered
//! stages of entity jobs, each with the scope filters it fetches with and
//! the jobs of its own stage it must wait for. The graph is a plain value,
//! so plans can be checked without running anything.
//!
//! Every plan has the same three stages:
//!
//! 1. `directories`: cohorts and sub-cohorts, which everything else hydrates from
//! 2. `entities`: every other entity type plus the tombstone job
//! 3. `results`: the aggregate results type, alone
//!
//! Within a stage, a job waits for the jobs of the reference tables it
//! copies display names from, so hydration never reads a table that is
//! still being fetched.

use crate::identity::{Actor, Role};
use crate::records;
use edusync_protocol::{EntityType, RecordId, RemoteFilter, Timestamp};
use std::fmt;

/// What a sync pass covers, derived from the actor's role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every record.
    Global,
    /// The records of a set of classes plus school-wide records.
    Cohort {
        /// Assigned classes.
        class_ids: Vec<RecordId>,
    },
    /// The actor's own records plus their class's shared records.
    SelfScope {
        /// The actor.
        member_id: RecordId,
        /// Enrolled class.
        class_id: RecordId,
        /// Enrolled section.
        section_id: Option<RecordId>,
    },
}

impl SyncScope {
    /// Derives the scope of an actor.
    pub fn for_actor(actor: &Actor) -> Self {
        match &actor.role {
            Role::Admin => SyncScope::Global,
            Role::Staff { class_ids } => SyncScope::Cohort {
                class_ids: class_ids.clone(),
            },
            Role::Member {
                class_id,
                section_id,
            } => SyncScope::SelfScope {
                member_id: actor.id,
                class_id: *class_id,
                section_id: *section_id,
            },
        }
    }
}

/// Identifies a job within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    /// Fetch and apply one entity type.
    Entity(EntityType),
    /// Consume the remote deletion log.
    Tombstones,
}

impl JobKind {
    /// Stable name, used in logs and retry floor keys.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Entity(entity) => entity.as_str(),
            JobKind::Tombstones => "tombstones",
        }
    }

    /// Every job kind a plan can contain.
    pub fn all() -> impl Iterator<Item = JobKind> {
        EntityType::ALL
            .into_iter()
            .map(JobKind::Entity)
            .chain(std::iter::once(JobKind::Tombstones))
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The remote filters a job fetches with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter {
    /// No restriction.
    Global,
    /// Records matching any of the filters.
    AnyOf(Vec<RemoteFilter>),
    /// Records owned by the members of these classes, resolved from the
    /// local directory when the job starts.
    MembersOf(Vec<RecordId>),
}

impl ScopeFilter {
    fn classes(class_ids: &[RecordId]) -> Self {
        ScopeFilter::AnyOf(class_ids.iter().copied().map(RemoteFilter::Class).collect())
    }

    fn everyone_and(class_ids: &[RecordId]) -> Self {
        let mut filters = vec![RemoteFilter::Unscoped];
        filters.extend(class_ids.iter().copied().map(RemoteFilter::Class));
        ScopeFilter::AnyOf(filters)
    }
}

/// One job of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedJob {
    /// What the job does.
    pub kind: JobKind,
    /// Which records it fetches.
    pub scope: ScopeFilter,
    /// Jobs of the same stage that must finish first.
    pub after: Vec<JobKind>,
}

impl PlannedJob {
    fn new(kind: JobKind, scope: ScopeFilter) -> Self {
        Self {
            kind,
            scope,
            after: Vec::new(),
        }
    }

    fn entity(entity: EntityType, scope: ScopeFilter) -> Self {
        Self::new(JobKind::Entity(entity), scope)
    }

    fn waits_for(mut self, kind: JobKind) -> Self {
        self.after.push(kind);
        self
    }
}

/// A group of jobs that run concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStage {
    /// Stage name, for logs.
    pub label: &'static str,
    /// Jobs of the stage.
    pub jobs: Vec<PlannedJob>,
}

/// The ordered plan of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobGraph {
    /// Records with `updated_at` greater than this are fetched.
    pub horizon: Timestamp,
    /// Stages, run one after another.
    pub stages: Vec<JobStage>,
}

impl JobGraph {
    /// Iterates over every job of every stage.
    pub fn jobs(&self) -> impl Iterator<Item = &PlannedJob> {
        self.stages.iter().flat_map(|stage| stage.jobs.iter())
    }

    /// Returns the job of a kind, if planned.
    pub fn job(&self, kind: JobKind) -> Option<&PlannedJob> {
        self.jobs().find(|job| job.kind == kind)
    }

    /// Returns the index of the stage a job belongs to.
    pub fn stage_of(&self, kind: JobKind) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.jobs.iter().any(|job| job.kind == kind))
    }
}

/// Builds job graphs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleSyncPlanner;

impl RoleSyncPlanner {
    /// Plans a pass for an actor.
    pub fn plan(actor: &Actor, horizon: Timestamp, is_first_sync: bool) -> JobGraph {
        Self::plan_jobs(&SyncScope::for_actor(actor), horizon, is_first_sync)
    }

    /// Plans a pass for a scope.
    ///
    /// The tombstone job is left out of a first sync: there is nothing
    /// local to delete yet.
    pub fn plan_jobs(scope: &SyncScope, horizon: Timestamp, is_first_sync: bool) -> JobGraph {
        let (directories, mut entities, results) = match scope {
            SyncScope::Global => global_plan(),
            SyncScope::Cohort { class_ids } => cohort_plan(class_ids),
            SyncScope::SelfScope {
                member_id,
                class_id,
                ..
            } => self_plan(*member_id, *class_id),
        };

        if !is_first_sync {
            entities.push(PlannedJob::new(JobKind::Tombstones, ScopeFilter::Global));
        }

        let stages = [
            ("directories", directories),
            ("entities", entities),
            ("results", vec![results]),
        ]
        .into_iter()
        .map(|(label, mut jobs)| {
            link_references(&mut jobs);
            JobStage { label, jobs }
        })
        .collect();

        JobGraph { horizon, stages }
    }
}

/// Makes every job wait for the same-stage jobs of the tables it hydrates from.
fn link_references(jobs: &mut [PlannedJob]) {
    let planned: Vec<JobKind> = jobs.iter().map(|job| job.kind).collect();
    for job in jobs.iter_mut() {
        let JobKind::Entity(entity) = job.kind else {
            continue;
        };
        for reference in records::references(entity) {
            let kind = JobKind::Entity(*reference);
            if planned.contains(&kind) && !job.after.contains(&kind) {
                job.after.push(kind);
            }
        }
    }
}

type Plan = (Vec<PlannedJob>, Vec<PlannedJob>, PlannedJob);

fn global_plan() -> Plan {
    let directories = vec![
        PlannedJob::entity(EntityType::Classes, ScopeFilter::Global),
        PlannedJob::entity(EntityType::Sections, ScopeFilter::Global),
    ];
    let entities = EntityType::ALL
        .into_iter()
        .filter(|e| !e.is_directory() && *e != EntityType::Results)
        .map(|e| PlannedJob::entity(e, ScopeFilter::Global))
        .collect();
    let results = PlannedJob::entity(EntityType::Results, ScopeFilter::Global);

    (directories, entities, results)
}

fn cohort_plan(class_ids: &[RecordId]) -> Plan {
    let classes = || ScopeFilter::classes(class_ids);

    let directories = vec![
        PlannedJob::entity(EntityType::Classes, ScopeFilter::Global),
        PlannedJob::entity(EntityType::Sections, classes()),
    ];
    let entities = vec![
        PlannedJob::entity(EntityType::Users, ScopeFilter::everyone_and(class_ids)),
        PlannedJob::entity(EntityType::Subjects, classes()),
        PlannedJob::entity(EntityType::Terms, ScopeFilter::Global),
        PlannedJob::entity(EntityType::Attendance, classes()),
        PlannedJob::entity(EntityType::Homework, classes()),
        PlannedJob::entity(EntityType::Syllabus, classes()),
        PlannedJob::entity(EntityType::Materials, classes()),
        PlannedJob::entity(EntityType::Timetable, classes()),
        PlannedJob::entity(EntityType::Announcements, ScopeFilter::everyone_and(class_ids)),
        PlannedJob::entity(EntityType::Events, ScopeFilter::Global),
        // The member filter is resolved from the Users rows of this pass.
        PlannedJob::entity(EntityType::Leaves, ScopeFilter::MembersOf(class_ids.to_vec()))
            .waits_for(JobKind::Entity(EntityType::Users)),
    ];
    let results = PlannedJob::entity(EntityType::Results, classes());

    (directories, entities, results)
}

fn self_plan(member_id: RecordId, class_id: RecordId) -> Plan {
    let class = || ScopeFilter::AnyOf(vec![RemoteFilter::Class(class_id)]);
    let own = || ScopeFilter::AnyOf(vec![RemoteFilter::Owner(member_id)]);

    let directories = vec![
        PlannedJob::entity(EntityType::Classes, class()),
        PlannedJob::entity(EntityType::Sections, class()),
    ];
    let entities = vec![
        PlannedJob::entity(
            EntityType::Users,
            ScopeFilter::AnyOf(vec![RemoteFilter::Owner(member_id), RemoteFilter::Unscoped]),
        ),
        PlannedJob::entity(EntityType::Subjects, class()),
        PlannedJob::entity(EntityType::Homework, class()),
        PlannedJob::entity(EntityType::Syllabus, class()),
        PlannedJob::entity(EntityType::Materials, class()),
        PlannedJob::entity(EntityType::Timetable, class()),
        PlannedJob::entity(EntityType::Attendance, own()),
        PlannedJob::entity(EntityType::Fees, own()),
        PlannedJob::entity(EntityType::Leaves, own()),
        PlannedJob::entity(EntityType::Terms, ScopeFilter::Global),
        PlannedJob::entity(EntityType::Events, ScopeFilter::Global),
        PlannedJob::entity(EntityType::Announcements, ScopeFilter::everyone_and(&[class_id])),
    ];
    let results = PlannedJob::entity(EntityType::Results, own());

    (directories, entities, results)
}
