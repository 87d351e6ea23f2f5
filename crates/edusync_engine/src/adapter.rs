//! Per-entity sync adapters and the static type to adapter table.

use crate::error::{SyncError, SyncResult};
use crate::hydrate::ReferenceLookup;
use crate::records::{
    self, Announcement, AttendanceEntry, Class, ExamResult, FeeInvoice, Homework, LeaveRequest,
    Material, SchoolEvent, Section, Subject, SyncFields, SyncRecord, SyllabusUnit, Term,
    TimetableSlot, User,
};
use crate::remote::RemoteBackend;
use async_trait::async_trait;
use edusync_protocol::{to_cbor, EntityType, RecordEnvelope, RecordId, RemoteFilter, Timestamp};
use edusync_storage::{LocalStore, MergeStats};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Uniform capability surface over one entity's local table and remote source.
///
/// # Contract
///
/// - `fetch_remote_updated` returns an empty list when nothing changed and
///   a `Remote` error on transport or authorization failure.
/// - `apply_local` is an idempotent upsert by id, accepts an empty batch and
///   hydrates display fields from the local reference tables at call time.
/// - `delete_local` and `apply_tombstone` are idempotent.
/// - `rehydrate_local` rewrites only display fields, never the sync state.
/// - `clear_local` is reserved for logout and reset flows.
#[async_trait]
pub trait EntityAdapter: Send + Sync {
    /// The record type this adapter owns.
    type Record: SyncRecord;

    /// Fetches records updated after `after` that match any of `filters`.
    async fn fetch_remote_updated(
        &self,
        after: Timestamp,
        filters: &[RemoteFilter],
    ) -> SyncResult<Vec<Self::Record>>;

    /// Upserts fetched records into the local table.
    async fn apply_local(&self, records: Vec<Self::Record>) -> SyncResult<MergeStats>;

    /// Removes a local row.
    async fn delete_local(&self, id: RecordId) -> SyncResult<bool>;

    /// Removes a local row on behalf of a remote tombstone logged at `at`.
    async fn apply_tombstone(&self, id: RecordId, at: Timestamp) -> SyncResult<bool>;

    /// Recomputes the display fields of every local row from the current
    /// reference tables. Returns the number of rows rewritten.
    async fn rehydrate_local(&self) -> SyncResult<usize>;

    /// Wipes the local table.
    async fn clear_local(&self) -> SyncResult<()>;
}

/// What one entity job observed.
#[derive(Debug, Default)]
pub struct JobOutcome {
    /// Largest `updated_at` fetched, `None` if nothing was fetched.
    pub max_seen: Option<Timestamp>,
    /// Records fetched after scope checks.
    pub fetched: usize,
    /// Merge counts.
    pub stats: MergeStats,
    /// The local write that failed after a successful fetch, if any.
    pub local_error: Option<SyncError>,
}

/// Type-erased adapter, as stored in the [`AdapterRegistry`].
///
/// Implemented for every [`EntityAdapter`].
#[async_trait]
pub trait EntityJob: Send + Sync {
    /// The entity type this job syncs.
    fn entity(&self) -> EntityType;

    /// Fetches and applies one entity's changes.
    ///
    /// A local write failure is reported in the outcome, not as an error:
    /// the remote fetch itself succeeded.
    async fn run(&self, after: Timestamp, filters: &[RemoteFilter]) -> SyncResult<JobOutcome>;

    /// See [`EntityAdapter::delete_local`].
    async fn delete_local(&self, id: RecordId) -> SyncResult<bool>;

    /// See [`EntityAdapter::apply_tombstone`].
    async fn apply_tombstone(&self, id: RecordId, at: Timestamp) -> SyncResult<bool>;

    /// See [`EntityAdapter::rehydrate_local`].
    async fn rehydrate_local(&self) -> SyncResult<usize>;

    /// See [`EntityAdapter::clear_local`].
    async fn clear_local(&self) -> SyncResult<()>;
}

#[async_trait]
impl<A> EntityJob for A
where
    A: EntityAdapter,
{
    fn entity(&self) -> EntityType {
        A::Record::ENTITY
    }

    async fn run(&self, after: Timestamp, filters: &[RemoteFilter]) -> SyncResult<JobOutcome> {
        let records = self.fetch_remote_updated(after, filters).await?;
        let fetched = records.len();
        let max_seen = records.iter().map(SyncFields::updated_at).max();

        match self.apply_local(records).await {
            Ok(stats) => Ok(JobOutcome {
                max_seen,
                fetched,
                stats,
                local_error: None,
            }),
            Err(e) => {
                tracing::error!(entity = %A::Record::ENTITY, error = %e, "local write failed");
                Ok(JobOutcome {
                    max_seen,
                    fetched,
                    stats: MergeStats::default(),
                    local_error: Some(e),
                })
            }
        }
    }

    async fn delete_local(&self, id: RecordId) -> SyncResult<bool> {
        EntityAdapter::delete_local(self, id).await
    }

    async fn apply_tombstone(&self, id: RecordId, at: Timestamp) -> SyncResult<bool> {
        EntityAdapter::apply_tombstone(self, id, at).await
    }

    async fn rehydrate_local(&self) -> SyncResult<usize> {
        EntityAdapter::rehydrate_local(self).await
    }

    async fn clear_local(&self) -> SyncResult<()> {
        EntityAdapter::clear_local(self).await
    }
}

/// The adapter every entity type uses: a local table plus a remote source.
pub struct TableAdapter<R> {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteBackend>,
    page_size: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: SyncRecord> TableAdapter<R> {
    /// Creates an adapter.
    pub fn new(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteBackend>, page_size: usize) -> Self {
        Self {
            store,
            remote,
            page_size: page_size.max(1),
            _record: PhantomData,
        }
    }

    async fn fetch_filter(
        &self,
        after: Timestamp,
        filter: &RemoteFilter,
        filters: &[RemoteFilter],
        into: &mut BTreeMap<RecordId, RecordEnvelope>,
    ) -> SyncResult<()> {
        let mut token = None;
        loop {
            let page = self
                .remote
                .fetch_updated_since(R::ENTITY, after, filter, token, self.page_size)
                .await?;

            for envelope in page.records {
                // Backends are not trusted to apply filters.
                if envelope.entity != R::ENTITY || !filters.iter().any(|f| f.matches(&envelope.scope)) {
                    tracing::warn!(entity = %R::ENTITY, id = %envelope.id, "dropping out-of-scope record");
                    continue;
                }
                // Pruned tombstone marks rely on this.
                if envelope.updated_at <= after {
                    tracing::debug!(entity = %R::ENTITY, id = %envelope.id, after, "dropping record below horizon");
                    continue;
                }
                match into.get(&envelope.id) {
                    Some(seen) if seen.updated_at >= envelope.updated_at => {}
                    _ => {
                        into.insert(envelope.id, envelope);
                    }
                }
            }

            match page.next {
                Some(next) => token = Some(next),
                None => return Ok(()),
            }
        }
    }
}

#[async_trait]
impl<R: SyncRecord> EntityAdapter for TableAdapter<R> {
    type Record = R;

    async fn fetch_remote_updated(&self, after: Timestamp, filters: &[RemoteFilter]) -> SyncResult<Vec<R>> {
        let mut envelopes = BTreeMap::new();
        for filter in filters {
            self.fetch_filter(after, filter, filters, &mut envelopes).await?;
        }

        envelopes.values().map(records::from_envelope).collect()
    }

    async fn apply_local(&self, records: Vec<R>) -> SyncResult<MergeStats> {
        if records.is_empty() {
            return Ok(MergeStats::default());
        }

        let refs = ReferenceLookup::new(self.store.as_ref());
        let envelopes = records
            .into_iter()
            .map(|mut record| {
                record.hydrate(&refs);
                records::to_envelope(&record)
            })
            .collect::<SyncResult<Vec<_>>>()?;

        let stats = self.store.merge_remote(R::ENTITY, envelopes)?;
        tracing::debug!(
            entity = %R::ENTITY,
            applied = stats.applied,
            kept_local = stats.kept_local,
            tombstoned = stats.tombstoned,
            "applied remote records"
        );
        Ok(stats)
    }

    async fn delete_local(&self, id: RecordId) -> SyncResult<bool> {
        Ok(self.store.delete(R::ENTITY, id)?)
    }

    async fn apply_tombstone(&self, id: RecordId, at: Timestamp) -> SyncResult<bool> {
        Ok(self.store.apply_tombstone(R::ENTITY, id, at)?)
    }

    async fn rehydrate_local(&self) -> SyncResult<usize> {
        let refs = ReferenceLookup::new(self.store.as_ref());
        let mut rewritten = 0;

        for row in self.store.list(R::ENTITY)? {
            let mut record: R = records::from_row(&row)?;
            let before = to_cbor(&record)?;
            record.hydrate(&refs);
            let after = to_cbor(&record)?;
            if after == before {
                continue;
            }
            // A row edited since the read keeps its newer payload.
            if self
                .store
                .refresh_payload(R::ENTITY, row.envelope.id, row.envelope.updated_at, after)?
            {
                rewritten += 1;
            }
        }

        if rewritten > 0 {
            tracing::debug!(entity = %R::ENTITY, rewritten, "refreshed display fields");
        }
        Ok(rewritten)
    }

    async fn clear_local(&self) -> SyncResult<()> {
        Ok(self.store.clear(R::ENTITY)?)
    }
}

/// Static table from entity type to its adapter.
///
/// Every entity type has exactly one adapter.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn EntityJob>>,
}

impl AdapterRegistry {
    /// Creates the table of [`TableAdapter`]s for every entity type.
    pub fn standard(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteBackend>, page_size: usize) -> Self {
        fn table<R: SyncRecord>(
            store: &Arc<dyn LocalStore>,
            remote: &Arc<dyn RemoteBackend>,
            page_size: usize,
        ) -> Arc<dyn EntityJob> {
            Arc::new(TableAdapter::<R>::new(Arc::clone(store), Arc::clone(remote), page_size))
        }

        let (s, r, p) = (&store, &remote, page_size);
        let adapters = EntityType::ALL
            .iter()
            .map(|entity| match entity {
                EntityType::Classes => table::<Class>(s, r, p),
                EntityType::Sections => table::<Section>(s, r, p),
                EntityType::Users => table::<User>(s, r, p),
                EntityType::Subjects => table::<Subject>(s, r, p),
                EntityType::Terms => table::<Term>(s, r, p),
                EntityType::Attendance => table::<AttendanceEntry>(s, r, p),
                EntityType::Fees => table::<FeeInvoice>(s, r, p),
                EntityType::Homework => table::<Homework>(s, r, p),
                EntityType::Announcements => table::<Announcement>(s, r, p),
                EntityType::Leaves => table::<LeaveRequest>(s, r, p),
                EntityType::Results => table::<ExamResult>(s, r, p),
                EntityType::Syllabus => table::<SyllabusUnit>(s, r, p),
                EntityType::Materials => table::<Material>(s, r, p),
                EntityType::Timetable => table::<TimetableSlot>(s, r, p),
                EntityType::Events => table::<SchoolEvent>(s, r, p),
            })
            .collect();

        Self { adapters }
    }

    /// Replaces the adapter of one entity type.
    pub fn with_adapter(mut self, adapter: Arc<dyn EntityJob>) -> Self {
        let slot = adapter.entity() as usize;
        self.adapters[slot] = adapter;
        self
    }

    /// Returns the adapter of an entity type.
    pub fn get(&self, entity: EntityType) -> &Arc<dyn EntityJob> {
        &self.adapters[entity as usize]
    }

    /// Resolves a wire entity name to its adapter.
    pub fn dispatch(&self, entity_type: &str) -> SyncResult<&Arc<dyn EntityJob>> {
        entity_type
            .parse::<EntityType>()
            .map(|entity| self.get(entity))
            .map_err(|_| SyncError::Dispatch {
                entity_type: entity_type.to_string(),
            })
    }

    /// Iterates over every adapter.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EntityJob>> {
        self.adapters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::to_envelope;
    use edusync_protocol::{
        DeletionLogEntry, PageToken, PushAck, RecordPage, RecordScope,
    };
    use edusync_storage::MemoryStore;
    use uuid::Uuid;

    /// Serves a fixed record list, one record per page, ignoring filters.
    /// A replaying remote ignores `after` too.
    struct FixedRemote {
        records: Vec<RecordEnvelope>,
        replay: bool,
    }

    #[async_trait]
    impl RemoteBackend for FixedRemote {
        async fn fetch_updated_since(
            &self,
            entity: EntityType,
            after: Timestamp,
            _filter: &RemoteFilter,
            page: Option<PageToken>,
            _page_size: usize,
        ) -> SyncResult<RecordPage> {
            let matching: Vec<_> = self
                .records
                .iter()
                .filter(|r| r.entity == entity && (self.replay || r.updated_at > after))
                .cloned()
                .collect();
            let offset = page.map_or(0, |t| t.0 as usize);
            let records = matching.iter().skip(offset).take(1).cloned().collect();
            let next = (offset + 1 < matching.len()).then(|| PageToken(offset as u64 + 1));
            Ok(RecordPage { records, next })
        }

        async fn push(&self, _entity: EntityType, _records: Vec<RecordEnvelope>) -> SyncResult<PushAck> {
            Err(SyncError::remote_fatal("read only"))
        }

        async fn push_tombstone(&self, _: EntityType, _: RecordId, _: Timestamp) -> SyncResult<Timestamp> {
            Err(SyncError::remote_fatal("read only"))
        }

        async fn fetch_tombstones_since(&self, _after: Timestamp) -> SyncResult<Vec<DeletionLogEntry>> {
            Ok(Vec::new())
        }
    }

    fn homework(class_id: RecordId, updated_at: Timestamp) -> RecordEnvelope {
        let mut hw = Homework::new(class_id, Uuid::new_v4(), "Reading", "Chapter 3");
        hw.set_sync_state(updated_at, true);
        to_envelope(&hw).unwrap()
    }

    fn adapter(records: Vec<RecordEnvelope>) -> (Arc<MemoryStore>, TableAdapter<Homework>) {
        replaying_adapter(records, false)
    }

    fn replaying_adapter(records: Vec<RecordEnvelope>, replay: bool) -> (Arc<MemoryStore>, TableAdapter<Homework>) {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FixedRemote { records, replay });
        (store.clone(), TableAdapter::new(store, remote, 10))
    }

    #[tokio::test]
    async fn fetch_follows_pages_and_checks_scope() {
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let (_, adapter) = adapter(vec![homework(mine, 10), homework(theirs, 11), homework(mine, 12)]);

        let fetched = adapter
            .fetch_remote_updated(0, &[RemoteFilter::Class(mine)])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|h| h.class_id == mine && h.is_synced));

        let later = adapter
            .fetch_remote_updated(10, &[RemoteFilter::Class(mine)])
            .await
            .unwrap();
        assert_eq!(later.len(), 1);
    }

    #[tokio::test]
    async fn records_at_or_below_horizon_are_dropped() {
        let class = Uuid::new_v4();
        let (_, adapter) = replaying_adapter(vec![homework(class, 10), homework(class, 20)], true);

        let fetched = adapter
            .fetch_remote_updated(10, &[RemoteFilter::All])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].updated_at(), 20);
    }

    #[tokio::test]
    async fn rehydrate_fills_names_of_existing_rows() {
        let class = Uuid::new_v4();
        let mut hw = Homework::new(class, Uuid::new_v4(), "Reading", "Chapter 3");
        hw.set_sync_state(10, false);
        let subject = {
            let mut subject = Subject::new(class, "Science", None);
            subject.id = hw.subject_id;
            subject.set_sync_state(5, true);
            subject
        };
        let (store, adapter) = adapter(Vec::new());
        store
            .put_local(edusync_storage::LocalRecord::dirty(to_envelope(&hw).unwrap()))
            .unwrap();

        assert_eq!(EntityAdapter::rehydrate_local(&adapter).await.unwrap(), 0);

        store
            .merge_remote(EntityType::Subjects, vec![to_envelope(&subject).unwrap()])
            .unwrap();
        assert_eq!(EntityAdapter::rehydrate_local(&adapter).await.unwrap(), 1);
        assert_eq!(EntityAdapter::rehydrate_local(&adapter).await.unwrap(), 0);

        let row = store.get(EntityType::Homework, hw.id).unwrap().unwrap();
        assert!(!row.is_synced);
        assert_eq!(row.envelope.updated_at, 10);
        let refreshed: Homework = records::from_row(&row).unwrap();
        assert_eq!(refreshed.subject_name.as_deref(), Some("Science"));
        assert_eq!(refreshed.title, "Reading");
    }

    #[tokio::test]
    async fn no_filters_fetch_nothing() {
        let (_, adapter) = adapter(vec![homework(Uuid::new_v4(), 1)]);
        assert!(adapter.fetch_remote_updated(0, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_is_idempotent() {
        let class = Uuid::new_v4();
        let (store, adapter) = adapter(vec![homework(class, 10), homework(class, 11)]);

        let first = EntityJob::run(&adapter, 0, &[RemoteFilter::All]).await.unwrap();
        assert_eq!(first.fetched, 2);
        assert_eq!(first.max_seen, Some(11));
        let snapshot = store.list(EntityType::Homework).unwrap();

        EntityJob::run(&adapter, 0, &[RemoteFilter::All]).await.unwrap();
        assert_eq!(store.list(EntityType::Homework).unwrap(), snapshot);

        assert_eq!(adapter.apply_local(Vec::new()).await.unwrap(), MergeStats::default());
    }

    #[tokio::test]
    async fn empty_fetch_reports_no_maximum() {
        let (_, adapter) = adapter(Vec::new());
        let outcome = EntityJob::run(&adapter, 0, &[RemoteFilter::All]).await.unwrap();
        assert_eq!(outcome.max_seen, None);
        assert_eq!(outcome.fetched, 0);
    }

    #[tokio::test]
    async fn delete_and_tombstone_are_idempotent() {
        let record = homework(Uuid::new_v4(), 10);
        let id = record.id;
        let (store, adapter) = adapter(vec![record]);
        EntityJob::run(&adapter, 0, &[RemoteFilter::All]).await.unwrap();

        assert!(EntityAdapter::apply_tombstone(&adapter, id, 10).await.unwrap());
        assert!(!EntityAdapter::apply_tombstone(&adapter, id, 10).await.unwrap());
        assert!(!EntityAdapter::delete_local(&adapter, id).await.unwrap());

        // A replayed fetch cannot bring the row back.
        EntityJob::run(&adapter, 0, &[RemoteFilter::All]).await.unwrap();
        assert!(store.get(EntityType::Homework, id).unwrap().is_none());
    }

    #[test]
    fn registry_covers_every_entity() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let remote: Arc<dyn RemoteBackend> = Arc::new(FixedRemote {
            records: Vec::new(),
            replay: false,
        });
        let registry = AdapterRegistry::standard(store, remote, 10);

        for entity in EntityType::ALL {
            assert_eq!(registry.get(entity).entity(), entity);
        }
        assert_eq!(registry.iter().count(), EntityType::ALL.len());
        assert!(registry.dispatch("homework").is_ok());
        assert!(matches!(
            registry.dispatch("buses"),
            Err(SyncError::Dispatch { .. })
        ));
    }

    #[test]
    fn scope_of_fixture() {
        let class = Uuid::new_v4();
        assert_eq!(homework(class, 1).scope, RecordScope::class(class));
    }
}
