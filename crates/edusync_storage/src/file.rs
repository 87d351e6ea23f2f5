//! File-backed local store.

use crate::error::{StorageError, StorageResult};
use crate::memory::{MemoryStore, Snapshot};
use crate::store::{LocalRecord, LocalStore, MergeStats};
use edusync_protocol::{
    from_cbor, to_cbor, EntityType, PendingDeletionIntent, RecordEnvelope, RecordId, Timestamp,
};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_FILE: &str = "mirror.cbor";
const SNAPSHOT_TEMP: &str = "mirror.cbor.tmp";
const LOCK_FILE: &str = "LOCK";

/// A local store that survives process restarts.
///
/// Rows live in memory; after every mutation the whole mirror is written to
/// `<dir>/mirror.cbor` through a temporary file and an atomic rename. The
/// directory holds an advisory `LOCK` so only one process opens it.
///
/// Outbox intents and the key-value cells (sync watermark, cached identity)
/// are part of the same snapshot, so a restart resumes pending pushes.
///
/// # Example
///
/// ```no_run
/// use edusync_storage::{FileStore, LocalStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("mirror")).unwrap();
/// store.put_value("sync.watermark", 42i64.to_be_bytes().to_vec()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    inner: MemoryStore,
    persist: Mutex<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - Another process holds the lock (`Locked`)
    /// - An existing snapshot cannot be decoded
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(dir.display().to_string()));
        }

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let inner = if snapshot_path.exists() {
            let mut bytes = Vec::new();
            File::open(&snapshot_path)?.read_to_end(&mut bytes)?;
            let snapshot: Snapshot = from_cbor(&bytes)
                .map_err(|e| StorageError::Corrupted(format!("{}: {e}", snapshot_path.display())))?;
            MemoryStore::from_snapshot(snapshot)
        } else {
            MemoryStore::new()
        };

        tracing::debug!(dir = %dir.display(), "opened local store");

        Ok(Self {
            dir: dir.to_path_buf(),
            inner,
            persist: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn persist(&self) -> StorageResult<()> {
        let _guard = self.persist.lock();
        let bytes = to_cbor(&self.inner.snapshot())?;

        let temp_path = self.dir.join(SNAPSHOT_TEMP);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, self.dir.join(SNAPSHOT_FILE))?;
        Ok(())
    }
}

impl LocalStore for FileStore {
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
        self.inner.put_local(record)?;
        self.persist()
    }

    fn merge_remote(&self, entity: EntityType, records: Vec<RecordEnvelope>) -> StorageResult<MergeStats> {
        if records.is_empty() {
            return Ok(MergeStats::default());
        }
        let stats = self.inner.merge_remote(entity, records)?;
        self.persist()?;
        Ok(stats)
    }

    fn mark_synced(
        &self,
        entity: EntityType,
        id: RecordId,
        pushed_at: Timestamp,
        updated_at: Timestamp,
    ) -> StorageResult<bool> {
        let flipped = self.inner.mark_synced(entity, id, pushed_at, updated_at)?;
        if flipped {
            self.persist()?;
        }
        Ok(flipped)
    }

    fn refresh_payload(
        &self,
        entity: EntityType,
        id: RecordId,
        updated_at: Timestamp,
        payload: Vec<u8>,
    ) -> StorageResult<bool> {
        let rewritten = self.inner.refresh_payload(entity, id, updated_at, payload)?;
        if rewritten {
            self.persist()?;
        }
        Ok(rewritten)
    }

    fn delete(&self, entity: EntityType, id: RecordId) -> StorageResult<bool> {
        let removed = self.inner.delete(entity, id)?;
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn delete_with_intent(&self, intent: PendingDeletionIntent) -> StorageResult<bool> {
        let removed = self.inner.delete_with_intent(intent)?;
        self.persist()?;
        Ok(removed)
    }

    fn apply_tombstone(&self, entity: EntityType, id: RecordId, at: Timestamp) -> StorageResult<bool> {
        let removed = self.inner.apply_tombstone(entity, id, at)?;
        self.persist()?;
        Ok(removed)
    }

    fn prune_tombstones(&self, before: Timestamp) -> StorageResult<usize> {
        let pruned = self.inner.prune_tombstones(before)?;
        if pruned > 0 {
            tracing::debug!(pruned, before, "pruned tombstone marks");
            self.persist()?;
        }
        Ok(pruned)
    }

    fn pending_deletions(&self, entity: Option<EntityType>) -> StorageResult<Vec<PendingDeletionIntent>> {
        self.inner.pending_deletions(entity)
    }

    fn clear_deletion_intent(&self, entity: EntityType, id: RecordId) -> StorageResult<()> {
        self.inner.clear_deletion_intent(entity, id)?;
        self.persist()
    }

    fn clear(&self, entity: EntityType) -> StorageResult<()> {
        self.inner.clear(entity)?;
        self.persist()
    }

    fn get_value(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get_value(key)
    }

    fn put_value(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.inner.put_value(key, value)?;
        self.persist()
    }

    fn remove_value(&self, key: &str) -> StorageResult<()> {
        self.inner.remove_value(key)?;
        self.persist()
    }
}
