//! The sync watermark and per-job retry floors.
//!
//! The watermark is the single incremental cursor of a device: the next
//! pass fetches records updated after it. Retry floors hold the horizon a
//! failed job last fetched from, so that job starts there again even after
//! the shared watermark has moved past it.

use crate::error::SyncResult;
use crate::executor::SyncJobResult;
use crate::planner::JobKind;
use edusync_protocol::Timestamp;
use edusync_storage::{LocalStore, StorageError};
use std::sync::Arc;

const WATERMARK_KEY: &str = "sync.watermark";
const FLOOR_PREFIX: &str = "sync.floor.";

/// Folds job results into the next watermark.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatermarkReducer;

impl WatermarkReducer {
    /// Returns `max(prior, device_time, max over successful jobs)`.
    ///
    /// Failed jobs contribute nothing, so the result is never below
    /// `prior`.
    pub fn reduce<'a, I>(results: I, device_time: Timestamp, prior: Timestamp) -> Timestamp
    where
        I: IntoIterator<Item = &'a SyncJobResult>,
    {
        results
            .into_iter()
            .filter_map(SyncJobResult::max_timestamp)
            .fold(prior.max(device_time), Timestamp::max)
    }
}

/// Persists the watermark and retry floors in the local key-value store.
pub struct WatermarkStore {
    store: Arc<dyn LocalStore>,
}

impl WatermarkStore {
    /// Creates a watermark store.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Loads the watermark; zero if never persisted.
    pub fn load(&self) -> SyncResult<Timestamp> {
        Ok(self.read(WATERMARK_KEY)?.unwrap_or(0))
    }

    /// Persists a new watermark, never lowering the stored one.
    ///
    /// Returns the value stored.
    pub fn persist(&self, watermark: Timestamp) -> SyncResult<Timestamp> {
        let stored = self.load()?.max(watermark);
        self.store
            .put_value(WATERMARK_KEY, stored.to_be_bytes().to_vec())?;
        Ok(stored)
    }

    /// Forgets the watermark, making the next pass a first sync.
    pub fn reset(&self) -> SyncResult<()> {
        self.store.remove_value(WATERMARK_KEY)?;
        Ok(())
    }

    /// Returns the retry floor of a job, if it failed on an earlier pass.
    pub fn floor(&self, kind: JobKind) -> SyncResult<Option<Timestamp>> {
        self.read(&floor_key(kind))
    }

    /// Records that a job failed fetching from `after`.
    ///
    /// An existing lower floor is kept.
    pub fn lower_floor(&self, kind: JobKind, after: Timestamp) -> SyncResult<Timestamp> {
        let floor = match self.floor(kind)? {
            Some(existing) => existing.min(after),
            None => after,
        };
        self.store
            .put_value(&floor_key(kind), floor.to_be_bytes().to_vec())?;
        Ok(floor)
    }

    /// Clears the floor of a job that succeeded.
    pub fn clear_floor(&self, kind: JobKind) -> SyncResult<()> {
        self.store.remove_value(&floor_key(kind))?;
        Ok(())
    }

    /// Clears every floor.
    pub fn clear_floors(&self) -> SyncResult<()> {
        for kind in JobKind::all() {
            self.clear_floor(kind)?;
        }
        Ok(())
    }

    fn read(&self, key: &str) -> SyncResult<Option<Timestamp>> {
        let Some(bytes) = self.store.get_value(key)? else {
            return Ok(None);
        };
        let raw: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::Corrupted(format!("{key}: expected 8 bytes, got {}", bytes.len())))?;
        Ok(Some(Timestamp::from_be_bytes(raw)))
    }
}

fn floor_key(kind: JobKind) -> String {
    format!("{FLOOR_PREFIX}{}", kind.name())
}
