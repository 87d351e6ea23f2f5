//! A single entity table with its tombstone marks.

use crate::store::{LocalRecord, MergeStats};
use edusync_protocol::{resolve, tombstone_covers, RecordEnvelope, RecordId, Resolution, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rows of one entity type plus the tombstones applied to it.
///
/// Both maps live under the same lock so that a merge and a tombstone can
/// never interleave between the check and the write.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Table {
    rows: BTreeMap<RecordId, LocalRecord>,
    tombstones: BTreeMap<RecordId, Timestamp>,
}

impl Table {
    pub(crate) fn get(&self, id: &RecordId) -> Option<&LocalRecord> {
        self.rows.get(id)
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &LocalRecord> {
        self.rows.values()
    }

    pub(crate) fn put_local(&mut self, record: LocalRecord) {
        self.rows.insert(record.envelope.id, record);
    }

    pub(crate) fn merge_remote(&mut self, records: Vec<RecordEnvelope>) -> MergeStats {
        let mut stats = MergeStats::default();

        for envelope in records {
            if let Some(&deleted_at) = self.tombstones.get(&envelope.id) {
                if tombstone_covers(deleted_at, envelope.updated_at) {
                    stats.tombstoned += 1;
                    continue;
                }
            }

            let local = self.rows.get(&envelope.id).map(|row| row.envelope.updated_at);
            match resolve(local, envelope.updated_at) {
                Resolution::AcceptRemote => {
                    self.rows.insert(envelope.id, LocalRecord::synced(envelope));
                    stats.applied += 1;
                }
                Resolution::KeepLocal => stats.kept_local += 1,
            }
        }

        stats
    }

    pub(crate) fn mark_synced(&mut self, id: &RecordId, pushed_at: Timestamp, updated_at: Timestamp) -> bool {
        match self.rows.get_mut(id) {
            // A newer local edit made after the push was read stays dirty.
            Some(row) if !row.is_synced && row.envelope.updated_at == pushed_at => {
                row.is_synced = true;
                row.envelope.updated_at = updated_at;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn refresh_payload(&mut self, id: &RecordId, updated_at: Timestamp, payload: Vec<u8>) -> bool {
        match self.rows.get_mut(id) {
            Some(row) if row.envelope.updated_at == updated_at => {
                row.envelope.payload = payload;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn delete(&mut self, id: &RecordId) -> bool {
        self.rows.remove(id).is_some()
    }

    pub(crate) fn record_tombstone(&mut self, id: RecordId, at: Timestamp) {
        let mark = self.tombstones.entry(id).or_insert(at);
        *mark = (*mark).max(at);
    }

    pub(crate) fn apply_tombstone(&mut self, id: RecordId, at: Timestamp) -> bool {
        self.record_tombstone(id, at);
        let covered = self
            .rows
            .get(&id)
            .is_some_and(|row| tombstone_covers(at, row.envelope.updated_at));
        if covered {
            self.rows.remove(&id);
        }
        covered
    }

    pub(crate) fn prune_tombstones(&mut self, before: Timestamp) -> usize {
        let marks = self.tombstones.len();
        self.tombstones.retain(|_, at| *at >= before);
        marks - self.tombstones.len()
    }

    pub(crate) fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.tombstones.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edusync_protocol::{EntityType, RecordScope};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn envelope(id: RecordId, updated_at: Timestamp) -> RecordEnvelope {
        RecordEnvelope {
            entity: EntityType::Homework,
            id,
            updated_at,
            scope: RecordScope::UNSCOPED,
            payload: vec![updated_at as u8],
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let mut table = Table::default();
        let id = Uuid::new_v4();

        let first = table.merge_remote(vec![envelope(id, 10)]);
        let second = table.merge_remote(vec![envelope(id, 10)]);

        assert_eq!(first.applied, 1);
        assert_eq!(second.applied, 1);
        assert_eq!(table.rows().count(), 1);
    }

    #[test]
    fn older_fetch_does_not_overwrite() {
        let mut table = Table::default();
        let id = Uuid::new_v4();
        table.merge_remote(vec![envelope(id, 20)]);

        let stats = table.merge_remote(vec![envelope(id, 15)]);
        assert_eq!(stats.kept_local, 1);
        assert_eq!(table.get(&id).unwrap().envelope.updated_at, 20);
    }

    #[test]
    fn tombstone_blocks_later_merge_of_older_version() {
        let mut table = Table::default();
        let id = Uuid::new_v4();
        table.merge_remote(vec![envelope(id, 10)]);

        assert!(table.apply_tombstone(id, 12));
        let stats = table.merge_remote(vec![envelope(id, 10)]);

        assert_eq!(stats.tombstoned, 1);
        assert!(table.get(&id).is_none());
    }

    #[test]
    fn tombstone_before_merge_wins_tie() {
        let mut table = Table::default();
        let id = Uuid::new_v4();

        assert!(!table.apply_tombstone(id, 10));
        let stats = table.merge_remote(vec![envelope(id, 10)]);

        assert_eq!(stats.tombstoned, 1);
        assert!(table.get(&id).is_none());
    }

    #[test]
    fn dirty_edit_after_push_stays_dirty() {
        let mut table = Table::default();
        let id = Uuid::new_v4();
        table.put_local(LocalRecord::dirty(envelope(id, 30)));

        assert!(!table.mark_synced(&id, 25, 40));
        assert!(!table.get(&id).unwrap().is_synced);

        assert!(table.mark_synced(&id, 30, 40));
        let row = table.get(&id).unwrap();
        assert!(row.is_synced);
        assert_eq!(row.envelope.updated_at, 40);
    }

    #[test]
    fn refresh_keeps_sync_flag_and_skips_edited_rows() {
        let mut table = Table::default();
        let id = Uuid::new_v4();
        table.put_local(LocalRecord::dirty(envelope(id, 30)));

        assert!(!table.refresh_payload(&id, 29, vec![7]));
        assert!(table.refresh_payload(&id, 30, vec![7]));
        let row = table.get(&id).unwrap();
        assert_eq!(row.envelope.payload, vec![7]);
        assert!(!row.is_synced);
        assert!(!table.refresh_payload(&Uuid::new_v4(), 30, vec![7]));
    }

    #[test]
    fn prune_drops_only_old_marks() {
        let mut table = Table::default();
        let (old, recent) = (Uuid::new_v4(), Uuid::new_v4());
        table.apply_tombstone(old, 10);
        table.apply_tombstone(recent, 50);

        assert_eq!(table.prune_tombstones(50), 1);
        assert_eq!(table.tombstone_count(), 1);
        assert_eq!(table.merge_remote(vec![envelope(recent, 50)]).tombstoned, 1);
        assert_eq!(table.prune_tombstones(50), 0);
    }

    proptest! {
        #[test]
        fn covered_record_is_absent_in_either_order(
            record_at in 0i64..1_000,
            gap in 0i64..1_000,
            tombstone_first in any::<bool>(),
        ) {
            let mut table = Table::default();
            let id = Uuid::new_v4();
            let deleted_at = record_at + gap;

            if tombstone_first {
                table.apply_tombstone(id, deleted_at);
                table.merge_remote(vec![envelope(id, record_at)]);
            } else {
                table.merge_remote(vec![envelope(id, record_at)]);
                table.apply_tombstone(id, deleted_at);
            }
            prop_assert!(table.get(&id).is_none());
        }
    }
}
