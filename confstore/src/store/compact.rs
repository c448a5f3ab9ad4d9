//! Log compaction
//!
//! Folds a contiguous log prefix into the base snapshot and advances the
//! retained floor. Preparation works on an immutable view so readers keep
//! running; installing the result is a single swap.

use std::collections::BTreeMap;

use super::entry::StoredValue;
use super::log::MutationLog;
use super::snapshot::apply_mutation;
use super::{StoreError, Version};

/// A prepared compaction: the new floor and the base snapshot materialized
/// at it, computed without touching the live log.
#[derive(Debug)]
pub struct Compaction {
    floor: Version,
    base: BTreeMap<Vec<u8>, StoredValue>,
}

impl Compaction {
    /// Folds every batch with version <= `up_to` into a fresh copy of the
    /// base snapshot.
    ///
    /// Returns `Ok(None)` when the log is already compacted past `up_to`;
    /// the call is idempotent. Fails with `InvalidCompactVersion` when
    /// `up_to` is beyond the log head. The caller is responsible for
    /// ensuring no live follower still needs versions <= `up_to`.
    pub fn prepare(log: &MutationLog, up_to: Version) -> Result<Option<Compaction>, StoreError> {
        let current = log.current_version();
        if up_to > current {
            return Err(StoreError::InvalidCompactVersion {
                requested: up_to,
                current,
            });
        }
        if up_to <= log.floor_version() {
            return Ok(None);
        }

        let mut base = log.base().clone();
        for (_, batch) in log.batches_through(up_to) {
            for mutation in batch {
                apply_mutation(&mut base, mutation);
            }
        }
        Ok(Some(Compaction { floor: up_to, base }))
    }

    pub fn floor(&self) -> Version {
        self.floor
    }

    pub(crate) fn base(&self) -> &BTreeMap<Vec<u8>, StoredValue> {
        &self.base
    }

    /// Swaps the prepared snapshot in and discards the folded entries.
    pub fn install(self, log: &mut MutationLog) {
        log.install_compaction(self.floor, self.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entry::Mutation;
    use crate::store::snapshot::materialize;
    use crate::store::StoreError;

    fn sample_log() -> MutationLog {
        let mut log = MutationLog::new();
        log.append(vec![Mutation::set(b"a".to_vec(), b"1".to_vec())]);
        log.append(vec![
            Mutation::set(b"b".to_vec(), b"2".to_vec()),
            Mutation::clear(b"a".to_vec()),
        ]);
        log.append(vec![Mutation::set(b"c".to_vec(), b"3".to_vec())]);
        log
    }

    #[test]
    fn test_compaction_preserves_replay_equivalence() {
        let mut log = sample_log();
        let before: Vec<_> = (1..=2)
            .map(|v| materialize(&log, Some(v), None).unwrap())
            .collect();

        let plan = Compaction::prepare(&log, 1).unwrap().unwrap();
        assert_eq!(plan.floor(), 1);
        plan.install(&mut log);

        assert_eq!(log.floor_version(), 1);
        assert_eq!(log.current_version(), 2);
        for (i, v) in (1..=2).enumerate() {
            assert_eq!(materialize(&log, Some(v), None).unwrap(), before[i]);
        }
    }

    #[test]
    fn test_compaction_is_idempotent() {
        let mut log = sample_log();
        Compaction::prepare(&log, 2).unwrap().unwrap().install(&mut log);
        let base_after_first = log.base().clone();
        let floor_after_first = log.floor_version();

        // Same target again: a no-op that must still succeed.
        assert!(Compaction::prepare(&log, 2).unwrap().is_none());
        // And any target at or below the floor behaves the same.
        assert!(Compaction::prepare(&log, 0).unwrap().is_none());

        assert_eq!(log.base(), &base_after_first);
        assert_eq!(log.floor_version(), floor_after_first);
    }

    #[test]
    fn test_compaction_beyond_head_is_rejected() {
        let log = sample_log();
        match Compaction::prepare(&log, 3) {
            Err(StoreError::InvalidCompactVersion { requested, current }) => {
                assert_eq!(requested, 3);
                assert_eq!(current, 2);
            }
            other => panic!("expected InvalidCompactVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_repeated_compaction_tracks_the_head() {
        let mut log = MutationLog::new();
        for i in 0..10u8 {
            log.append(vec![Mutation::set(vec![i], vec![i])]);
        }
        for step in [3, 6, 9] {
            Compaction::prepare(&log, step).unwrap().unwrap().install(&mut log);
            let snap = materialize(&log, None, None).unwrap();
            assert_eq!(snap.version, 9);
            assert_eq!(snap.data.len(), 10);
        }
        assert_eq!(log.window_len(), 0);
    }
}
