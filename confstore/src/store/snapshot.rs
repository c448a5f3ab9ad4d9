//! Snapshot materialization
//!
//! Reconstructs the full key/value configuration at a point in time by
//! replaying retained mutations on top of the base snapshot. Cost is
//! bounded by the retained window, never by total history.

use std::collections::BTreeMap;

use super::entry::{ClassFilter, Mutation, MutationOp, StoredValue};
use super::log::MutationLog;
use super::{StoreError, Version};

/// A materialized configuration: the mapping plus the version it reflects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedConfig {
    pub version: Version,
    pub data: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// Folds one mutation into a snapshot map: set is an upsert, clear is a
/// removal. The class tag travels with the value so the key keeps its
/// class once the mutation is compacted away.
pub(crate) fn apply_mutation(base: &mut BTreeMap<Vec<u8>, StoredValue>, mutation: &Mutation) {
    match &mutation.op {
        MutationOp::Set(value) => {
            base.insert(
                mutation.key.clone(),
                StoredValue {
                    value: value.clone(),
                    class: mutation.class.clone(),
                },
            );
        }
        MutationOp::Clear => {
            base.remove(&mutation.key);
        }
    }
}

/// Materializes the configuration as of `at` (`None` means the current
/// version), optionally restricted to one config class.
///
/// Fails with `VersionTooOld` below the floor and `VersionNotFound` beyond
/// the log head. At the floor itself the result is the base snapshot alone.
pub fn materialize(
    log: &MutationLog,
    at: Option<Version>,
    filter: Option<&ClassFilter>,
) -> Result<MaterializedConfig, StoreError> {
    let current = log.current_version();
    let at = at.unwrap_or(current);
    if at < log.floor_version() {
        return Err(StoreError::VersionTooOld {
            requested: at,
            floor: log.floor_version(),
        });
    }
    if at > current {
        return Err(StoreError::VersionNotFound {
            requested: at,
            current,
        });
    }

    let mut snapshot: BTreeMap<Vec<u8>, StoredValue> = match filter {
        Some(filter) => log
            .base()
            .iter()
            .filter(|(_, stored)| filter.matches(stored.class.as_deref()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        None => log.base().clone(),
    };

    for (_, batch) in log.batches_through(at) {
        for mutation in batch {
            if filter.map_or(true, |f| mutation.matches(f)) {
                apply_mutation(&mut snapshot, mutation);
            }
        }
    }

    Ok(MaterializedConfig {
        version: at,
        data: snapshot
            .into_iter()
            .map(|(k, stored)| (k, stored.value))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entry::Mutation;

    fn sample_log() -> MutationLog {
        let mut log = MutationLog::new();
        log.append(vec![Mutation::set(b"a".to_vec(), b"1".to_vec())]);
        log.append(vec![
            Mutation::set(b"b".to_vec(), b"2".to_vec()),
            Mutation::clear(b"a".to_vec()),
        ]);
        log.append(vec![Mutation::set(b"a".to_vec(), b"3".to_vec())]);
        log
    }

    #[test]
    fn test_materialize_replays_in_order() {
        let log = sample_log();

        let at0 = materialize(&log, Some(0), None).unwrap();
        assert_eq!(at0.version, 0);
        assert_eq!(at0.data.get(b"a".as_slice()), Some(&b"1".to_vec()));
        assert_eq!(at0.data.len(), 1);

        let at1 = materialize(&log, Some(1), None).unwrap();
        assert_eq!(at1.data.get(b"a".as_slice()), None);
        assert_eq!(at1.data.get(b"b".as_slice()), Some(&b"2".to_vec()));

        let at2 = materialize(&log, Some(2), None).unwrap();
        assert_eq!(at2.data.get(b"a".as_slice()), Some(&b"3".to_vec()));
        assert_eq!(at2.data.get(b"b".as_slice()), Some(&b"2".to_vec()));
    }

    #[test]
    fn test_materialize_defaults_to_current_version() {
        let log = sample_log();
        let latest = materialize(&log, None, None).unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest, materialize(&log, Some(2), None).unwrap());
    }

    #[test]
    fn test_materialize_version_bounds() {
        let log = sample_log();
        assert!(matches!(
            materialize(&log, Some(-2), None),
            Err(StoreError::VersionTooOld { .. })
        ));
        assert!(matches!(
            materialize(&log, Some(3), None),
            Err(StoreError::VersionNotFound {
                requested: 3,
                current: 2
            })
        ));
    }

    #[test]
    fn test_materialize_empty_log_at_no_version() {
        let log = MutationLog::new();
        let snap = materialize(&log, None, None).unwrap();
        assert_eq!(snap.version, -1);
        assert!(snap.data.is_empty());
    }

    #[test]
    fn test_filtered_materialize_is_a_projection() {
        let mut log = MutationLog::new();
        log.append(vec![
            Mutation::set(b"s/cache".to_vec(), b"64".to_vec()).in_class(b"storage".to_vec()),
            Mutation::set(b"p/conns".to_vec(), b"8".to_vec()).in_class(b"proxy".to_vec()),
        ]);
        log.append(vec![
            Mutation::set(b"s/cache".to_vec(), b"128".to_vec()).in_class(b"storage".to_vec()),
            Mutation::set(b"global".to_vec(), b"on".to_vec()),
        ]);

        let filter = ClassFilter::new(b"storage".to_vec());
        let full = materialize(&log, None, None).unwrap();
        let filtered = materialize(&log, None, Some(&filter)).unwrap();

        assert_eq!(filtered.data.len(), 1);
        assert_eq!(
            filtered.data.get(b"s/cache".as_slice()),
            full.data.get(b"s/cache".as_slice())
        );
        assert_eq!(filtered.data.get(b"p/conns".as_slice()), None);
        assert_eq!(filtered.data.get(b"global".as_slice()), None);
    }

    #[test]
    fn test_filtered_materialize_sees_base_classes_after_fold() {
        let mut log = MutationLog::new();
        log.append(vec![
            Mutation::set(b"s/cache".to_vec(), b"64".to_vec()).in_class(b"storage".to_vec()),
            Mutation::set(b"p/conns".to_vec(), b"8".to_vec()).in_class(b"proxy".to_vec()),
        ]);

        // Fold version 0 into the base; the class tags must survive.
        let mut base = BTreeMap::new();
        for (_, batch) in log.batches_through(0) {
            for m in batch {
                apply_mutation(&mut base, m);
            }
        }
        log.install_compaction(0, base);

        let filter = ClassFilter::new(b"storage".to_vec());
        let filtered = materialize(&log, None, Some(&filter)).unwrap();
        assert_eq!(filtered.data.len(), 1);
        assert_eq!(filtered.data.get(b"s/cache".as_slice()), Some(&b"64".to_vec()));
    }
}
