//! Append-only versioned mutation log
//!
//! The log and the base snapshot together are the sole durable state of the
//! store: replaying every retained entry on top of the base snapshot yields
//! the configuration at the most recent version.

use std::collections::BTreeMap;

use super::entry::{Mutation, StoredValue, VersionedMutation};
use super::{StoreError, Version, INVALID_VERSION};

/// The in-memory ledger: a base snapshot materialized at the floor version
/// plus every mutation batch committed after it, keyed by version.
#[derive(Debug, Clone, Default)]
pub struct MutationLog {
    base: BTreeMap<Vec<u8>, StoredValue>,
    entries: BTreeMap<Version, Vec<Mutation>>,
    floor: Version,
}

impl MutationLog {
    pub fn new() -> Self {
        MutationLog {
            base: BTreeMap::new(),
            entries: BTreeMap::new(),
            floor: INVALID_VERSION,
        }
    }

    /// Rebuilds a log from recovered state. Entries at or below the floor
    /// are rejected by the durable layer before this is called.
    pub(crate) fn from_parts(
        floor: Version,
        base: BTreeMap<Vec<u8>, StoredValue>,
        entries: BTreeMap<Version, Vec<Mutation>>,
    ) -> Self {
        MutationLog {
            base,
            entries,
            floor,
        }
    }

    /// The most recent committed version, or -1 if nothing was ever
    /// committed. After compaction truncated the whole log this is the
    /// floor itself: the base snapshot still reflects that version.
    pub fn current_version(&self) -> Version {
        match self.entries.keys().next_back() {
            Some(v) => *v,
            None => self.floor,
        }
    }

    /// The oldest version below which individual mutations are no longer
    /// retrievable.
    pub fn floor_version(&self) -> Version {
        self.floor
    }

    /// Number of retained mutation batches.
    pub fn window_len(&self) -> usize {
        self.entries.len()
    }

    /// Appends one batch atomically under the next version and returns the
    /// assigned version. A batch may be empty; it still consumes a version.
    pub fn append(&mut self, mutations: Vec<Mutation>) -> Version {
        let version = self.current_version() + 1;
        self.entries.insert(version, mutations);
        version
    }

    /// All entries with version > `last_seen`, flattened into
    /// (version, mutation) pairs in ascending version order.
    ///
    /// Fails with `StaleVersion` when the caller has fallen below the
    /// retained floor and must resynchronize via a full snapshot. A caller
    /// that is already current (or ahead) gets an empty list.
    pub fn entries_since(&self, last_seen: Version) -> Result<Vec<VersionedMutation>, StoreError> {
        if last_seen < self.floor {
            return Err(StoreError::StaleVersion {
                requested: last_seen,
                floor: self.floor,
            });
        }
        let mut out = Vec::new();
        for (version, batch) in self.entries.range(last_seen + 1..) {
            for mutation in batch {
                out.push(VersionedMutation {
                    version: *version,
                    mutation: mutation.clone(),
                });
            }
        }
        Ok(out)
    }

    pub(crate) fn base(&self) -> &BTreeMap<Vec<u8>, StoredValue> {
        &self.base
    }

    /// Batches with version in `(floor, up_to]`, ascending.
    pub(crate) fn batches_through(
        &self,
        up_to: Version,
    ) -> impl Iterator<Item = (&Version, &Vec<Mutation>)> {
        self.entries.range(..=up_to)
    }

    /// Replaces the base snapshot and discards every entry at or below the
    /// new floor. Only ever called by the compactor.
    pub(crate) fn install_compaction(
        &mut self,
        floor: Version,
        base: BTreeMap<Vec<u8>, StoredValue>,
    ) {
        self.entries = self.entries.split_off(&(floor + 1));
        self.base = base;
        self.floor = floor;
    }
}
