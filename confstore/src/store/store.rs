//! Concurrent store handle
//!
//! `ConfigStore` is the shared facade over the mutation log: many readers
//! in parallel, one writer and one compaction at a time. Readers take the
//! read lock only and receive owned copies; compaction folds into a fresh
//! snapshot off the write path and swaps it in under a brief write lock, so
//! reads are never stalled by the fold.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use super::compact::Compaction;
use super::durable::DurableLog;
use super::entry::{ClassFilter, Mutation, VersionedMutation};
use super::log::MutationLog;
use super::snapshot::{self, MaterializedConfig};
use super::{StoreError, Version};

#[derive(Clone)]
pub struct ConfigStore {
    state: Arc<RwLock<MutationLog>>,
    durable: Option<Arc<Mutex<DurableLog>>>,
    // Serializes append against compact; readers never take this.
    write_serial: Arc<Mutex<()>>,
}

impl ConfigStore {
    /// A volatile store. Used by tests and by deployments that replicate
    /// state entirely through the consensus layer.
    pub fn in_memory() -> Self {
        ConfigStore {
            state: Arc::new(RwLock::new(MutationLog::new())),
            durable: None,
            write_serial: Arc::new(Mutex::new(())),
        }
    }

    /// Opens a durable store rooted at `base_path`, recovering the log and
    /// base snapshot persisted by a previous run.
    pub fn open<P: AsRef<Path>>(base_path: P) -> Result<Self, StoreError> {
        let (durable, log) = DurableLog::open(base_path)?;
        Ok(ConfigStore {
            state: Arc::new(RwLock::new(log)),
            durable: Some(Arc::new(Mutex::new(durable))),
            write_serial: Arc::new(Mutex::new(())),
        })
    }

    pub fn current_version(&self) -> Version {
        self.state.read().unwrap().current_version()
    }

    pub fn floor_version(&self) -> Version {
        self.state.read().unwrap().floor_version()
    }

    pub fn window_len(&self) -> usize {
        self.state.read().unwrap().window_len()
    }

    /// Commits one batch atomically under the next version. The batch is
    /// persisted before it becomes visible to readers.
    pub fn append(&self, mutations: Vec<Mutation>) -> Result<Version, StoreError> {
        let _serial = self.write_serial.lock().unwrap();

        let version = self.state.read().unwrap().current_version() + 1;
        if let Some(durable) = &self.durable {
            durable.lock().unwrap().append(version, &mutations)?;
        }

        let assigned = self.state.write().unwrap().append(mutations);
        debug_assert_eq!(assigned, version);
        Ok(version)
    }

    /// All retained entries with version > `last_seen`, unfiltered.
    pub fn entries_since(&self, last_seen: Version) -> Result<Vec<VersionedMutation>, StoreError> {
        self.state.read().unwrap().entries_since(last_seen)
    }

    /// The incremental read path: entries since `last_seen` restricted to
    /// `filter`, plus the log head. The head is reported even when the
    /// filtered list is empty so a follower can tell "caught up" from
    /// "head advanced with nothing in my class".
    pub fn changes_since(
        &self,
        last_seen: Version,
        filter: Option<&ClassFilter>,
    ) -> Result<(Version, Vec<VersionedMutation>), StoreError> {
        let state = self.state.read().unwrap();
        let most_recent = state.current_version();
        let entries = state.entries_since(last_seen)?;
        drop(state);

        let entries = match filter {
            Some(filter) => entries
                .into_iter()
                .filter(|vm| vm.mutation.matches(filter))
                .collect(),
            None => entries,
        };
        Ok((most_recent, entries))
    }

    /// Materializes the configuration at `at` (`None` = current),
    /// optionally restricted to one config class.
    pub fn materialize(
        &self,
        at: Option<Version>,
        filter: Option<&ClassFilter>,
    ) -> Result<MaterializedConfig, StoreError> {
        snapshot::materialize(&self.state.read().unwrap(), at, filter)
    }

    /// Folds every entry at or below `up_to` into the base snapshot and
    /// advances the floor. Idempotent when already compacted past `up_to`.
    /// The new snapshot is durable before the swap, so an acknowledged
    /// compaction survives a restart.
    pub fn compact(&self, up_to: Version) -> Result<(), StoreError> {
        let _serial = self.write_serial.lock().unwrap();

        let plan = {
            let state = self.state.read().unwrap();
            Compaction::prepare(&state, up_to)?
        };
        let plan = match plan {
            Some(plan) => plan,
            None => return Ok(()),
        };

        if let Some(durable) = &self.durable {
            durable
                .lock()
                .unwrap()
                .install_compaction(plan.floor(), plan.base())?;
        }
        plan.install(&mut self.state.write().unwrap());
        Ok(())
    }
}
