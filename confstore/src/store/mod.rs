//! Versioned configuration store
//!
//! This module contains the core components of the configuration store:
//! - `entry`: mutation and filter types shared across the store
//! - `log`: the append-only versioned mutation log plus base snapshot
//! - `snapshot`: point-in-time materialization of the configuration
//! - `compact`: folding a log prefix into the base snapshot
//! - `segment`: on-disk append-only record files
//! - `durable`: persistence and recovery over segments and snapshot files
//! - `store`: the concurrent shared handle tying the pieces together

pub mod compact;
pub mod durable;
pub mod entry;
pub mod log;
pub mod segment;
pub mod snapshot;
pub mod store;

pub use compact::Compaction;
pub use entry::{ClassFilter, Mutation, MutationOp, StoredValue, VersionedMutation};
pub use self::log::MutationLog;
pub use snapshot::{materialize, MaterializedConfig};
pub use store::ConfigStore;

use thiserror::Error;

/// A point in the mutation log's history. Strictly increasing across the
/// log, starting at 0.
pub type Version = i64;

/// Reserved "no version" value: the current version of an empty store and
/// the initial floor.
pub const INVALID_VERSION: Version = -1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("last seen version {requested} is below the retained floor {floor}")]
    StaleVersion { requested: Version, floor: Version },

    #[error("version {requested} is older than the retained floor {floor}")]
    VersionTooOld { requested: Version, floor: Version },

    #[error("version {requested} is beyond the most recent version {current}")]
    VersionNotFound { requested: Version, current: Version },

    #[error("cannot compact to {requested}: log head is {current}")]
    InvalidCompactVersion { requested: Version, current: Version },

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage codec error: {0}")]
    Codec(#[from] bincode::Error),
}
