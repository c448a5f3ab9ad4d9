//! Durable storage layer
//!
//! Persists the mutation log as append-only segment files and the base
//! snapshot as a single file replaced atomically via a temp-file rename.
//! On startup the snapshot is loaded first, then every segment record above
//! the recovered floor is replayed into the in-memory log.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use super::entry::{Mutation, StoredValue};
use super::log::MutationLog;
use super::segment::Segment;
use super::{StoreError, Version, INVALID_VERSION};

/// Records per segment file before rolling over to a new one.
const SEGMENT_SPAN: Version = 1024;

const SNAPSHOT_FILE: &str = "snapshot";
const SNAPSHOT_TMP_FILE: &str = "snapshot.tmp";

/// One durable record: a mutation batch and the version that committed it.
#[derive(Debug, Serialize, Deserialize)]
struct VersionedBatch {
    version: Version,
    mutations: Vec<Mutation>,
}

/// The persisted base snapshot with its floor version.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    floor: Version,
    base: BTreeMap<Vec<u8>, StoredValue>,
}

pub struct DurableLog {
    base_path: PathBuf,
    segments: BTreeMap<Version, Segment>,
}

impl DurableLog {
    /// Opens (or initializes) the storage directory and rebuilds the
    /// in-memory log from the snapshot file plus all segment records above
    /// the snapshot's floor.
    pub fn open<P: AsRef<Path>>(base_path: P) -> Result<(Self, MutationLog), StoreError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let snapshot_path = base_path.join(SNAPSHOT_FILE);
        let (floor, base) = if snapshot_path.exists() {
            let snapshot_data = fs::read(&snapshot_path)?;
            let snapshot: SnapshotFile = bincode::deserialize(&snapshot_data)?;
            (snapshot.floor, snapshot.base)
        } else {
            (INVALID_VERSION, BTreeMap::new())
        };

        // Find all segment files, ordered by their start version.
        let mut segment_paths: BTreeMap<Version, PathBuf> = BTreeMap::new();
        for dir_entry in fs::read_dir(&base_path)? {
            let path = dir_entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            if let Some(start) = name
                .strip_prefix("segment_")
                .and_then(|s| s.strip_suffix(".log"))
                .and_then(|s| s.parse::<Version>().ok())
            {
                segment_paths.insert(start, path);
            }
        }

        let mut segments = BTreeMap::new();
        let mut entries: BTreeMap<Version, Vec<Mutation>> = BTreeMap::new();
        for (start, path) in segment_paths {
            let mut segment = Segment::open(&path, start)?;
            for version in start..=segment.end_version() {
                if version <= floor {
                    continue;
                }
                let record = segment.read_record(version)?;
                let batch: VersionedBatch = bincode::deserialize(&record)?;
                entries.insert(version, batch.mutations);
            }
            segments.insert(start, segment);
        }

        let durable = DurableLog {
            base_path,
            segments,
        };
        let log = MutationLog::from_parts(floor, base, entries);
        Ok((durable, log))
    }

    fn segment_path(&self, start_version: Version) -> PathBuf {
        self.base_path.join(format!("segment_{}.log", start_version))
    }

    /// The segment the next record goes into: the newest one while it is
    /// contiguous and below the span, a fresh one otherwise.
    fn segment_for_append(&mut self, version: Version) -> Result<&mut Segment, StoreError> {
        let reuse = match self.segments.values().next_back() {
            Some(last) => {
                last.end_version() + 1 == version
                    && last.end_version() - last.start_version() + 1 < SEGMENT_SPAN
            }
            None => false,
        };

        if !reuse {
            let path = self.segment_path(version);
            let segment = Segment::open(path, version)?;
            self.segments.insert(version, segment);
        }

        // The newest segment is now the append target either way.
        Ok(self.segments.values_mut().next_back().unwrap())
    }

    /// Persists one committed batch. Called before the batch becomes
    /// visible to readers, so an acknowledged commit is always on disk.
    pub fn append(&mut self, version: Version, mutations: &[Mutation]) -> Result<(), StoreError> {
        let record = bincode::serialize(&VersionedBatch {
            version,
            mutations: mutations.to_vec(),
        })?;
        let segment = self.segment_for_append(version)?;
        segment.append_record(version, &record)?;
        Ok(())
    }

    /// Persists a compaction result: writes the new base snapshot through a
    /// temp file, renames it over the old one, then deletes every segment
    /// whose records are all at or below the new floor.
    pub fn install_compaction(
        &mut self,
        floor: Version,
        base: &BTreeMap<Vec<u8>, StoredValue>,
    ) -> Result<(), StoreError> {
        let snapshot_path = self.base_path.join(SNAPSHOT_FILE);
        let temp_path = self.base_path.join(SNAPSHOT_TMP_FILE);

        let snapshot_data = bincode::serialize(&SnapshotFile {
            floor,
            base: base.clone(),
        })?;
        fs::write(&temp_path, &snapshot_data)?;
        if snapshot_path.exists() {
            fs::remove_file(&snapshot_path)?;
        }
        fs::rename(&temp_path, &snapshot_path)?;

        let to_remove: Vec<Version> = self
            .segments
            .iter()
            .filter(|(_, segment)| segment.end_version() <= floor)
            .map(|(start, _)| *start)
            .collect();
        for start in to_remove {
            if let Some(segment) = self.segments.remove(&start) {
                segment.remove()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::compact::Compaction;
    use crate::store::entry::Mutation;
    use crate::store::snapshot::materialize;
    use tempfile::tempdir;

    #[test]
    fn test_open_empty_directory() {
        let dir = tempdir().unwrap();
        let (_durable, log) = DurableLog::open(dir.path()).unwrap();
        assert_eq!(log.current_version(), INVALID_VERSION);
        assert_eq!(log.floor_version(), INVALID_VERSION);
    }

    #[test]
    fn test_appends_survive_restart() {
        let dir = tempdir().unwrap();
        {
            let (mut durable, mut log) = DurableLog::open(dir.path()).unwrap();
            for i in 0..5u8 {
                let batch = vec![Mutation::set(vec![i], vec![i])];
                let version = log.append(batch.clone());
                durable.append(version, &batch).unwrap();
            }
        }

        let (_durable, log) = DurableLog::open(dir.path()).unwrap();
        assert_eq!(log.current_version(), 4);
        assert_eq!(log.floor_version(), INVALID_VERSION);
        let snap = materialize(&log, None, None).unwrap();
        assert_eq!(snap.data.len(), 5);
    }

    #[test]
    fn test_compaction_survives_restart() {
        let dir = tempdir().unwrap();
        {
            let (mut durable, mut log) = DurableLog::open(dir.path()).unwrap();
            for i in 0..6u8 {
                let batch = vec![Mutation::set(vec![i], vec![i + 10])];
                let version = log.append(batch.clone());
                durable.append(version, &batch).unwrap();
            }
            let plan = Compaction::prepare(&log, 3).unwrap().unwrap();
            durable.install_compaction(plan.floor(), plan.base()).unwrap();
            plan.install(&mut log);
        }

        let (_durable, log) = DurableLog::open(dir.path()).unwrap();
        assert_eq!(log.floor_version(), 3);
        assert_eq!(log.current_version(), 5);
        assert_eq!(log.window_len(), 2);
        let snap = materialize(&log, None, None).unwrap();
        assert_eq!(snap.data.len(), 6);
        assert_eq!(snap.data.get([2u8].as_slice()), Some(&vec![12u8]));
    }

    #[test]
    fn test_append_after_recovery_continues_the_sequence() {
        let dir = tempdir().unwrap();
        {
            let (mut durable, mut log) = DurableLog::open(dir.path()).unwrap();
            for i in 0..3u8 {
                let batch = vec![Mutation::set(vec![i], vec![i])];
                let version = log.append(batch.clone());
                durable.append(version, &batch).unwrap();
            }
        }
        {
            let (mut durable, mut log) = DurableLog::open(dir.path()).unwrap();
            let batch = vec![Mutation::set(b"late".to_vec(), b"x".to_vec())];
            let version = log.append(batch.clone());
            assert_eq!(version, 3);
            durable.append(version, &batch).unwrap();
        }

        let (_durable, log) = DurableLog::open(dir.path()).unwrap();
        assert_eq!(log.current_version(), 3);
    }

    #[test]
    fn test_fully_compacted_store_reopens_and_accepts_appends() {
        let dir = tempdir().unwrap();
        {
            let (mut durable, mut log) = DurableLog::open(dir.path()).unwrap();
            for i in 0..4u8 {
                let batch = vec![Mutation::set(vec![i], vec![i])];
                let version = log.append(batch.clone());
                durable.append(version, &batch).unwrap();
            }
            let plan = Compaction::prepare(&log, 3).unwrap().unwrap();
            durable.install_compaction(plan.floor(), plan.base()).unwrap();
            plan.install(&mut log);
        }

        let (mut durable, mut log) = DurableLog::open(dir.path()).unwrap();
        assert_eq!(log.current_version(), 3);
        assert_eq!(log.window_len(), 0);

        // The next segment starts at the append version, not a span
        // boundary, so a fully-truncated log keeps accepting writes.
        let batch = vec![Mutation::set(b"next".to_vec(), b"y".to_vec())];
        let version = log.append(batch.clone());
        assert_eq!(version, 4);
        durable.append(version, &batch).unwrap();

        let (_durable, log) = DurableLog::open(dir.path()).unwrap();
        assert_eq!(log.current_version(), 4);
        assert_eq!(log.floor_version(), 3);
    }
}
