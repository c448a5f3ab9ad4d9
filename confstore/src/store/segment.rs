use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::Version;

const HEADER_SIZE: u64 = 16; // 8 bytes start_version + 8 bytes end_version
const RECORD_HEADER_SIZE: u64 = 8; // 8 bytes record size

/// An on-disk append-only record file covering a contiguous version range.
/// One record per version, size-prefixed; positions are rebuilt by a scan
/// when an existing file is reopened.
#[derive(Debug)]
pub struct Segment {
    file: File,
    start_version: Version,
    end_version: Version,
    path: String,
    record_positions: BTreeMap<Version, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SegmentHeader {
    start_version: Version,
    end_version: Version,
}

impl Segment {
    pub fn open<P: AsRef<Path>>(path: P, start_version: Version) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut segment = Segment {
            file,
            start_version,
            end_version: start_version - 1,
            path: path.as_ref().to_string_lossy().to_string(),
            record_positions: BTreeMap::new(),
        };

        if segment.file.metadata()?.len() == 0 {
            segment.write_header()?;
        } else {
            segment.read_header()?;
            segment.rebuild_record_positions()?;
        }

        Ok(segment)
    }

    fn write_header(&mut self) -> io::Result<()> {
        let header = SegmentHeader {
            start_version: self.start_version,
            end_version: self.end_version,
        };

        let header_bytes =
            bincode::serialize(&header).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_header(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut header_bytes = vec![0u8; HEADER_SIZE as usize];
        self.file.read_exact(&mut header_bytes)?;

        let header: SegmentHeader = bincode::deserialize(&header_bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        self.start_version = header.start_version;
        self.end_version = header.end_version;
        Ok(())
    }

    fn write_record_header(&mut self, size: u64) -> io::Result<()> {
        let size_bytes = size.to_le_bytes();
        self.file.write_all(&size_bytes)?;
        Ok(())
    }

    fn read_record_header(&mut self) -> io::Result<u64> {
        let mut size_bytes = [0u8; 8];
        self.file.read_exact(&mut size_bytes)?;
        Ok(u64::from_le_bytes(size_bytes))
    }

    fn rebuild_record_positions(&mut self) -> io::Result<()> {
        self.record_positions.clear();
        let mut pos = HEADER_SIZE;

        while pos < self.file.metadata()?.len() {
            self.file.seek(SeekFrom::Start(pos))?;
            let record_size = self.read_record_header()?;
            let version = self.start_version + (self.record_positions.len() as Version);
            self.record_positions.insert(version, pos);
            pos += RECORD_HEADER_SIZE + record_size;
        }

        Ok(())
    }

    /// Appends the record for `version`, which must be the next version in
    /// this segment's range.
    pub fn append_record(&mut self, version: Version, record: &[u8]) -> io::Result<()> {
        if version != self.end_version + 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Record version not contiguous",
            ));
        }

        let pos = self.file.seek(SeekFrom::End(0))?;
        self.write_record_header(record.len() as u64)?;
        self.file.write_all(record)?;

        self.record_positions.insert(version, pos);
        self.end_version = version;
        self.write_header()?;
        Ok(())
    }

    pub fn read_record(&mut self, version: Version) -> io::Result<Vec<u8>> {
        if version < self.start_version || version > self.end_version {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Version out of range",
            ));
        }

        let pos = self.record_positions.get(&version).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Record position not found")
        })?;

        self.file.seek(SeekFrom::Start(*pos))?;
        let record_size = self.read_record_header()?;

        let mut record = vec![0u8; record_size as usize];
        self.file.read_exact(&mut record)?;
        Ok(record)
    }

    /// Deletes the backing file. Used when compaction has folded every
    /// record of this segment into the base snapshot.
    pub fn remove(self) -> io::Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(path)
    }

    pub fn start_version(&self) -> Version {
        self.start_version
    }

    pub fn end_version(&self) -> Version {
        self.end_version
    }

    pub fn is_empty(&self) -> bool {
        self.end_version < self.start_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_segment_creation() {
        let temp_file = NamedTempFile::new().unwrap();
        let segment = Segment::open(temp_file.path(), 1).unwrap();

        assert_eq!(segment.start_version(), 1);
        assert_eq!(segment.end_version(), 0);
        assert!(segment.is_empty());
    }

    #[test]
    fn test_segment_append_and_read() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut segment = Segment::open(temp_file.path(), 1).unwrap();

        segment.append_record(1, b"first record").unwrap();
        segment.append_record(2, b"second record").unwrap();

        assert_eq!(segment.end_version(), 2);
        assert!(!segment.is_empty());

        assert_eq!(segment.read_record(1).unwrap(), b"first record");
        assert_eq!(segment.read_record(2).unwrap(), b"second record");
        assert!(segment.read_record(3).is_err());
    }

    #[test]
    fn test_segment_rejects_gaps() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut segment = Segment::open(temp_file.path(), 0).unwrap();

        segment.append_record(0, b"zero").unwrap();
        assert!(segment.append_record(2, b"two").is_err());
    }

    #[test]
    fn test_segment_reopen_rebuilds_positions() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let mut segment = Segment::open(temp_file.path(), 4).unwrap();
            segment.append_record(4, b"four").unwrap();
            segment.append_record(5, b"five").unwrap();
        }

        let mut segment = Segment::open(temp_file.path(), 4).unwrap();
        assert_eq!(segment.start_version(), 4);
        assert_eq!(segment.end_version(), 5);
        assert_eq!(segment.read_record(4).unwrap(), b"four");
        assert_eq!(segment.read_record(5).unwrap(), b"five");
    }
}
