//! Storage directory management.
//!
//! Segment files are spread across a set of storage directories:
//!
//! ```text
//! <dir>/
//! ├─ lastId      # hex of the most recently created segment ID
//! ├─ 0.log       # segment files, named by hex segment ID
//! ├─ 1.log
//! └─ ...
//! ```
//!
//! Every directory carries its own `lastId` marker; all markers are
//! rewritten when a segment is created, and the maximum across
//! directories decides the first segment ID after a restart.

use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use rand::Rng;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Marker file holding the most recently created segment ID.
const LAST_ID_FILE: &str = "lastId";
/// Temporary file for atomic marker replacement.
const LAST_ID_TEMP: &str = "lastId.tmp";

/// The set of storage directories segments are written to.
#[derive(Debug)]
pub struct LedgerDirs {
    dirs: Vec<PathBuf>,
}

impl LedgerDirs {
    /// Opens the directory set, creating any directory that is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the set is empty or a directory cannot be
    /// created.
    pub fn open(dirs: Vec<PathBuf>) -> CoreResult<Self> {
        if dirs.is_empty() {
            return Err(CoreError::invalid_config(
                "at least one ledger directory is required",
            ));
        }
        for dir in &dirs {
            fs::create_dir_all(dir)?;
        }
        Ok(Self { dirs })
    }

    /// Returns the configured directories.
    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Picks a directory for a new segment, uniformly at random.
    #[must_use]
    pub fn pick(&self) -> &Path {
        let index = rand::thread_rng().gen_range(0..self.dirs.len());
        &self.dirs[index]
    }

    /// Locates the file for a segment, searching every directory.
    #[must_use]
    pub fn find_segment_file(&self, segment_id: SegmentId) -> Option<PathBuf> {
        let filename = segment_id.filename();
        self.dirs
            .iter()
            .map(|dir| dir.join(&filename))
            .find(|path| path.exists())
    }

    /// Returns the highest segment ID recorded in any `lastId` marker.
    ///
    /// Directories with a missing or unparsable marker contribute
    /// nothing; `None` means no segment has ever been recorded.
    #[must_use]
    pub fn highest_marked_id(&self) -> Option<SegmentId> {
        self.dirs
            .iter()
            .filter_map(|dir| read_last_id(dir))
            .max()
    }

    /// Records `segment_id` in every directory's `lastId` marker.
    ///
    /// Each marker is replaced atomically: the new value is written to a
    /// temporary file, synced, renamed over the marker, and the directory
    /// is fsynced so the rename survives a crash.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error encountered; markers already rewritten
    /// stay rewritten.
    pub fn record_last_id(&self, segment_id: SegmentId) -> CoreResult<()> {
        for dir in &self.dirs {
            write_last_id(dir, segment_id)?;
        }
        Ok(())
    }
}

/// Reads a directory's `lastId` marker.
fn read_last_id(dir: &Path) -> Option<SegmentId> {
    let mut contents = String::new();
    File::open(dir.join(LAST_ID_FILE))
        .ok()?
        .read_to_string(&mut contents)
        .ok()?;
    let id = u64::from_str_radix(contents.trim(), 16).ok()?;
    Some(SegmentId::new(id))
}

/// Atomically replaces a directory's `lastId` marker.
fn write_last_id(dir: &Path, segment_id: SegmentId) -> CoreResult<()> {
    let temp_path = dir.join(LAST_ID_TEMP);
    let marker_path = dir.join(LAST_ID_FILE);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    writeln!(file, "{:x}", segment_id.as_u64())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, &marker_path)?;
    sync_directory(dir)?;

    Ok(())
}

/// Fsyncs a directory so file creations, renames, and deletions in it
/// are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(dir: &Path) -> CoreResult<()> {
    let handle = File::open(dir)?;
    handle.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_directory(_dir: &Path) -> CoreResult<()> {
    // NTFS journals metadata; an explicit directory fsync is unsupported.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_rejects_empty_set() {
        let result = LedgerDirs::open(Vec::new());
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn open_creates_directories() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");

        let dirs = LedgerDirs::open(vec![a.clone(), b.clone()]).unwrap();
        assert!(a.is_dir());
        assert!(b.is_dir());
        assert_eq!(dirs.dirs().len(), 2);
    }

    #[test]
    fn marker_round_trip() {
        let temp = tempdir().unwrap();
        let dirs = LedgerDirs::open(vec![temp.path().to_path_buf()]).unwrap();

        assert_eq!(dirs.highest_marked_id(), None);

        dirs.record_last_id(SegmentId::new(255)).unwrap();
        assert_eq!(dirs.highest_marked_id(), Some(SegmentId::new(255)));

        let contents = fs::read_to_string(temp.path().join("lastId")).unwrap();
        assert_eq!(contents, "ff\n");
    }

    #[test]
    fn marker_written_to_every_directory() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let dirs = LedgerDirs::open(vec![a.clone(), b.clone()]).unwrap();

        dirs.record_last_id(SegmentId::new(3)).unwrap();

        assert_eq!(fs::read_to_string(a.join("lastId")).unwrap(), "3\n");
        assert_eq!(fs::read_to_string(b.join("lastId")).unwrap(), "3\n");
    }

    #[test]
    fn highest_marker_wins() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let dirs = LedgerDirs::open(vec![a.clone(), b.clone()]).unwrap();

        // Directories can disagree after a crash mid-rewrite.
        fs::write(a.join("lastId"), "2\n").unwrap();
        fs::write(b.join("lastId"), "a\n").unwrap();

        assert_eq!(dirs.highest_marked_id(), Some(SegmentId::new(10)));
    }

    #[test]
    fn unparsable_marker_reads_as_absent() {
        let temp = tempdir().unwrap();
        let dirs = LedgerDirs::open(vec![temp.path().to_path_buf()]).unwrap();

        fs::write(temp.path().join("lastId"), "not hex\n").unwrap();
        assert_eq!(dirs.highest_marked_id(), None);
    }

    #[test]
    fn find_segment_file_searches_all_directories() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let dirs = LedgerDirs::open(vec![a.clone(), b.clone()]).unwrap();

        fs::write(b.join("5.log"), b"x").unwrap();

        assert_eq!(
            dirs.find_segment_file(SegmentId::new(5)),
            Some(b.join("5.log"))
        );
        assert_eq!(dirs.find_segment_file(SegmentId::new(6)), None);
    }

    #[test]
    fn pick_returns_configured_directory() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let dirs = LedgerDirs::open(vec![a.clone(), b.clone()]).unwrap();

        for _ in 0..16 {
            let picked = dirs.pick().to_path_buf();
            assert!(picked == a || picked == b);
        }
    }
}
