//! Artist segments: enumeration of the library root and per-artist track counts.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extensions (lowercase, no dot) the submission program picks up.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "mp4", "ogg", "wma"];

/// The library root could not be listed. Fatal: there is nothing to iterate.
#[derive(Debug, thiserror::Error)]
#[error("cannot read music directory {}: {source}", .path.display())]
pub struct LibraryError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Derived per-run state of an artist; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    /// No eligible tracks in the folder.
    NoWork,
    /// Every track already has a `done` record.
    AlreadyComplete,
    /// Needs submission (also when the completed count is unknown).
    Pending,
}

impl SegmentStatus {
    /// `completed` is `None` when the store could not be read.
    pub fn classify(total: u64, completed: Option<u64>) -> Self {
        match completed {
            _ if total == 0 => SegmentStatus::NoWork,
            Some(done) if done >= total => SegmentStatus::AlreadyComplete,
            _ => SegmentStatus::Pending,
        }
    }
}

/// One artist folder with the counts observed this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub name: String,
    pub total_items: u64,
    pub completed_items: Option<u64>,
}

impl Segment {
    pub fn status(&self) -> SegmentStatus {
        SegmentStatus::classify(self.total_items, self.completed_items)
    }
}

/// Immediate subdirectories of `root`, sorted lexicographically.
///
/// Hidden directories and plain files are not artists. Names that are not
/// valid UTF-8 are skipped with a warning since they cannot be forwarded as
/// an `--artist` selector.
pub fn list_segments(root: &Path) -> Result<Vec<String>, LibraryError> {
    let err = |source| LibraryError {
        path: root.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(root).map_err(err)? {
        let entry = entry.map_err(err)?;
        if !entry.path().is_dir() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!("skipping non UTF-8 folder name {:?}", entry.file_name());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Regular files, and symlinks that resolve to one.
fn is_track_file(e: &DirEntry) -> bool {
    e.file_type().is_file() || (e.path_is_symlink() && e.path().is_file())
}

/// Recursively count eligible tracks under `dir`. Unreadable entries are skipped.
pub fn count_tracks(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| is_track_file(e) && is_supported(e.path()))
        .count() as u64
}
