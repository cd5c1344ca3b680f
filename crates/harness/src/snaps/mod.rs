use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::warn;

/// A snapshot file candidate: path plus modification timestamp. External
/// artifacts; this module only reads and ranks them.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Selects the most recent cluster of snapshots, newest first.
///
/// Entries are ranked by modification time descending. With an age limit,
/// anything older than `now - limit` is dropped; `None` disables the age
/// filter entirely. Every retained entry within `group_threshold` of the
/// newest timestamp is included, which absorbs hosts that emit several
/// near-simultaneous files for one logical capture.
pub fn select_recent_entries(
    mut entries: Vec<SnapshotEntry>,
    now: SystemTime,
    time_from_now_limit: Option<Duration>,
    group_threshold: Duration,
) -> Vec<PathBuf> {
    let mut result = Vec::new();
    if entries.is_empty() {
        return result;
    }

    entries.sort_by(|a, b| b.modified.cmp(&a.modified));
    let latest = entries[0].modified;
    let cutoff = time_from_now_limit.and_then(|limit| now.checked_sub(limit));

    for entry in entries {
        if let Some(cutoff) = cutoff {
            if entry.modified < cutoff {
                break;
            }
        }
        let from_latest = latest
            .duration_since(entry.modified)
            .unwrap_or(Duration::ZERO);
        if from_latest < group_threshold {
            result.push(entry.path);
        }
    }
    result
}

/// Scans `dir` and selects the most recent snapshot cluster. A missing or
/// unreadable directory is a warning and an empty result, never an error.
pub fn latest_snapshots(
    dir: &Path,
    time_from_now_limit: Option<Duration>,
    group_threshold: Duration,
) -> Vec<PathBuf> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(error) => {
            warn!(dir = %dir.display(), error = %error, "snapshot_dir_unreadable");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(dir = %dir.display(), error = %error, "snapshot_dir_entry_unreadable");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = match entry.metadata().and_then(|metadata| metadata.modified()) {
            Ok(modified) => modified,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "snapshot_mtime_unreadable");
                continue;
            }
        };
        entries.push(SnapshotEntry { path, modified });
    }

    select_recent_entries(entries, SystemTime::now(), time_from_now_limit, group_threshold)
}

/// Drops byte-identical duplicates from a selected group, keeping the first
/// occurrence. Unreadable files are kept so a later assertion can report the
/// real failure.
pub fn dedupe_identical(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::<String>::new();
    let mut result = Vec::with_capacity(paths.len());
    for path in paths {
        match fs::read(path) {
            Ok(bytes) => {
                let digest = sha256_hex(&bytes);
                if seen.insert(digest) {
                    result.push(path.clone());
                }
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "snapshot_unreadable_kept");
                result.push(path.clone());
            }
        }
    }
    result
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Best-effort image dimension probe for diagnostics. Never fatal.
pub fn snapshot_dimensions(path: &Path) -> Option<(u32, u32)> {
    image::image_dimensions(path).ok()
}
