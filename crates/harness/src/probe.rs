use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to create probe directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write probe file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read probe file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes the small marker file dialog-driven tests hand to the host and
/// later read back.
pub fn write_probe_file(path: &Path, token: &str) -> Result<(), ProbeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ProbeError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, format!("{token}\n")).map_err(|source| ProbeError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a probe file back, trimming the trailing newline.
pub fn read_probe_token(path: &Path) -> Result<String, ProbeError> {
    let raw = fs::read_to_string(path).map_err(|source| ProbeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(raw.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn probe_round_trips_through_disk() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("probe.txt");

        write_probe_file(&path, "Test").expect("write");
        assert_eq!(read_probe_token(&path).expect("read"), "Test");
    }

    #[test]
    fn missing_probe_file_reports_path() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("absent.txt");
        let error = read_probe_token(&path).expect_err("should fail");
        assert!(error.to_string().contains("absent.txt"));
    }
}
