use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use harness::CategoryReport;

const JOURNAL_VERSION: u32 = 1;

#[derive(Serialize)]
struct SessionJournal<'a> {
    journal_version: u32,
    categories: &'a [CategoryReport],
}

fn journal_path(root: &Path) -> PathBuf {
    root.join("saved").join("reports").join("session_journal.json")
}

/// Writes the closed-category reports as a pretty JSON journal under the
/// root, creating the reports directory as needed.
pub(crate) fn write_session_journal(
    root: &Path,
    categories: &[CategoryReport],
) -> Result<PathBuf, String> {
    let journal = SessionJournal {
        journal_version: JOURNAL_VERSION,
        categories,
    };
    let path = journal_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| format!("create reports dir '{}': {error}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&journal)
        .map_err(|error| format!("encode journal json: {error}"))?;
    fs::write(&path, json)
        .map_err(|error| format!("write journal '{}': {error}", path.display()))?;
    info!(path = %path.display(), categories = categories.len(), "session_journal_written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use harness::{Outcome, OutcomeRecord};

    use super::*;

    #[test]
    fn journal_round_trips_reports_to_disk() {
        let temp = TempDir::new().expect("tempdir");
        let reports = vec![CategoryReport {
            id: 0,
            summary: "PASS | FAILED".to_string(),
            outcomes: vec![
                OutcomeRecord {
                    outcome: Outcome::Pass,
                    messages: vec![],
                },
                OutcomeRecord {
                    outcome: Outcome::Failed,
                    messages: vec!["step broke".to_string()],
                },
            ],
        }];

        let path = write_session_journal(temp.path(), &reports).expect("write");
        let raw = fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");

        assert_eq!(value["journal_version"], 1);
        assert_eq!(value["categories"][0]["id"], 0);
        assert_eq!(value["categories"][0]["summary"], "PASS | FAILED");
        assert_eq!(value["categories"][0]["outcomes"][1]["outcome"], "FAILED");
    }
}
