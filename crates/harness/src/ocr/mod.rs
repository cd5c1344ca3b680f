use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::warn;

static RECOGNIZER: RwLock<Option<Arc<dyn TextRecognizer>>> = RwLock::new(None);
static RECOGNIZER_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_recognizer_lock_poison_once(operation: &'static str) {
    if RECOGNIZER_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "recognizer lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One recognized text region: bounding box plus the text read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRegion {
    pub bounds: RegionBounds,
    pub text: String,
}

impl TextRegion {
    pub fn new(bounds: RegionBounds, text: impl Into<String>) -> Self {
        Self {
            bounds,
            text: text.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("failed to open snapshot {path}: {source}")]
    OpenSnapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Engine(String),
}

/// Host-provided text recognition engine.
pub trait TextRecognizer: Send + Sync {
    fn read_text(&self, path: &Path) -> Result<Vec<TextRegion>, RecognizeError>;
}

/// Installs the process-wide recognizer. Idempotent: the first install wins
/// and later attempts are refused with a warning. Returns whether this call
/// installed it.
pub fn install_recognizer(recognizer: Arc<dyn TextRecognizer>) -> bool {
    let mut slot = match RECOGNIZER.write() {
        Ok(slot) => slot,
        Err(poisoned) => {
            warn_recognizer_lock_poison_once("install");
            poisoned.into_inner()
        }
    };
    if slot.is_some() {
        warn!("recognizer_already_installed");
        return false;
    }
    *slot = Some(recognizer);
    true
}

/// The installed recognizer, if any.
pub fn recognizer() -> Option<Arc<dyn TextRecognizer>> {
    let slot = match RECOGNIZER.read() {
        Ok(slot) => slot,
        Err(poisoned) => {
            warn_recognizer_lock_poison_once("read");
            poisoned.into_inner()
        }
    };
    slot.clone()
}

/// Releases the process-wide recognizer; intended for a process-exit hook.
/// Returns whether one was installed.
pub fn shutdown_recognizer() -> bool {
    let mut slot = match RECOGNIZER.write() {
        Ok(slot) => slot,
        Err(poisoned) => {
            warn_recognizer_lock_poison_once("shutdown");
            poisoned.into_inner()
        }
    };
    slot.take().is_some()
}

/// Outcome of a single on-screen text assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextVerdict {
    Pass,
    Failed,
    Warning(String),
    Error(String),
}

impl TextVerdict {
    /// Pass and soft-skip warnings count as non-failing.
    pub fn acceptable(&self) -> bool {
        matches!(self, TextVerdict::Pass | TextVerdict::Warning(_))
    }
}

impl fmt::Display for TextVerdict {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextVerdict::Pass => write!(formatter, "PASS"),
            TextVerdict::Failed => write!(formatter, "Failed"),
            TextVerdict::Warning(reason) => write!(formatter, "Warning: {reason}"),
            TextVerdict::Error(reason) => write!(formatter, "Error: {reason}"),
        }
    }
}

/// Asserts recognized text in `path` against `target` using the process-wide
/// recognizer. Soft-skips with a warning verdict when no recognizer is
/// installed.
pub fn assert_text(path: &Path, target: &str, strict: bool) -> TextVerdict {
    match recognizer() {
        Some(engine) => assert_text_with(engine.as_ref(), path, target, strict),
        None => TextVerdict::Warning("text recognizer not installed".to_string()),
    }
}

/// Strict mode passes only when exactly one region exists and its text equals
/// `target`; non-strict passes when any region's text contains `target`.
/// Recognizer failures are caught and surfaced as error verdicts.
pub fn assert_text_with(
    recognizer: &dyn TextRecognizer,
    path: &Path,
    target: &str,
    strict: bool,
) -> TextVerdict {
    if path.as_os_str().is_empty() {
        return TextVerdict::Error("snapshot path is empty".to_string());
    }
    if !path.exists() {
        return TextVerdict::Error(format!("snapshot file not found: {}", path.display()));
    }

    let regions = match recognizer.read_text(path) {
        Ok(regions) => regions,
        Err(error) => return TextVerdict::Error(error.to_string()),
    };

    let passed = if strict {
        regions.len() == 1 && regions[0].text == target
    } else {
        regions.iter().any(|region| region.text.contains(target))
    };

    if passed {
        TextVerdict::Pass
    } else {
        warn!(
            expected = target,
            strict,
            region_count = regions.len(),
            path = %path.display(),
            "text_assertion_failed"
        );
        TextVerdict::Failed
    }
}

/// Expectations for a whole snapshot: an optional recognized-region count
/// plus per-region expected substrings, where `"*"` matches anything.
#[derive(Debug, Clone, Default)]
pub struct SnapExpectation {
    pub region_count: Option<usize>,
    pub expected: Vec<String>,
}

/// Checks a snapshot against a [`SnapExpectation`]; mismatches are logged
/// individually and collapse into a failed verdict.
pub fn check_snapshot(
    recognizer: &dyn TextRecognizer,
    path: &Path,
    expectation: &SnapExpectation,
) -> TextVerdict {
    if path.as_os_str().is_empty() {
        return TextVerdict::Error("snapshot path is empty".to_string());
    }
    if !path.exists() {
        return TextVerdict::Error(format!("snapshot file not found: {}", path.display()));
    }
    let regions = match recognizer.read_text(path) {
        Ok(regions) => regions,
        Err(error) => return TextVerdict::Error(error.to_string()),
    };

    let mut mismatches = Vec::new();
    if let Some(expected_count) = expectation.region_count {
        if regions.len() != expected_count {
            mismatches.push(format!(
                "region count mismatch: expected {expected_count}, recognized {}",
                regions.len()
            ));
        }
    }
    for (expected, region) in expectation.expected.iter().zip(regions.iter()) {
        if expected == "*" {
            continue;
        }
        if !region.text.contains(expected) {
            mismatches.push(format!(
                "can't find \"{expected}\" in recognized text \"{}\"",
                region.text
            ));
        }
    }

    if mismatches.is_empty() {
        TextVerdict::Pass
    } else {
        for mismatch in &mismatches {
            warn!(path = %path.display(), mismatch = %mismatch, "snapshot_check_mismatch");
        }
        TextVerdict::Failed
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    struct FixedRecognizer {
        regions: Vec<TextRegion>,
    }

    impl TextRecognizer for FixedRecognizer {
        fn read_text(&self, _path: &Path) -> Result<Vec<TextRegion>, RecognizeError> {
            Ok(self.regions.clone())
        }
    }

    struct FailingRecognizer;

    impl TextRecognizer for FailingRecognizer {
        fn read_text(&self, _path: &Path) -> Result<Vec<TextRegion>, RecognizeError> {
            Err(RecognizeError::Engine("model weights missing".to_string()))
        }
    }

    fn region(text: &str) -> TextRegion {
        TextRegion::new(RegionBounds::default(), text)
    }

    fn snapshot_file(temp: &TempDir) -> PathBuf {
        let path = temp.path().join("shot.png");
        fs::write(&path, b"bytes").expect("write");
        path
    }

    #[test]
    fn strict_passes_only_single_exact_region() {
        let temp = TempDir::new().expect("tempdir");
        let path = snapshot_file(&temp);

        let exact = FixedRecognizer {
            regions: vec![region("Hello")],
        };
        assert_eq!(
            assert_text_with(&exact, &path, "Hello", true),
            TextVerdict::Pass
        );

        let two_regions = FixedRecognizer {
            regions: vec![region("Hello"), region("World")],
        };
        assert_eq!(
            assert_text_with(&two_regions, &path, "Hello", true),
            TextVerdict::Failed
        );

        let mismatch = FixedRecognizer {
            regions: vec![region("Hello there")],
        };
        assert_eq!(
            assert_text_with(&mismatch, &path, "Hello", true),
            TextVerdict::Failed
        );

        let none = FixedRecognizer { regions: vec![] };
        assert_eq!(
            assert_text_with(&none, &path, "Hello", true),
            TextVerdict::Failed
        );
    }

    #[test]
    fn substring_mode_passes_on_any_region() {
        let temp = TempDir::new().expect("tempdir");
        let path = snapshot_file(&temp);
        let recognizer = FixedRecognizer {
            regions: vec![region("menu bar"), region("Say Hello to the editor")],
        };
        assert_eq!(
            assert_text_with(&recognizer, &path, "Hello", false),
            TextVerdict::Pass
        );
        assert_eq!(
            assert_text_with(&recognizer, &path, "Goodbye", false),
            TextVerdict::Failed
        );
    }

    #[test]
    fn empty_and_missing_paths_are_errors() {
        let recognizer = FixedRecognizer { regions: vec![] };
        let empty = assert_text_with(&recognizer, Path::new(""), "x", false);
        assert_eq!(empty.to_string(), "Error: snapshot path is empty");

        let missing = assert_text_with(&recognizer, Path::new("/no/such/shot.png"), "x", false);
        assert!(missing.to_string().starts_with("Error: snapshot file not found"));
    }

    #[test]
    fn engine_failures_are_caught_not_propagated() {
        let temp = TempDir::new().expect("tempdir");
        let path = snapshot_file(&temp);
        let verdict = assert_text_with(&FailingRecognizer, &path, "x", false);
        assert_eq!(verdict.to_string(), "Error: model weights missing");
        assert!(!verdict.acceptable());
    }

    #[test]
    fn check_snapshot_counts_and_wildcards() {
        let temp = TempDir::new().expect("tempdir");
        let path = snapshot_file(&temp);
        let recognizer = FixedRecognizer {
            regions: vec![region("This is a notification"), region("details pane")],
        };

        let matching = SnapExpectation {
            region_count: Some(2),
            expected: vec!["notification".to_string(), "*".to_string()],
        };
        assert_eq!(
            check_snapshot(&recognizer, &path, &matching),
            TextVerdict::Pass
        );

        let wrong_count = SnapExpectation {
            region_count: Some(3),
            expected: Vec::new(),
        };
        assert_eq!(
            check_snapshot(&recognizer, &path, &wrong_count),
            TextVerdict::Failed
        );

        let wrong_text = SnapExpectation {
            region_count: None,
            expected: vec!["missing words".to_string()],
        };
        assert_eq!(
            check_snapshot(&recognizer, &path, &wrong_text),
            TextVerdict::Failed
        );
    }

    // Single test for the process-wide slot so parallel tests never observe
    // each other's installs.
    #[test]
    fn recognizer_slot_installs_once_and_shuts_down() {
        let temp = TempDir::new().expect("tempdir");
        let path = snapshot_file(&temp);

        assert_eq!(
            assert_text(&path, "Hello", false),
            TextVerdict::Warning("text recognizer not installed".to_string())
        );

        let first = Arc::new(FixedRecognizer {
            regions: vec![region("Hello")],
        });
        assert!(install_recognizer(first));
        let second = Arc::new(FixedRecognizer { regions: vec![] });
        assert!(!install_recognizer(second));

        assert_eq!(assert_text(&path, "Hello", false), TextVerdict::Pass);

        assert!(shutdown_recognizer());
        assert!(!shutdown_recognizer());
        assert!(recognizer().is_none());
    }

    #[test]
    fn verdicts_render_their_wire_strings() {
        assert_eq!(TextVerdict::Pass.to_string(), "PASS");
        assert_eq!(TextVerdict::Failed.to_string(), "Failed");
        assert_eq!(
            TextVerdict::Warning("no engine".to_string()).to_string(),
            "Warning: no engine"
        );
        assert_eq!(
            TextVerdict::Error("bad file".to_string()).to_string(),
            "Error: bad file"
        );
        assert!(TextVerdict::Warning("soft".to_string()).acceptable());
        assert!(!TextVerdict::Failed.acceptable());
    }
}
