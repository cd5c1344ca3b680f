use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod command;
pub mod logscan;
pub mod ocr;
pub mod probe;
pub mod schedule;
pub mod session;
pub mod snaps;

pub use command::{
    parse_wire_call, CallArg, CallParseError, CallTarget, CommandEnvelope, ControllerHandle,
    EnvelopeError, ParsedCall, RemoteCall, ENVELOPE_FORMAT_VERSION,
};
pub use logscan::{
    contains_any, error_line_count, timestamped_error_lines, HostLogBuffer, NoOpLogBuffer,
};
pub use ocr::{
    assert_text, assert_text_with, check_snapshot, install_recognizer, recognizer,
    shutdown_recognizer, RecognizeError, RegionBounds, SnapExpectation, TextRecognizer,
    TextRegion, TextVerdict,
};
pub use probe::{read_probe_token, write_probe_file, ProbeError};
pub use schedule::{
    CommandTimeline, DelayQueue, DelayedCommandSink, NoOpCommandSink, ScheduledCommand,
};
pub use session::{
    outcome_color, result_box_field, rich_markup, BeginOutcome, CategoryReport, LogTint,
    NoOpPanel, Outcome, OutcomeColor, OutcomeRecord, RecordingPanel, ResultPanel, TestSession,
    LOG_FIELD, OUTPUT_FIELD, SUMMARY_ITEMIZED_LIMIT,
};
pub use snaps::{
    dedupe_identical, latest_snapshots, select_recent_entries, snapshot_dimensions, SnapshotEntry,
};

pub const ROOT_ENV_VAR: &str = "EDPROBE_ROOT";
pub const SNAPSHOT_DIR_ENV_VAR: &str = "EDPROBE_SNAPSHOT_DIR";
pub const CONTROLLER_ENV_VAR: &str = "EDPROBE_CONTROLLER";

/// Default name under which the host registers the test-controller instance.
pub const DEFAULT_CONTROLLER_INSTANCE: &str = "edprobe_controller";

#[derive(Debug, Clone)]
pub struct HarnessPaths {
    pub root: PathBuf,
    pub snapshot_dir: PathBuf,
    pub probe_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current working directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("{var} is set but does not point to an existing directory: {path}")]
    InvalidRoot { var: &'static str, path: PathBuf },
    #[error("failed to create probe directory at {path}: {source}")]
    CreateProbeDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("controller instance name cannot be empty")]
    EmptyControllerName,
}

pub fn resolve_harness_paths() -> Result<HarnessPaths, ConfigError> {
    let root = resolve_root()?;
    let snapshot_dir = match env::var(SNAPSHOT_DIR_ENV_VAR) {
        Ok(value) => PathBuf::from(value),
        Err(env::VarError::NotPresent) => root.join("saved").join("screenshots"),
        Err(source) => {
            return Err(ConfigError::EnvVar {
                var: SNAPSHOT_DIR_ENV_VAR,
                source,
            })
        }
    };
    let probe_dir = root.join("saved").join("probes");

    fs::create_dir_all(&probe_dir).map_err(|source| ConfigError::CreateProbeDir {
        path: probe_dir.clone(),
        source,
    })?;

    Ok(HarnessPaths {
        root,
        snapshot_dir,
        probe_dir,
    })
}

fn resolve_root() -> Result<PathBuf, ConfigError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            if raw.is_dir() {
                Ok(normalize_path(&raw))
            } else {
                Err(ConfigError::InvalidRoot {
                    var: ROOT_ENV_VAR,
                    path: raw,
                })
            }
        }
        Err(env::VarError::NotPresent) => {
            let cwd = env::current_dir().map_err(ConfigError::CurrentDir)?;
            Ok(normalize_path(&cwd))
        }
        Err(source) => Err(ConfigError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
