use std::env;
use std::fs;

use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use harness::{resolve_harness_paths, ControllerHandle, HarnessPaths};

use super::edport::EDPORT_DEFAULT_PORT;
use super::RunnerError;

const CONFIG_ENV_VAR: &str = "EDPROBE_CONFIG";
const EDPORT_ENV_VAR: &str = "EDPROBE_EDPORT";
const EDPORT_PORT_ENV_VAR: &str = "EDPROBE_EDPORT_PORT";

#[derive(Debug, Clone)]
pub(crate) struct RunnerConfig {
    pub(crate) edport_enabled: bool,
    pub(crate) edport_port: u16,
    pub(crate) run_demo: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            edport_enabled: false,
            edport_port: EDPORT_DEFAULT_PORT,
            run_demo: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawRunnerConfig {
    controller_instance: Option<String>,
    edport_enabled: Option<bool>,
    edport_port: Option<u16>,
    run_demo: Option<bool>,
}

pub(crate) struct RunnerWiring {
    pub(crate) config: RunnerConfig,
    pub(crate) paths: HarnessPaths,
    pub(crate) controller: ControllerHandle,
}

pub(crate) fn build_runner() -> Result<RunnerWiring, RunnerError> {
    init_tracing();
    info!("=== EdProbe Runner Startup ===");

    let raw = load_raw_config().map_err(RunnerError::LoadConfig)?;
    let mut config = RunnerConfig::default();
    if let Some(enabled) = raw.edport_enabled {
        config.edport_enabled = enabled;
    }
    if let Some(port) = raw.edport_port {
        config.edport_port = port;
    }
    if let Some(run_demo) = raw.run_demo {
        config.run_demo = run_demo;
    }
    apply_env_overrides(&mut config);

    let controller = match raw.controller_instance {
        Some(instance) => ControllerHandle::new(instance)?,
        None => ControllerHandle::from_env()?,
    };
    let paths = resolve_harness_paths()?;
    info!(
        root = %paths.root.display(),
        snapshot_dir = %paths.snapshot_dir.display(),
        probe_dir = %paths.probe_dir.display(),
        controller = controller.instance(),
        edport_enabled = config.edport_enabled,
        edport_port = config.edport_port,
        run_demo = config.run_demo,
        "runner_config"
    );

    Ok(RunnerWiring {
        config,
        paths,
        controller,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn load_raw_config() -> Result<RawRunnerConfig, String> {
    let Some(path) = env::var(CONFIG_ENV_VAR).ok().filter(|raw| !raw.is_empty()) else {
        return Ok(RawRunnerConfig::default());
    };
    let raw = fs::read_to_string(&path)
        .map_err(|error| format!("read config '{path}': {error}"))?;
    parse_runner_config_json(&raw)
}

fn parse_runner_config_json(raw: &str) -> Result<RawRunnerConfig, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, RawRunnerConfig>(&mut deserializer) {
        Ok(config) => Ok(config),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse config json: {source}"))
            } else {
                Err(format!("parse config json at {path}: {source}"))
            }
        }
    }
}

fn apply_env_overrides(config: &mut RunnerConfig) {
    if let Ok(raw) = env::var(EDPORT_ENV_VAR) {
        config.edport_enabled = raw == "1";
    }
    if let Ok(raw) = env::var(EDPORT_PORT_ENV_VAR) {
        if let Ok(port) = raw.parse::<u16>() {
            config.edport_port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_partial_documents() {
        let parsed =
            parse_runner_config_json(r#"{ "edport_enabled": true, "edport_port": 47000 }"#)
                .expect("parse");
        assert_eq!(parsed.edport_enabled, Some(true));
        assert_eq!(parsed.edport_port, Some(47000));
        assert_eq!(parsed.controller_instance, None);
        assert_eq!(parsed.run_demo, None);
    }

    #[test]
    fn config_errors_carry_the_failing_path() {
        let error = parse_runner_config_json(r#"{ "edport_port": "not-a-port" }"#)
            .expect_err("should fail");
        assert!(error.contains("edport_port"), "unexpected error: {error}");
    }
}
