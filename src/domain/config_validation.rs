//! Configuration validation.
//!
//! Reads the engine and session sections through a [`ConfigPort`] and turns
//! them into an [`EngineConfig`], rejecting values the engine cannot use.

use crate::domain::error::ScriptError;
use crate::ports::config_port::ConfigPort;
use chrono_tz::Tz;
use std::path::PathBuf;

pub const DEFAULT_MAX_SWEEP_RUNS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Zone for concrete dates until a script sets one. `None` means UTC.
    pub timezone: Option<Tz>,
    pub max_sweep_runs: usize,
    pub session_path: Option<PathBuf>,
    pub restore_session: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: None,
            max_sweep_runs: DEFAULT_MAX_SWEEP_RUNS,
            session_path: None,
            restore_session: true,
        }
    }
}

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, ScriptError> {
    Ok(EngineConfig {
        timezone: validate_timezone(config)?,
        max_sweep_runs: validate_max_sweep_runs(config)?,
        session_path: session_path(config),
        restore_session: config.get_bool("session", "restore", true),
    })
}

fn validate_timezone(config: &dyn ConfigPort) -> Result<Option<Tz>, ScriptError> {
    match config.get_string("engine", "timezone") {
        None => Ok(None),
        Some(name) if name.trim().is_empty() => Ok(None),
        Some(name) => name
            .trim()
            .parse::<Tz>()
            .map(Some)
            .map_err(|_| ScriptError::ConfigInvalid {
                section: "engine".to_string(),
                key: "timezone".to_string(),
                reason: format!("unknown timezone '{}'", name.trim()),
            }),
    }
}

fn validate_max_sweep_runs(config: &dyn ConfigPort) -> Result<usize, ScriptError> {
    let value = config.get_int("engine", "max_sweep_runs", DEFAULT_MAX_SWEEP_RUNS as i64);
    if value < 1 {
        return Err(ScriptError::ConfigInvalid {
            section: "engine".to_string(),
            key: "max_sweep_runs".to_string(),
            reason: "max_sweep_runs must be at least 1".to_string(),
        });
    }
    usize::try_from(value).map_err(|_| ScriptError::ConfigInvalid {
        section: "engine".to_string(),
        key: "max_sweep_runs".to_string(),
        reason: "max_sweep_runs is too large".to_string(),
    })
}

fn session_path(config: &dyn ConfigPort) -> Option<PathBuf> {
    config
        .get_string("session", "path")
        .filter(|path| !path.trim().is_empty())
        .map(|path| PathBuf::from(path.trim()))
}
