//! Configuration – reads `~/.steerwise/config.toml`.
//!
//! The file is only ever read: tuned gains live in memory for the lifetime of
//! the process and are not written back.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use steerwise_runtime::SessionConfig;
use steerwise_types::SteerError;

/// Top-level configuration file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Service name attached to exported traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default)]
    pub session: SessionConfig,
}

fn default_service_name() -> String {
    "steerwise".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            session: SessionConfig::default(),
        }
    }
}

/// Return the path to `~/.steerwise/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".steerwise").join("config.toml")
}

/// Resolve the configuration.
///
/// An explicit `path` must exist.  Without one, the default location is
/// tried and built-in defaults are used when it is absent.  Environment
/// overrides are applied in every case.
pub fn resolve(path: Option<&Path>) -> Result<Config, SteerError> {
    let mut cfg = match path {
        Some(p) => load_from(p)?.ok_or_else(|| SteerError::Config {
            path: p.display().to_string(),
            details: "file not found".to_string(),
        })?,
        None => load_from(&config_path())?.unwrap_or_default(),
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, SteerError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| SteerError::Config {
        path: path.display().to_string(),
        details: format!("failed to read: {e}"),
    })?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| SteerError::Config {
        path: path.display().to_string(),
        details: format!("failed to parse: {e}"),
    })?;
    Ok(Some(cfg))
}

/// Apply `STEERWISE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `STEERWISE_TUNING_SPEED` | `session.tuning_target_speed` |
/// | `STEERWISE_CRUISE_SPEED` | `session.cruise_target_speed` |
/// | `STEERWISE_WINDOW` | `session.retune.window_length` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("STEERWISE_TUNING_SPEED")
        && let Ok(speed) = v.parse::<f64>()
    {
        cfg.session.tuning_target_speed = speed;
    }
    if let Ok(v) = std::env::var("STEERWISE_CRUISE_SPEED")
        && let Ok(speed) = v.parse::<f64>()
    {
        cfg.session.cruise_target_speed = speed;
    }
    if let Ok(v) = std::env::var("STEERWISE_WINDOW")
        && let Ok(window) = v.parse::<u64>()
    {
        cfg.session.retune.window_length = window;
    }
}

/// Render `cfg` as TOML.
pub fn to_toml(cfg: &Config) -> Result<String, SteerError> {
    toml::to_string_pretty(cfg)
        .map_err(|e| SteerError::InvalidConfig(format!("failed to serialize config: {e}")))
}
