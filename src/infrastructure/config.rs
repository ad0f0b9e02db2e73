//! Configuration file management.
//!
//! TOML file under the data directory plus environment overrides for the
//! backend locations.

use std::fs;
use std::path::Path;

use crate::domain::{AppConfig, AppError, Result};

/// Environment variable overriding the cloud base URL.
pub const ENV_CLOUD_URL: &str = "JARVIS_CLOUD_API_URL";
/// Environment variable overriding the engine base URL.
pub const ENV_ENGINE_URL: &str = "JARVIS_ENGINE_API_URL";
/// Environment variable overriding the engine WebSocket base URL.
pub const ENV_ENGINE_WS_URL: &str = "JARVIS_ENGINE_WS_URL";

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# Jarvis sync configuration
# Written by `jarvis-sync config init`

[backends]
# Remote account/template service
cloud_url = "http://localhost:8080"

# Local automation engine
engine_url = "http://localhost:8000"

# WebSocket base of the engine (defaults to engine_url with a ws:// scheme)
# engine_ws_url = "ws://localhost:8000"

[http]
# Request timeout in milliseconds
timeout_ms = 30000

[monitor]
# Interval between health checks in milliseconds
interval_ms = 30000

# Timeout of a single health check in milliseconds
health_timeout_ms = 3000

[system]
# Interval between system metric polls in milliseconds
poll_interval_ms = 5000

[paths]
# Custom data directory (optional, defaults to ~/.jarvis)
# data_dir = "/custom/path"
"#;

/// Where the configuration lives when no data directory is configured yet.
#[must_use]
pub fn default_config_path() -> std::path::PathBuf {
    AppConfig::default_data_dir().join("config.toml")
}

/// Defaults, overlaid with `config.toml` when present, then with the
/// `JARVIS_*` environment variables.
///
/// # Errors
/// Fails when the file exists but is unreadable or malformed.
pub fn load_config() -> Result<AppConfig> {
    let path = default_config_path();
    let config = if path.exists() {
        load_config_from_file(&path)?
    } else {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        AppConfig::default()
    };
    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

/// Parse one TOML file. Missing sections and keys take their defaults.
///
/// # Errors
/// Fails when the file is unreadable or malformed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Cannot read {}", path.display()), e))?;
    toml::from_str(&raw).map_err(|e| AppError::Config {
        message: format!("{}: {e}", path.display()),
    })
}

/// Override backend locations from the environment. Blank values are ignored.
pub fn apply_env_overrides(
    mut config: AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> AppConfig {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty(ENV_CLOUD_URL) {
        tracing::debug!(%url, "cloud url from environment");
        config.backends.cloud_url = url;
    }
    if let Some(url) = non_empty(ENV_ENGINE_URL) {
        tracing::debug!(%url, "engine url from environment");
        config.backends.engine_url = url;
    }
    if let Some(url) = non_empty(ENV_ENGINE_WS_URL) {
        config.backends.engine_ws_url = Some(url);
    }

    config
}

/// Write the commented default file unless one is already there.
/// Returns whether a file was written.
///
/// # Errors
/// Fails when the directory or file cannot be created.
pub fn ensure_config_exists() -> Result<bool> {
    write_default_config(&default_config_path())
}

fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::io(format!("Cannot create {}", dir.display()), e))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| AppError::io(format!("Cannot write {}", path.display()), e))?;
    tracing::info!(path = %path.display(), "Wrote default configuration");
    Ok(true)
}
