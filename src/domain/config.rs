//! Application configuration model.
//!
//! Holds backend locations, timeouts and polling intervals. Loading from disk
//! and environment lives in `infrastructure::config`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::connection::Backend;

/// Fixed path prefix of cloud HTTP endpoints.
pub const CLOUD_API_PREFIX: &str = "/api/v1";
/// Fixed path prefix of engine HTTP endpoints.
pub const ENGINE_API_PREFIX: &str = "/engine";
/// Health endpoint path, relative to a backend's base URL.
pub const HEALTH_PATH: &str = "/health";

/// Backend base URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_cloud_url")]
    pub cloud_url: String,

    #[serde(default = "default_engine_url")]
    pub engine_url: String,

    /// WebSocket base; derived from `engine_url` when unset.
    #[serde(default)]
    pub engine_ws_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cloud_url: default_cloud_url(),
            engine_url: default_engine_url(),
            engine_ws_url: None,
        }
    }
}

fn default_cloud_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_engine_url() -> String {
    "http://localhost:8000".to_string()
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

const fn default_timeout_ms() -> u64 {
    30_000
}

/// Connection monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_monitor_interval_ms(),
            health_timeout_ms: default_health_timeout_ms(),
        }
    }
}

const fn default_monitor_interval_ms() -> u64 {
    30_000
}

const fn default_health_timeout_ms() -> u64 {
    3_000
}

/// System metrics polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    5_000
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backends: BackendConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".jarvis")
    }

    /// Persisted local state database.
    #[must_use]
    pub fn state_db_path(&self) -> PathBuf {
        self.data_dir().join("state.db")
    }

    /// File backing the native secure store.
    #[must_use]
    pub fn secure_store_path(&self) -> PathBuf {
        self.data_dir().join("secure.json")
    }

    /// Base URL of a backend, without trailing slash.
    #[must_use]
    pub fn base_url(&self, backend: Backend) -> &str {
        let url = match backend {
            Backend::Engine => &self.backends.engine_url,
            Backend::Cloud => &self.backends.cloud_url,
        };
        url.trim_end_matches('/')
    }

    /// Base URL plus the backend's API prefix.
    #[must_use]
    pub fn api_base(&self, backend: Backend) -> String {
        let prefix = match backend {
            Backend::Engine => ENGINE_API_PREFIX,
            Backend::Cloud => CLOUD_API_PREFIX,
        };
        format!("{}{prefix}", self.base_url(backend))
    }

    /// Health endpoint of a backend.
    #[must_use]
    pub fn health_url(&self, backend: Backend) -> String {
        format!("{}{HEALTH_PATH}", self.base_url(backend))
    }

    /// WebSocket base of the engine: the explicit setting, or `engine_url`
    /// with its scheme swapped to `ws`/`wss`.
    #[must_use]
    pub fn engine_ws_base(&self) -> String {
        if let Some(url) = &self.backends.engine_ws_url {
            return url.trim_end_matches('/').to_string();
        }
        let base = self.base_url(Backend::Engine);
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }

    /// Request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.http.timeout_ms)
    }

    /// Health-check timeout.
    #[must_use]
    pub const fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor.health_timeout_ms)
    }

    /// Connection monitor interval.
    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.interval_ms)
    }

    /// System metrics polling interval.
    #[must_use]
    pub const fn system_poll_interval(&self) -> Duration {
        Duration::from_millis(self.system.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.http.timeout_ms, 30_000);
        assert_eq!(config.monitor.health_timeout_ms, 3_000);
        assert_eq!(config.system.poll_interval_ms, 5_000);
    }

    #[test]
    fn test_api_bases() {
        let mut config = AppConfig::default();
        config.backends.cloud_url = "https://cloud.example.com/".into();
        assert_eq!(
            config.api_base(Backend::Cloud),
            "https://cloud.example.com/api/v1"
        );
        assert_eq!(
            config.api_base(Backend::Engine),
            "http://localhost:8000/engine"
        );
        assert_eq!(
            config.health_url(Backend::Cloud),
            "https://cloud.example.com/health"
        );
    }

    #[test]
    fn test_ws_base_derivation() {
        let mut config = AppConfig::default();
        assert_eq!(config.engine_ws_base(), "ws://localhost:8000");

        config.backends.engine_url = "https://engine.local".into();
        assert_eq!(config.engine_ws_base(), "wss://engine.local");

        config.backends.engine_ws_url = Some("ws://other:9000/".into());
        assert_eq!(config.engine_ws_base(), "ws://other:9000");
    }
}
