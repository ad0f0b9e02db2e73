//! Host metrics, alerts, engine logs and installed software.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use super::{append, Loadable, StoreCell};
use crate::application::polling::Poller;
use crate::domain::{ApiFailure, Backend, LogLevel, SoftwareItem, SystemAlert, SystemLog, SystemMetrics};
use crate::infrastructure::RequestClient;

#[derive(Debug, Clone, Default)]
pub struct SystemState {
    pub metrics: Option<SystemMetrics>,
    /// Alerts raised by the engine or added locally, oldest first.
    pub alerts: Vec<SystemAlert>,
    pub software: Vec<SoftwareItem>,
    pub logs: Vec<SystemLog>,
    pub loading: bool,
}

impl Loadable for SystemState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

pub struct SystemStore {
    client: RequestClient,
    state: StoreCell<SystemState>,
    poller: Poller,
}

impl SystemStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(SystemState::default()),
            poller: Poller::new(),
        }
    }

    pub fn snapshot(&self) -> SystemState {
        self.state.snapshot()
    }

    /// Fetch current metrics. Alerts in the response are merged into the
    /// local list; locally added alerts survive a refresh.
    pub async fn load_status(&self) -> Result<SystemMetrics, ApiFailure> {
        let metrics = self
            .client
            .get::<SystemMetrics>(Backend::Engine, "/system/status")
            .await
            .into_result()?;
        self.state.update(|s| {
            for alert in &metrics.alerts {
                append(&mut s.alerts, alert.clone());
            }
            s.metrics = Some(metrics.clone());
        });
        Ok(metrics)
    }

    pub async fn scan_software(&self) -> Result<Vec<SoftwareItem>, ApiFailure> {
        let _loading = self.state.begin_loading();
        let software = self
            .client
            .post::<Vec<SoftwareItem>>(Backend::Engine, "/system/scan", &serde_json::json!({}))
            .await
            .into_result()?;
        debug!(count = software.len(), "Software scan finished");
        self.state.update(|s| s.software.clone_from(&software));
        Ok(software)
    }

    /// Replace the log view with the engine's most recent lines.
    pub async fn load_logs(
        &self,
        level: Option<LogLevel>,
        limit: Option<usize>,
    ) -> Result<Vec<SystemLog>, ApiFailure> {
        let _loading = self.state.begin_loading();
        let logs = self
            .client
            .get::<Vec<SystemLog>>(Backend::Engine, &logs_path(level, limit))
            .await
            .into_result()?;
        debug!(count = logs.len(), "Logs loaded");
        self.state.update(|s| s.logs.clone_from(&logs));
        Ok(logs)
    }

    /// Empty the local log view. The engine's logs are untouched.
    pub fn clear_logs(&self) {
        self.state.update(|s| s.logs.clear());
    }

    pub fn add_alert(&self, alert: SystemAlert) {
        self.state.update(|s| append(&mut s.alerts, alert));
    }

    /// Returns whether an alert with `id` was removed.
    pub fn clear_alert(&self, id: &str) -> bool {
        self.state.update(|s| {
            let before = s.alerts.len();
            s.alerts.retain(|alert| alert.id != id);
            s.alerts.len() != before
        })
    }

    pub fn clear_alerts(&self) {
        self.state.update(|s| s.alerts.clear());
    }

    /// Refresh metrics now and then every `interval`. A running loop is
    /// replaced.
    pub async fn start_polling(self: &Arc<Self>, interval: Duration) {
        let store = Arc::downgrade(self);
        self.poller
            .start(interval, move || poll_once(store.clone()))
            .await;
    }

    /// Returns whether a loop was running.
    pub async fn stop_polling(&self) -> bool {
        self.poller.stop().await
    }

    pub async fn is_polling(&self) -> bool {
        self.poller.is_running().await
    }
}

fn logs_path(level: Option<LogLevel>, limit: Option<usize>) -> String {
    let mut query = Vec::new();
    if let Some(level) = level {
        query.push(format!("level={}", level.as_str()));
    }
    if let Some(limit) = limit {
        query.push(format!("limit={limit}"));
    }
    if query.is_empty() {
        "/system/logs".to_string()
    } else {
        format!("/system/logs?{}", query.join("&"))
    }
}

async fn poll_once(store: Weak<SystemStore>) {
    let Some(store) = store.upgrade() else {
        return;
    };
    if let Err(err) = store.load_status().await {
        warn!(error = %err.message, "System status refresh failed");
    }
}
