//! Backend health monitoring.
//!
//! Polls the health endpoint of each [`Backend`] and keeps the last observed
//! [`ConnectionState`]. Loss and recovery are logged and broadcast to
//! subscribers.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::{AppConfig, Backend, ConnectionChange, ConnectionState};
use crate::infrastructure::RequestClient;

use super::polling::Poller;

const CHANGE_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
struct Tracked {
    state: ConnectionState,
    /// A loss was reported and no recovery has been reported since.
    reported_down: bool,
}

struct MonitorState {
    client: RequestClient,
    health_urls: BTreeMap<Backend, String>,
    health_timeout: Duration,
    tracked: RwLock<BTreeMap<Backend, Tracked>>,
    changes: broadcast::Sender<ConnectionChange>,
}

impl MonitorState {
    async fn check(&self, backend: Backend) -> bool {
        let Some(url) = self.health_urls.get(&backend) else {
            return false;
        };
        let reachable = self.client.probe(url, self.health_timeout).await;
        debug!(backend = %backend, reachable, "Health check");
        reachable
    }

    async fn check_all(&self) {
        let results =
            futures::future::join_all(Backend::ALL.map(|b| async move { (b, self.check(b).await) }))
                .await;
        for (backend, reachable) in results {
            self.record(backend, reachable);
        }
    }

    fn record(&self, backend: Backend, reachable: bool) {
        let change = {
            let mut tracked = self.tracked.write().unwrap_or_else(PoisonError::into_inner);
            let entry = tracked.entry(backend).or_insert_with(|| Tracked {
                state: ConnectionState::unchecked(backend),
                reported_down: false,
            });
            entry.state.reachable = reachable;
            entry.state.last_checked_at = Some(Utc::now());

            if !reachable && !entry.reported_down {
                entry.reported_down = true;
                Some(ConnectionChange {
                    id: backend,
                    reachable,
                })
            } else if reachable && entry.reported_down {
                entry.reported_down = false;
                Some(ConnectionChange {
                    id: backend,
                    reachable,
                })
            } else {
                None
            }
        };

        if let Some(change) = change {
            if change.reachable {
                info!(backend = %backend, "Backend connection restored");
            } else {
                warn!(backend = %backend, "Backend unreachable");
            }
            let _ = self.changes.send(change);
        }
    }

    fn snapshot(&self) -> Vec<ConnectionState> {
        let tracked = self.tracked.read().unwrap_or_else(PoisonError::into_inner);
        Backend::ALL
            .iter()
            .map(|b| {
                tracked
                    .get(b)
                    .map_or_else(|| ConnectionState::unchecked(*b), |t| t.state.clone())
            })
            .collect()
    }
}

/// Periodic health checker for the engine and cloud backends.
pub struct ConnectionMonitor {
    state: Arc<MonitorState>,
    poller: Poller,
}

impl ConnectionMonitor {
    #[must_use]
    pub fn new(config: &AppConfig, client: RequestClient) -> Self {
        let health_urls = Backend::ALL
            .iter()
            .map(|b| (*b, config.health_url(*b)))
            .collect();
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);

        Self {
            state: Arc::new(MonitorState {
                client,
                health_urls,
                health_timeout: config.health_timeout(),
                tracked: RwLock::new(BTreeMap::new()),
                changes,
            }),
            poller: Poller::new(),
        }
    }

    /// Check every backend now, then every `interval`. Replaces a loop that
    /// is already running.
    pub async fn start_monitoring(&self, interval: Duration) {
        info!(interval_ms = interval.as_millis(), "Starting connection monitor");
        let state = Arc::clone(&self.state);
        self.poller
            .start(interval, move || {
                let state = Arc::clone(&state);
                async move { state.check_all().await }
            })
            .await;
    }

    /// Stop monitoring. No check runs after this returns. No-op when idle.
    pub async fn stop_monitoring(&self) {
        if self.poller.stop().await {
            info!("Connection monitor stopped");
        }
    }

    /// Whether the polling loop is active.
    pub async fn is_monitoring(&self) -> bool {
        self.poller.is_running().await
    }

    /// Probe one backend without touching the recorded state.
    pub async fn check_connection(&self, backend: Backend) -> bool {
        self.state.check(backend).await
    }

    /// Run one check cycle immediately and return the new snapshot.
    pub async fn recheck_now(&self) -> Vec<ConnectionState> {
        self.state.check_all().await;
        self.state.snapshot()
    }

    /// Last observed state of every backend.
    #[must_use]
    pub fn status(&self) -> Vec<ConnectionState> {
        self.state.snapshot()
    }

    /// Last observed reachability of one backend.
    #[must_use]
    pub fn is_reachable(&self, backend: Backend) -> bool {
        self.state
            .tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&backend)
            .is_some_and(|t| t.state.reachable)
    }

    /// Receive loss/recovery notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionChange> {
        self.state.changes.subscribe()
    }
}
