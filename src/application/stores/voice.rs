//! Audio devices, call records and call statistics.

use serde_json::json;
use tracing::{info, warn};

use super::{prepend, replace_by_id, Loadable, StoreCell};
use crate::domain::{ApiFailure, AudioDevice, Backend, CallRecord, VoiceStats, VoiceStatus};
use crate::infrastructure::RequestClient;

/// Channel used when a call does not name one.
pub const DEFAULT_CHANNEL: &str = "wechat";

#[derive(Debug, Clone, Default)]
pub struct VoiceState {
    pub devices: Vec<AudioDevice>,
    pub stats: Option<VoiceStats>,
    /// Newest first.
    pub calls: Vec<CallRecord>,
    pub loading: bool,
}

impl Loadable for VoiceState {
    fn loading_mut(&mut self) -> &mut bool {
        &mut self.loading
    }
}

pub struct VoiceStore {
    client: RequestClient,
    state: StoreCell<VoiceState>,
}

impl VoiceStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(VoiceState::default()),
        }
    }

    pub fn snapshot(&self) -> VoiceState {
        self.state.snapshot()
    }

    /// Load devices, status and calls concurrently. Each slice is replaced
    /// only when its own call succeeded; the first failure is returned.
    pub async fn hydrate(&self) -> Result<(), ApiFailure> {
        let _loading = self.state.begin_loading();
        let (devices, status, calls) = tokio::join!(
            self.client.get::<Vec<AudioDevice>>(Backend::Engine, "/voice/devices"),
            self.client.get::<VoiceStatus>(Backend::Engine, "/voice/status"),
            self.client.get::<Vec<CallRecord>>(Backend::Engine, "/voice/calls"),
        );
        let (devices, status, calls) = (
            devices.into_result(),
            status.into_result(),
            calls.into_result(),
        );

        self.state.update(|s| {
            if let Ok(devices) = &devices {
                s.devices.clone_from(devices);
            }
            if let Ok(status) = &status {
                if let Some(stats) = status.stats {
                    s.stats = Some(stats);
                }
            }
            if let Ok(calls) = &calls {
                s.calls.clone_from(calls);
            }
        });

        devices.and(status).and(calls).map(|_| ())
    }

    pub async fn start_call(&self, contact: &str, channel: Option<&str>) -> Result<CallRecord, ApiFailure> {
        let call = self
            .client
            .post::<CallRecord>(
                Backend::Engine,
                "/voice/calls",
                &json!({ "contact": contact, "channel": channel.unwrap_or(DEFAULT_CHANNEL) }),
            )
            .await
            .into_result()?;
        info!(call = %call.id, contact, "Call started");
        self.state.update(|s| prepend(&mut s.calls, call.clone()));
        Ok(call)
    }

    /// Finish a call, then refresh the statistics whatever the outcome.
    pub async fn finish_call(&self, call_id: &str, summary: &str) -> Result<CallRecord, ApiFailure> {
        let result = self
            .client
            .post::<CallRecord>(
                Backend::Engine,
                &format!("/voice/calls/{call_id}/finish"),
                &json!({ "reason": "completed", "summary": summary }),
            )
            .await
            .into_result();

        if let Ok(call) = &result {
            self.state.update(|s| {
                replace_by_id(&mut s.calls, call.clone());
            });
        }

        match self
            .client
            .get::<VoiceStatus>(Backend::Engine, "/voice/status")
            .await
            .into_result()
        {
            Ok(VoiceStatus { stats: Some(stats) }) => self.state.update(|s| s.stats = Some(stats)),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to refresh call statistics"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, respond};
    use super::*;
    use serde_json::Value;
    use wiremock::MockServer;

    fn call_json(id: &str, status: &str) -> Value {
        json!({"id": id, "contact": "Bob", "channel": "wechat", "status": status})
    }

    fn stats_json(today: u64) -> Value {
        json!({"stats": {"today": today, "total_duration": 60.0, "avg_duration": 30.0, "answer_rate": 0.5}})
    }

    #[tokio::test]
    async fn test_partial_hydrate_keeps_successful_slices() {
        let server = MockServer::start().await;
        respond(&server, "GET", "/engine/voice/devices", 500, json!({"error": "no audio"})).await;
        respond(&server, "GET", "/engine/voice/status", 200, stats_json(2)).await;
        respond(&server, "GET", "/engine/voice/calls", 200, json!([call_json("c1", "ended")])).await;
        let store = VoiceStore::new(client(&server));

        let err = store.hydrate().await.unwrap_err();
        assert_eq!(err.message, "no audio");
        let state = store.snapshot();
        assert!(!state.loading);
        assert!(state.devices.is_empty());
        assert_eq!(state.calls.len(), 1);
        assert_eq!(state.stats.unwrap().today, 2);
    }

    #[tokio::test]
    async fn test_finish_call_replaces_and_refreshes_stats() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/engine/voice/calls", 200, call_json("c9", "active")).await;
        respond(&server, "POST", "/engine/voice/calls/c9/finish", 200, call_json("c9", "ended")).await;
        respond(&server, "GET", "/engine/voice/status", 200, stats_json(5)).await;
        let store = VoiceStore::new(client(&server));

        store.start_call("Bob", None).await.unwrap();
        store.finish_call("c9", "all good").await.unwrap();
        let state = store.snapshot();
        assert_eq!(state.calls.len(), 1);
        assert_eq!(state.calls[0].status, "ended");
        assert_eq!(state.stats.unwrap().today, 5);
    }
}
