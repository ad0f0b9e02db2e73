//! Recorder session state driven by actions and the recorder channel.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::StoreCell;
use crate::domain::{
    ApiFailure, Backend, RecordedStep, RecorderEvent, RecorderMode, RecorderStatus,
    RecordingResult, Result,
};
use crate::infrastructure::{connect_ws, Listener, RequestClient, StreamSignal, RECORDER_WS_PATH};

/// Snapshot of the recorder store.
#[derive(Debug, Clone, Default)]
pub struct RecorderState {
    pub status: RecorderStatus,
    pub mode: RecorderMode,
    pub overlay_visible: bool,
    pub steps: Vec<RecordedStep>,
    /// Selector currently highlighted by the engine.
    pub hovered_element: Option<String>,
    pub error: Option<String>,
}

/// Recorder store.
pub struct RecorderStore {
    client: RequestClient,
    state: StoreCell<RecorderState>,
}

impl RecorderStore {
    pub fn new(client: RequestClient) -> Self {
        Self {
            client,
            state: StoreCell::new(RecorderState::default()),
        }
    }

    pub fn snapshot(&self) -> RecorderState {
        self.state.snapshot()
    }

    /// Begin recording. No-op while already recording.
    pub async fn start_recording(&self, mode: RecorderMode) -> std::result::Result<(), ApiFailure> {
        let already = self.state.update(|s| {
            if s.status == RecorderStatus::Recording {
                return true;
            }
            s.status = RecorderStatus::Processing;
            s.error = None;
            s.steps.clear();
            s.mode = mode;
            false
        });
        if already {
            return Ok(());
        }

        let result = self
            .client
            .post::<Value>(Backend::Engine, "/recorder/start", &json!({ "mode": mode }))
            .await
            .into_ack();

        self.state.update(|s| match &result {
            Ok(()) => {
                s.status = RecorderStatus::Recording;
                s.overlay_visible = true;
            }
            Err(failure) => {
                s.status = RecorderStatus::Error;
                s.error = Some(failure.message.clone());
            }
        });
        if result.is_ok() {
            info!(?mode, "Recording started");
        }
        result
    }

    /// Pause a running recording. Returns whether the status changed.
    pub fn pause(&self) -> bool {
        self.state.update(|s| {
            let active = s.status == RecorderStatus::Recording;
            if active {
                s.status = RecorderStatus::Paused;
            }
            active
        })
    }

    /// Resume a paused recording. Returns whether the status changed.
    pub fn resume(&self) -> bool {
        self.state.update(|s| {
            let paused = s.status == RecorderStatus::Paused;
            if paused {
                s.status = RecorderStatus::Recording;
            }
            paused
        })
    }

    /// Stop recording and collect the captured steps. The recorder always
    /// returns to idle.
    pub async fn stop_recording(&self) -> std::result::Result<Vec<RecordedStep>, ApiFailure> {
        let idle = self.state.update(|s| {
            if s.status == RecorderStatus::Idle {
                return true;
            }
            s.status = RecorderStatus::Processing;
            false
        });
        if idle {
            return Ok(self.state.read().steps.clone());
        }

        let result = self
            .client
            .post::<RecordingResult>(Backend::Engine, "/recorder/stop", &json!({}))
            .await
            .into_result();

        self.state.update(|s| {
            if let Ok(recording) = &result {
                s.steps.clone_from(&recording.steps);
            }
            s.status = RecorderStatus::Idle;
            s.overlay_visible = false;
        });
        result.map(|recording| recording.steps)
    }

    pub fn set_overlay_visible(&self, visible: bool) {
        self.state.update(|s| s.overlay_visible = visible);
    }

    /// Merge one recorder channel event.
    pub fn apply_event(&self, event: RecorderEvent) {
        self.state.update(|s| match event {
            RecorderEvent::Highlight(payload) => s.hovered_element = payload.selector,
            RecorderEvent::Step(step) => s.steps.push(step),
            RecorderEvent::Status(payload) => s.status = payload.status,
            RecorderEvent::Error(payload) => {
                s.status = RecorderStatus::Error;
                s.error = Some(payload.message);
            }
        });
    }

    /// Follow the recorder channel.
    ///
    /// # Errors
    /// Returns `AppError::Transport` when the socket cannot be opened.
    pub async fn watch(self: &Arc<Self>, ws_base: &str) -> Result<Listener> {
        let subscription = connect_ws::<RecorderEvent>(&format!("{ws_base}{RECORDER_WS_PATH}")).await?;
        let store = Arc::clone(self);
        Ok(Listener::spawn(subscription, move |signal| match signal {
            StreamSignal::Event(event) => store.apply_event(event),
            StreamSignal::Failed(reason) => warn!(%reason, "Recorder channel failed"),
            StreamSignal::Completed => info!("Recorder channel closed"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, respond};
    use super::*;
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_start_failure_sets_error() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/engine/recorder/start", 409, json!({"error": "browser missing"})).await;
        let store = RecorderStore::new(client(&server));

        assert!(store.start_recording(RecorderMode::Manual).await.is_err());
        let state = store.snapshot();
        assert_eq!(state.status, RecorderStatus::Error);
        assert_eq!(state.error.as_deref(), Some("browser missing"));
        assert_eq!(state.mode, RecorderMode::Manual);
    }

    #[tokio::test]
    async fn test_record_pause_resume_stop() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/engine/recorder/start", 200, json!({"success": true})).await;
        respond(
            &server,
            "POST",
            "/engine/recorder/stop",
            200,
            json!({"steps": [{"id": "s1", "action": "click", "target": "#ok", "strategy": "css"}]}),
        )
        .await;
        let store = RecorderStore::new(client(&server));

        store.start_recording(RecorderMode::Auto).await.unwrap();
        assert!(store.snapshot().overlay_visible);
        assert!(store.pause());
        assert!(!store.pause());
        assert!(store.resume());

        let steps = store.stop_recording().await.unwrap();
        assert_eq!(steps.len(), 1);
        let state = store.snapshot();
        assert_eq!(state.status, RecorderStatus::Idle);
        assert!(!state.overlay_visible);
    }

    #[tokio::test]
    async fn test_apply_events() {
        let server = MockServer::start().await;
        let store = RecorderStore::new(client(&server));

        let highlight: RecorderEvent =
            serde_json::from_str(r##"{"type":"highlight","payload":{"selector":"#login"}}"##).unwrap();
        store.apply_event(highlight);
        let error: RecorderEvent =
            serde_json::from_str(r#"{"type":"error","payload":{"message":"lost focus"}}"#).unwrap();
        store.apply_event(error);

        let state = store.snapshot();
        assert_eq!(state.hovered_element.as_deref(), Some("#login"));
        assert_eq!(state.status, RecorderStatus::Error);
        assert_eq!(state.error.as_deref(), Some("lost focus"));
    }
}
