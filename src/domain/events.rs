//! Typed payloads delivered over streaming channels.

use serde::{Deserialize, Serialize};

use super::models::{ExecutionLog, ExecutionRun, RecordedStep, RecorderStatus};

/// Chat token stream message, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    Start {
        #[serde(default)]
        conversation_id: Option<String>,
    },
    Token {
        content: String,
    },
    Done {
        #[serde(default)]
        content: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Payload of a recorder `highlight` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightPayload {
    #[serde(default)]
    pub selector: Option<String>,
}

/// Payload of a recorder `status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: RecorderStatus,
}

/// Payload of a recorder `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Recorder WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum RecorderEvent {
    Highlight(HighlightPayload),
    Step(RecordedStep),
    Status(StatusPayload),
    Error(ErrorPayload),
}

/// Workflow WebSocket frame: either a run snapshot or a log line.
///
/// Runs are recognized by their `workflow_id`; anything else must parse as a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionEvent {
    Run(ExecutionRun),
    Log(ExecutionLog),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunStatus;

    #[test]
    fn test_chat_event_tags() {
        let ev: ChatEvent = serde_json::from_str(r#"{"type":"token","content":"a"}"#).unwrap();
        assert_eq!(ev, ChatEvent::Token { content: "a".into() });
        let done: ChatEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(done, ChatEvent::Done { content: None });
    }

    #[test]
    fn test_recorder_event_payload() {
        let ev: RecorderEvent =
            serde_json::from_str(r#"{"type":"status","payload":{"status":"paused"}}"#).unwrap();
        assert_eq!(
            ev,
            RecorderEvent::Status(StatusPayload {
                status: RecorderStatus::Paused
            })
        );
    }

    #[test]
    fn test_execution_event_discriminates_by_shape() {
        let run: ExecutionEvent = serde_json::from_str(
            r#"{"id":"r1","workflow_id":"w1","status":"running"}"#,
        )
        .unwrap();
        assert!(matches!(run, ExecutionEvent::Run(_)));

        let log: ExecutionEvent = serde_json::from_str(
            r#"{"runId":"r1","nodeId":"n1","status":"completed","message":"ok"}"#,
        )
        .unwrap();
        match log {
            ExecutionEvent::Log(line) => assert_eq!(line.status, RunStatus::Completed),
            ExecutionEvent::Run(_) => panic!("expected a log line"),
        }
    }
}
