//! WebSocket subscriptions to the engine.

use std::time::Duration;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::subscription::{StreamSignal, Subscription};
use crate::domain::{AppError, Result};

/// Workflow execution channel, relative to the engine WebSocket base.
pub const WORKFLOW_WS_PATH: &str = "/api/workflow/ws";
/// Recorder channel, relative to the engine WebSocket base.
pub const RECORDER_WS_PATH: &str = "/api/recorder/ws";

/// Upper bound for the opening handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a WebSocket and decode every text frame as `E`.
///
/// Frames that are not valid JSON for `E` are logged and skipped. A server
/// close ends the sequence with [`StreamSignal::Completed`]; a transport
/// error ends it with [`StreamSignal::Failed`].
///
/// # Errors
/// Returns `AppError::Transport` if the handshake fails or times out.
pub async fn connect_ws<E>(url: &str) -> Result<Subscription<E>>
where
    E: DeserializeOwned + Send + 'static,
{
    let (mut ws, _response) = timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| AppError::Transport {
            message: format!("connection to {url} timed out after {CONNECT_TIMEOUT:?}"),
        })?
        .map_err(|e| AppError::Transport {
            message: format!("cannot connect to {url}: {e}"),
        })?;

    info!(%url, "WebSocket connected");
    let url = url.to_string();

    Ok(Subscription::spawn(move |emitter| async move {
        let token = emitter.token().clone();
        loop {
            let frame = tokio::select! {
                () = token.cancelled() => None,
                frame = ws.next() => Some(frame),
            };
            let Some(frame) = frame else {
                let _ = ws.close(None).await;
                debug!(%url, "WebSocket closed by client");
                return;
            };

            let decoded = match frame {
                Some(Ok(Message::Text(text))) => serde_json::from_str::<E>(&text),
                Some(Ok(Message::Binary(bytes))) => serde_json::from_slice::<E>(&bytes),
                Some(Ok(Message::Close(_))) | None => {
                    info!(%url, "WebSocket closed by server");
                    emitter.emit(StreamSignal::Completed).await;
                    return;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(%url, error = %e, "WebSocket transport error");
                    emitter.emit(StreamSignal::Failed(e.to_string())).await;
                    return;
                }
            };

            match decoded {
                Ok(event) => {
                    if !emitter.emit(StreamSignal::Event(event)).await {
                        let _ = ws.close(None).await;
                        return;
                    }
                }
                Err(e) => warn!(%url, error = %e, "Dropping malformed frame"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use serde::Deserialize;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::accept_async;

    #[derive(Debug, PartialEq, Eq, Deserialize)]
    struct Tick {
        n: u32,
    }

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"n":1}"#.into())).await.unwrap();
            ws.send(Message::Text("not-json".into())).await.unwrap();
            ws.send(Message::Text(r#"{"n":2}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let mut sub = connect_ws::<Tick>(&url).await.unwrap();
        assert_eq!(sub.next().await, Some(StreamSignal::Event(Tick { n: 1 })));
        assert_eq!(sub.next().await, Some(StreamSignal::Event(Tick { n: 2 })));
        assert_eq!(sub.next().await, Some(StreamSignal::Completed));
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_close_sends_close_frame_once() {
        let (listener, url) = bind().await;
        let (closed_tx, closed_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    let _ = closed_tx.send(());
                    break;
                }
            }
        });

        let mut sub = connect_ws::<Tick>(&url).await.unwrap();
        sub.close();
        sub.close();
        assert_eq!(sub.next().await, None);
        sub.shutdown().await;

        tokio::time::timeout(Duration::from_secs(2), closed_rx)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let result = connect_ws::<Tick>("ws://127.0.0.1:1/api/workflow/ws").await;
        assert!(matches!(result, Err(AppError::Transport { .. })));
    }
}
