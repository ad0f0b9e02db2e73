//! Server-sent event subscriptions over a streaming HTTP response.

use futures::StreamExt;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::subscription::{Emitter, StreamSignal, Subscription};

const DATA_PREFIX: &str = "data: ";

/// Longest line kept while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Reassembles newline-terminated lines from arbitrarily split chunks.
///
/// A line longer than the limit is dropped whole, up to its terminator.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to hold no newline.
    scanned: usize,
    limit: usize,
    overflowed: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            limit,
            overflowed: false,
        }
    }

    /// Append a chunk and return every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            if self.overflowed {
                self.overflowed = false;
            } else {
                lines.push(decode_line(&self.pending[start..end]));
            }
            start = end + 1;
            from = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();

        if self.pending.len() > self.limit {
            warn!(limit = self.limit, "Dropping oversized SSE line");
            self.pending.clear();
            self.scanned = 0;
            self.overflowed = true;
        }
        lines
    }

    /// Take whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if std::mem::take(&mut self.overflowed) || self.pending.is_empty() {
            self.pending.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode one SSE line. Anything but a `data: ` line carrying valid JSON
/// yields `None`.
pub fn parse_data_line<E: DeserializeOwned>(line: &str) -> Option<E> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Dropping malformed SSE line");
            None
        }
    }
}

/// Send `request` and stream its body as SSE `data:` events of type `E`.
///
/// The sequence ends with exactly one [`StreamSignal::Completed`] when the
/// server finishes the body, or one [`StreamSignal::Failed`] for a non-2xx
/// status or a read error. Closing the subscription aborts the body read at
/// the next chunk boundary.
pub fn stream_sse<E>(request: RequestBuilder) -> Subscription<E>
where
    E: DeserializeOwned + Send + 'static,
{
    Subscription::spawn(move |emitter| async move {
        let token = emitter.token().clone();

        let response = tokio::select! {
            () = token.cancelled() => return,
            response = request.header("accept", "text/event-stream").send() => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                emitter.emit(StreamSignal::Failed(e.to_string())).await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "SSE request rejected");
            emitter
                .emit(StreamSignal::Failed(format!("HTTP {}", status.as_u16())))
                .await;
            return;
        }

        let mut body = response.bytes_stream();
        let mut buffer = LineBuffer::default();
        loop {
            let chunk = tokio::select! {
                () = token.cancelled() => {
                    debug!("SSE stream cancelled");
                    return;
                }
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for line in buffer.push(&bytes) {
                        if !deliver(&emitter, &line).await {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "SSE read failed");
                    emitter.emit(StreamSignal::Failed(e.to_string())).await;
                    return;
                }
                None => {
                    if let Some(line) = buffer.finish() {
                        if !deliver(&emitter, &line).await {
                            return;
                        }
                    }
                    emitter.emit(StreamSignal::Completed).await;
                    return;
                }
            }
        }
    })
}

async fn deliver<E: DeserializeOwned>(emitter: &Emitter<E>, line: &str) -> bool {
    match parse_data_line(line) {
        Some(event) => emitter.emit(StreamSignal::Event(event)).await,
        None => true,
    }
}
