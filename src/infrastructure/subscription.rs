//! Streaming subscriptions as async sequences.
//!
//! A [`Subscription`] owns one transport connection, driven by a background
//! task that pushes [`StreamSignal`]s into a bounded channel. Closing the
//! subscription cancels that task; after `close()` the sequence yields nothing.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 64;

/// One item of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal<E> {
    /// A decoded message.
    Event(E),
    /// The connection failed; nothing follows.
    Failed(String),
    /// The server ended the stream normally; nothing follows.
    Completed,
}

impl<E> StreamSignal<E> {
    /// Whether this signal ends the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Event(_))
    }
}

/// Producer side handed to the transport task.
pub(crate) struct Emitter<E> {
    tx: mpsc::Sender<StreamSignal<E>>,
    cancel: CancellationToken,
}

impl<E> Emitter<E> {
    /// Deliver a signal. Returns `false` once the consumer is gone or the
    /// subscription was closed.
    pub(crate) async fn emit(&self, signal: StreamSignal<E>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(signal) => sent.is_ok(),
        }
    }

    /// Token cancelled by `close()`.
    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Handle to a live stream. Not `Clone`; dropping it closes the connection.
pub struct Subscription<E> {
    rx: mpsc::Receiver<StreamSignal<E>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl<E: Send + 'static> Subscription<E> {
    /// Spawn `producer` on the runtime and return the consuming handle.
    pub(crate) fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Emitter<E>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let emitter = Emitter {
            tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(producer(emitter));
        Self {
            rx,
            cancel,
            task: Some(task),
            closed: false,
        }
    }
}

impl<E> Subscription<E> {
    /// Next signal, or `None` once the stream has ended or been closed.
    pub async fn next(&mut self) -> Option<StreamSignal<E>> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Close the underlying connection. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.rx.close();
        tracing::debug!("Subscription closed");
    }

    /// Whether `close()` has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close and wait for the transport task to finish.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<E> Stream for Subscription<E> {
    type Item = StreamSignal<E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

/// Drives a subscription on a spawned task, handing every signal to a
/// callback. Dropping or stopping the listener closes the subscription.
pub struct Listener {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Listener {
    /// Start consuming `subscription`.
    pub fn spawn<E, F>(mut subscription: Subscription<E>, mut apply: F) -> Self
    where
        E: Send + 'static,
        F: FnMut(StreamSignal<E>) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                let signal = tokio::select! {
                    () = token.cancelled() => break,
                    signal = subscription.next() => signal,
                };
                let Some(signal) = signal else { break };
                let terminal = signal.is_terminal();
                apply(signal);
                if terminal {
                    break;
                }
            }
            subscription.shutdown().await;
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop listening and close the subscription.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the stream has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait until the stream ends on its own (or `stop` is called elsewhere).
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
