//! Single-loop periodic task runner.
//!
//! At most one loop is active per [`Poller`]. Starting again replaces the
//! running loop; stopping returns only after the loop task has ended, so no
//! tick runs after `stop` returns.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Running {
    async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Owner of one repeating background loop.
#[derive(Default)]
pub struct Poller {
    slot: Mutex<Option<Running>>,
}

impl Poller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` now and then every `interval` until stopped, replacing any
    /// loop already running.
    pub async fn start<F, Fut>(&self, interval: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.take() {
            tracing::debug!("Replacing running poll loop");
            previous.shutdown().await;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tick() => {}
                }
            }
        });

        *slot = Some(Running { cancel, task });
    }

    /// Stop the loop. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let running = self.slot.lock().await.take();
        match running {
            Some(running) => {
                running.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Whether a loop is active.
    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let poller = Poller::new();
        assert!(!poller.stop().await);
        assert!(!poller.is_running().await);
    }

    #[tokio::test]
    async fn test_ticks_immediately_then_stops() {
        let poller = Poller::new();
        let count = Arc::new(AtomicUsize::new(0));
        poller.start(Duration::from_secs(60), counting(&count)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(poller.stop().await);

        let after_stop = count.load(Ordering::SeqCst);
        assert_eq!(after_stop, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_restart_replaces_loop() {
        let poller = Poller::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        poller.start(Duration::from_millis(10), counting(&first)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        poller.start(Duration::from_millis(10), counting(&second)).await;

        let frozen = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(first.load(Ordering::SeqCst), frozen);
        assert!(second.load(Ordering::SeqCst) >= 2);
        poller.stop().await;
    }
}
