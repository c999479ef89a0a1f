use tokio::sync::{broadcast, watch};

use super::ConnectivitySignal;
use crate::queue::DeliveryQueue;

/// Background task forwarding connectivity transitions to the queue
pub struct ConnectivityWatcher {
    online: watch::Receiver<bool>,
    queue: DeliveryQueue,
    shutdown: broadcast::Receiver<()>,
}

impl ConnectivityWatcher {
    pub fn new(
        signal: &ConnectivitySignal,
        queue: DeliveryQueue,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            online: signal.subscribe(),
            queue,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        // Transitions that happened before the task started
        let current = *self.online.borrow_and_update();
        self.queue.on_connectivity_change(current);

        tracing::info!(online = current, "Connectivity watcher started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Connectivity watcher received shutdown signal");
                    break;
                }
                changed = self.online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *self.online.borrow_and_update();
                    let resumed = self.queue.on_connectivity_change(online);
                    tracing::debug!(online = online, resumed = resumed, "Forwarded connectivity change");
                }
            }
        }

        tracing::info!("Connectivity watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::queue::{EventPayload, QueuedEvent};
    use crate::transport::{DeliveryError, Transport};
    use crate::ui::LogSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingTransport {
        delivered: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, _event: &QueuedEvent) -> Result<(), DeliveryError> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_transition_drains_held_events() {
        let transport = Arc::new(CountingTransport::default());
        let config = QueueConfig {
            defer_while_offline: true,
            ..QueueConfig::default()
        };
        let queue = DeliveryQueue::new(config, transport.clone(), Arc::new(LogSink))
            .with_online(false);
        let signal = ConnectivitySignal::new(false);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(ConnectivityWatcher::new(&signal, queue.clone(), shutdown_rx).run());

        queue.enqueue(EventPayload::message("held"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 0);

        signal.set_online(true);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 1);
        assert!(queue.stats().online);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_initial_state_is_applied() {
        let queue = DeliveryQueue::new(
            QueueConfig::default(),
            Arc::new(CountingTransport::default()),
            Arc::new(LogSink),
        );
        let signal = ConnectivitySignal::new(false);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(ConnectivityWatcher::new(&signal, queue.clone(), shutdown_rx).run());
        tokio::time::timeout(Duration::from_secs(1), async {
            while queue.stats().online {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("watcher should apply the initial offline state");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
