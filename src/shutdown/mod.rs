//! Graceful shutdown of the relay.
//!
//! Sequence:
//! 1. Give the queue a bounded window to deliver what is pending
//! 2. Discard whatever is left (events do not outlive the session)
//! 3. Signal background tasks (reconnect supervisor, connectivity tasks) to stop
//!
//! The transport stays up during step 1, so the stop signal goes out last.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::ServerConfig;
use crate::queue::DeliveryQueue;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for pending events to be delivered (default: 5 seconds)
    pub drain_timeout: Duration,
    /// How often the queue is polled while waiting
    pub poll_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl From<&ServerConfig> for ShutdownConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
            ..Default::default()
        }
    }
}

/// Handles graceful shutdown of the relay
pub struct GracefulShutdown {
    queue: DeliveryQueue,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(queue: DeliveryQueue, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(queue, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        queue: DeliveryQueue,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            queue,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(pending = self.queue.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();
        let delivered_before = self.queue.stats().delivered;

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Draining queue");
        result.queue_drained = self.drain_queue().await;
        result.delivered_during_drain = self.queue.stats().delivered - delivered_before;

        tracing::info!("Phase 2: Discarding undelivered events");
        result.discarded = self.queue.clear();

        tracing::info!("Phase 3: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            queue_drained = result.queue_drained,
            delivered = result.delivered_during_drain,
            discarded = result.discarded,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    /// Wait until the queue is idle or the drain timeout runs out
    async fn drain_queue(&self) -> bool {
        if self.queue.is_idle() {
            return true;
        }

        let stats = self.queue.stats();
        if !stats.is_processing {
            // Held while offline; waiting cannot help
            tracing::info!(pending = stats.pending, "Queue is not draining, skipping wait");
            return false;
        }

        tracing::info!(
            pending = stats.pending,
            timeout_ms = self.config.drain_timeout.as_millis() as u64,
            "Waiting for pending events to be delivered"
        );

        let queue = self.queue.clone();
        let poll_interval = self.config.poll_interval;
        let drain_future = async {
            while !queue.is_idle() {
                tokio::time::sleep(poll_interval).await;
            }
        };

        match timeout(self.config.drain_timeout, drain_future).await {
            Ok(_) => {
                tracing::info!("Queue drained successfully");
                true
            }
            Err(_) => {
                tracing::warn!(
                    remaining = self.queue.len(),
                    "Queue drain timeout, remaining events will be discarded"
                );
                false
            }
        }
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether shutdown completed successfully
    pub success: bool,
    /// Whether the queue emptied before the timeout
    pub queue_drained: bool,
    /// Events delivered while waiting
    pub delivered_during_drain: u64,
    /// Events still pending at the end and thrown away
    pub discarded: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::queue::{EventPayload, QueuedEvent};
    use crate::transport::{DeliveryError, Transport};
    use crate::ui::LogSink;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedTransport {
        succeed: bool,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn deliver(&self, _event: &QueuedEvent) -> Result<(), DeliveryError> {
            if self.succeed {
                Ok(())
            } else {
                Err(DeliveryError::NotConnected)
            }
        }
    }

    fn create_test_components(succeed: bool) -> (DeliveryQueue, broadcast::Sender<()>) {
        create_components_with(succeed, QueueConfig::default())
    }

    fn create_components_with(
        succeed: bool,
        config: QueueConfig,
    ) -> (DeliveryQueue, broadcast::Sender<()>) {
        let queue = DeliveryQueue::new(
            config,
            Arc::new(FixedTransport { succeed }),
            Arc::new(LogSink),
        );
        let (tx, _) = broadcast::channel(1);
        (queue, tx)
    }

    #[tokio::test]
    async fn test_shutdown_empty_queue() {
        let (queue, tx) = create_test_components(true);
        let mut rx = tx.subscribe();
        let shutdown = GracefulShutdown::new(queue, tx);

        let result = shutdown.execute("test shutdown").await;

        assert!(result.success);
        assert!(result.queue_drained);
        assert_eq!(result.discarded, 0);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_delivery() {
        let (queue, tx) = create_test_components(true);
        queue.enqueue(EventPayload::message("a"));
        queue.enqueue(EventPayload::message("b"));

        let result = GracefulShutdown::new(queue.clone(), tx).execute("test").await;

        assert!(result.queue_drained);
        assert_eq!(result.delivered_during_drain, 2);
        assert_eq!(result.discarded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_after_timeout() {
        let (queue, tx) = create_test_components(false);
        queue.enqueue(EventPayload::message("a"));
        queue.enqueue(EventPayload::message("b"));

        let config = ShutdownConfig {
            drain_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let result = GracefulShutdown::with_config(queue.clone(), tx, config)
            .execute("test")
            .await;

        assert!(!result.queue_drained);
        assert_eq!(result.discarded, 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_skips_wait_when_held_offline() {
        let config = QueueConfig {
            defer_while_offline: true,
            ..Default::default()
        };
        let (queue, tx) = create_components_with(true, config);
        let queue = queue.with_online(false);
        queue.enqueue(EventPayload::message("held"));

        let result = GracefulShutdown::new(queue, tx).execute("test").await;

        assert!(!result.queue_drained);
        assert_eq!(result.discarded, 1);
    }

    #[test]
    fn test_shutdown_config_defaults() {
        let config = ShutdownConfig::default();
        assert_eq!(config.drain_timeout, Duration::from_secs(5));

        let server = ServerConfig {
            drain_timeout_secs: 9,
            ..Default::default()
        };
        assert_eq!(ShutdownConfig::from(&server).drain_timeout, Duration::from_secs(9));
    }
}
