use std::time::Duration;

use reqwest::{Client, Url};
use tokio::sync::broadcast;

use super::ConnectivitySignal;
use crate::config::ConnectivityConfig;
use crate::transport::TransportError;

/// Periodically checks whether the backend host is reachable and feeds the
/// answer into the connectivity signal.
///
/// Any HTTP response counts as online, whatever its status; only a request
/// that never got an answer (DNS, refused, timeout) counts as offline.
pub struct ConnectivityProbe {
    client: Client,
    url: Url,
    interval: Duration,
    signal: ConnectivitySignal,
    shutdown: broadcast::Receiver<()>,
}

impl ConnectivityProbe {
    /// Returns `Ok(None)` when no probe URL is configured
    pub fn from_config(
        config: &ConnectivityConfig,
        signal: ConnectivitySignal,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Option<Self>, TransportError> {
        let Some(raw) = config.probe_url.as_deref() else {
            return Ok(None);
        };

        let url = Url::parse(raw).map_err(|e| TransportError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.probe_timeout_ms))
            .build()?;

        Ok(Some(Self {
            client,
            url,
            interval: Duration::from_secs(config.probe_interval_secs.max(1)),
            signal,
            shutdown,
        }))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            url = %self.url,
            interval_ms = self.interval.as_millis() as u64,
            "Connectivity probe started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Connectivity probe received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    let reachable = self.check().await;
                    self.signal.set_online(reachable);
                }
            }
        }

        tracing::info!("Connectivity probe stopped");
    }

    async fn check(&self) -> bool {
        match self.client.get(self.url.clone()).send().await {
            Ok(response) => {
                tracing::trace!(status = response.status().as_u16(), "Probe answered");
                true
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    fn config(url: Option<String>) -> ConnectivityConfig {
        ConnectivityConfig {
            probe_url: url,
            probe_timeout_ms: 500,
            ..Default::default()
        }
    }

    async fn wait_until(signal: &ConnectivitySignal, online: bool) {
        let mut rx = signal.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *rx.borrow_and_update() != online {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("signal did not reach the expected state");
    }

    #[test]
    fn test_disabled_without_url() {
        let (_tx, rx) = broadcast::channel(1);
        let probe = ConnectivityProbe::from_config(&config(None), ConnectivitySignal::default(), rx);
        assert!(probe.unwrap().is_none());
    }

    #[test]
    fn test_bad_url_is_an_error() {
        let (_tx, rx) = broadcast::channel(1);
        let probe = ConnectivityProbe::from_config(
            &config(Some("no scheme".to_string())),
            ConnectivitySignal::default(),
            rx,
        );
        assert!(matches!(probe, Err(TransportError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_host_goes_offline_then_recovers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let signal = ConnectivitySignal::new(true);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let probe = ConnectivityProbe::from_config(
            &config(Some(format!("http://{}/health", addr))),
            signal.clone(),
            shutdown_rx,
        )
        .unwrap()
        .unwrap()
        .with_interval(Duration::from_millis(50));
        let handle = tokio::spawn(probe.run());

        wait_until(&signal, false).await;

        // Any answer counts, even an error status
        let app = Router::new().route("/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = TcpListener::bind(addr).await.unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        wait_until(&signal, true).await;

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
