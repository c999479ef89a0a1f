//! Reconnect policy for persistent-connection transports.
//!
//! - `BackoffPolicy` / `ExponentialBackoff`: `min(base * 2^attempt, cap)` delays
//! - `ReconnectMachine`: `Disconnected -> Connecting -> Connected -> Disconnected`
//!   with the backoff wired in, publishing its state on a watch channel
//!
//! This is separate from the fixed-delay retry the delivery queue applies to
//! individual events.

mod backoff;

pub use backoff::{BackoffPolicy, ExponentialBackoff};

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::ReconnectConfig;
use crate::metrics::ConnectionMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Connection state machine with backoff.
///
/// The attempt counter increments on every failed connect or unexpected
/// close and resets on a successful connect.
pub struct ReconnectMachine {
    backoff: ExponentialBackoff,
    max_attempts: Option<u32>,
    state: watch::Sender<ConnectionState>,
}

impl ReconnectMachine {
    pub fn new(policy: BackoffPolicy, max_attempts: Option<u32>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            backoff: ExponentialBackoff::with_policy(policy),
            max_attempts,
            state,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(BackoffPolicy::from(config), config.max_attempts)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    /// `Disconnected -> Connecting`
    pub fn begin_connect(&mut self) {
        if self.state() == ConnectionState::Disconnected {
            self.set(ConnectionState::Connecting);
        }
    }

    /// `Connecting -> Connected`; resets the attempt counter
    pub fn connected(&mut self) {
        self.backoff.reset();
        self.set(ConnectionState::Connected);
    }

    /// Failed connect or unexpected close: `-> Disconnected`.
    ///
    /// Returns the delay before the next connect, or `None` when the attempt
    /// limit has been reached.
    pub fn failed(&mut self) -> Option<Duration> {
        self.set(ConnectionState::Disconnected);

        if let Some(max) = self.max_attempts {
            if self.backoff.attempt() >= max {
                return None;
            }
        }

        ConnectionMetrics::record_reconnect_attempt();
        Some(self.backoff.next_delay())
    }

    /// Deliberate close, e.g. on shutdown. Does not count as a failure.
    pub fn closed(&mut self) {
        self.set(ConnectionState::Disconnected);
    }

    fn set(&self, next: ConnectionState) {
        let mut previous = next;
        let changed = self.state.send_if_modified(|current| {
            previous = *current;
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            ConnectionMetrics::set_state(next);
            tracing::debug!(from = previous.as_str(), to = next.as_str(), "Connection state changed");
        }
    }
}
