//! The outbound delivery queue.
//!
//! Events are attempted strictly in enqueue order, one `deliver` call at a
//! time. A failed head event is retried after a fixed delay up to
//! `max_retries` attempts, then dropped with a UI notification. An event
//! older than `message_timeout` when it reaches the head is dropped without
//! an attempt.
//!
//! # Concurrency
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. `is_processing` is checked and set inside a single critical
//! section, so at most one drain loop exists at any time; enqueues that
//! arrive while it runs (including while it waits out a retry delay) only
//! append.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use super::event::{DeliveryState, EventPayload, QueuedEvent, Trigger};
use crate::config::QueueConfig;
use crate::metrics::{ConnectionMetrics, DeliveryMetrics, QueueMetrics};
use crate::transport::{DeliveryError, Transport};
use crate::ui::{Severity, UiSink};

/// Lifetime counters
#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    enqueued: u64,
    delivered: u64,
    expired: u64,
    dropped: u64,
    rejected: u64,
    failed_attempts: u64,
}

#[derive(Debug)]
struct QueueState {
    pending: VecDeque<QueuedEvent>,
    /// A drain loop owns the queue head
    is_processing: bool,
    /// Consecutive failed attempts for the current head
    retry_count: u32,
    online: bool,
    counters: Counters,
}

/// What the drain loop does after a failed attempt
#[derive(Debug, PartialEq, Eq)]
enum AfterFailure {
    Retry { attempt: u32 },
    Dropped { attempts: u32 },
    /// Head was removed underneath the attempt (queue cleared)
    Gone,
}

/// Snapshot of the queue for the API and shutdown logic
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub is_processing: bool,
    pub retry_count: u32,
    pub online: bool,
    /// Age of the head event in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_age_ms: Option<u64>,
    pub enqueued: u64,
    pub delivered: u64,
    pub expired: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub failed_attempts: u64,
}

struct Inner {
    state: Mutex<QueueState>,
    config: QueueConfig,
    transport: Arc<dyn Transport>,
    ui: Arc<dyn UiSink>,
}

/// Handle to the delivery queue. Cloning shares the same queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<Inner>,
}

impl DeliveryQueue {
    pub fn new(config: QueueConfig, transport: Arc<dyn Transport>, ui: Arc<dyn UiSink>) -> Self {
        let config = QueueConfig {
            max_retries: config.max_retries.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    is_processing: false,
                    retry_count: 0,
                    online: true,
                    counters: Counters::default(),
                }),
                config,
                transport,
                ui,
            }),
        }
    }

    /// Set the initial online flag without treating it as a transition
    pub fn with_online(self, online: bool) -> Self {
        self.inner.lock().online = online;
        ConnectionMetrics::set_online(online);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    /// Queue an event for delivery and return its id.
    ///
    /// Blank payloads are ignored and yield `None`. Never waits for delivery.
    pub fn enqueue(&self, payload: EventPayload) -> Option<Uuid> {
        if payload.is_blank() {
            self.inner.lock().counters.rejected += 1;
            QueueMetrics::record_rejected();
            tracing::debug!(kind = payload.kind().as_str(), "Ignoring blank event");
            return None;
        }

        let event = QueuedEvent::new(payload);
        let id = event.id;
        let kind = event.kind();

        let (start, pending) = {
            let mut state = self.inner.lock();
            state.pending.push_back(event);
            state.counters.enqueued += 1;

            let may_drain = state.online || !self.inner.config.defer_while_offline;
            let start = may_drain && !state.is_processing;
            if start {
                state.is_processing = true;
            }
            (start, state.pending.len())
        };

        QueueMetrics::record_enqueued(kind);
        QueueMetrics::set_pending(pending);
        tracing::debug!(
            event_id = %id,
            kind = kind.as_str(),
            pending = pending,
            starts_drain = start,
            "Event enqueued"
        );

        if start {
            self.spawn_drain();
        }

        Some(id)
    }

    /// Connectivity transition callback.
    ///
    /// Returns `true` when the transition started a drain.
    pub fn on_connectivity_change(&self, online: bool) -> bool {
        let (was_online, start) = {
            let mut state = self.inner.lock();
            let was_online = state.online;
            state.online = online;

            let start =
                online && !was_online && !state.pending.is_empty() && !state.is_processing;
            if start {
                state.is_processing = true;
            }
            (was_online, start)
        };

        ConnectionMetrics::set_online(online);

        if was_online != online {
            if online {
                tracing::info!(resumed = start, "Connectivity restored");
                self.inner.ui.notify("Connection restored", Severity::Info);
            } else {
                tracing::warn!("Connectivity lost");
                self.inner.ui.notify("Connection lost", Severity::Warning);
            }
        }

        if start {
            self.spawn_drain();
        }

        start
    }

    pub fn stats(&self) -> QueueStats {
        let now = Instant::now();
        let state = self.inner.lock();
        QueueStats {
            pending: state.pending.len(),
            is_processing: state.is_processing,
            retry_count: state.retry_count,
            online: state.online,
            oldest_age_ms: state
                .pending
                .front()
                .map(|e| e.age(now).as_millis() as u64),
            enqueued: state.counters.enqueued,
            delivered: state.counters.delivered,
            expired: state.counters.expired,
            dropped: state.counters.dropped,
            rejected: state.counters.rejected,
            failed_attempts: state.counters.failed_attempts,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing pending and no drain loop running
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        state.pending.is_empty() && !state.is_processing
    }

    /// Discard everything still pending (session end). Returns the number discarded.
    pub fn clear(&self) -> usize {
        let cleared = {
            let mut state = self.inner.lock();
            let cleared = state.pending.len();
            state.pending.clear();
            state.retry_count = 0;
            cleared
        };
        QueueMetrics::set_pending(0);
        if cleared > 0 {
            tracing::info!(cleared = cleared, "Discarded undelivered events");
        }
        cleared
    }

    fn spawn_drain(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drain().await;
        });
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the queue half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The delivery loop. Caller has already set `is_processing`.
    async fn drain(&self) {
        tracing::debug!("Drain started");

        while let Some(event) = self.next_attempt() {
            let started = Instant::now();
            let result = self.transport.deliver(&event).await;
            DeliveryMetrics::record_attempt(
                self.transport.name(),
                started.elapsed(),
                result.is_ok(),
            );

            match result {
                Ok(()) => {
                    self.complete_head(&event);
                    tokio::time::sleep(self.config.inter_message_delay()).await;
                }
                Err(error) => match self.fail_head(&event, &error) {
                    AfterFailure::Retry { attempt } => {
                        tracing::debug!(
                            event_id = %event.id,
                            attempt = attempt,
                            delay_ms = self.config.retry_delay_ms,
                            "Retrying delivery"
                        );
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                    AfterFailure::Dropped { attempts } => {
                        self.ui.notify(
                            &format!(
                                "{} could not be delivered after {} attempts",
                                describe(&event),
                                attempts
                            ),
                            Severity::Error,
                        );
                    }
                    AfterFailure::Gone => {}
                },
            }
        }

        tracing::debug!("Drain finished");
    }

    /// Pop stale heads and mark the next live head in flight.
    ///
    /// Releases `is_processing` and returns `None` once the queue is empty.
    fn next_attempt(&self) -> Option<QueuedEvent> {
        let timeout = self.config.message_timeout();
        let max_retries = self.config.max_retries;
        let mut state = self.lock();

        loop {
            let now = Instant::now();
            let Some(head) = state.pending.front_mut() else {
                state.is_processing = false;
                return None;
            };

            let expired = head.is_stale(now, timeout);
            head.state = head.state.advance(Trigger::Inspected { expired }, max_retries);

            if head.state == DeliveryState::Expired {
                let age_ms = head.age(now).as_millis() as u64;
                let id = head.id;
                state.pending.pop_front();
                state.retry_count = 0;
                state.counters.expired += 1;
                QueueMetrics::record_expired();
                QueueMetrics::set_pending(state.pending.len());
                tracing::debug!(event_id = %id, age_ms = age_ms, "Discarding stale event");
                continue;
            }

            return Some(head.clone());
        }
    }

    fn complete_head(&self, event: &QueuedEvent) {
        let mut state = self.lock();
        // The backend has it even if clear() emptied the queue meanwhile
        state.counters.delivered += 1;
        QueueMetrics::record_delivered(event.kind());
        tracing::debug!(event_id = %event.id, kind = event.kind().as_str(), "Event delivered");

        if !head_matches(&state, event) {
            return;
        }

        if let Some(mut head) = state.pending.pop_front() {
            head.state = head.state.advance(Trigger::Succeeded, self.config.max_retries);
        }
        state.retry_count = 0;
        QueueMetrics::set_pending(state.pending.len());
    }

    fn fail_head(&self, event: &QueuedEvent, error: &DeliveryError) -> AfterFailure {
        let max_retries = self.config.max_retries;
        let mut state = self.lock();
        state.counters.failed_attempts += 1;

        if !head_matches(&state, event) {
            return AfterFailure::Gone;
        }

        state.retry_count += 1;
        let attempts = state.retry_count;
        let Some(head) = state.pending.front_mut() else {
            return AfterFailure::Gone;
        };
        head.state = head.state.advance(Trigger::Failed { attempts }, max_retries);
        let next = head.state;

        if next == DeliveryState::Dropped {
            state.pending.pop_front();
            state.retry_count = 0;
            state.counters.dropped += 1;
            QueueMetrics::record_dropped();
            QueueMetrics::set_pending(state.pending.len());
            tracing::warn!(
                event_id = %event.id,
                kind = event.kind().as_str(),
                attempts = attempts,
                error = %error,
                "Dropping event after exhausting retries"
            );
            AfterFailure::Dropped { attempts }
        } else {
            tracing::warn!(
                event_id = %event.id,
                attempt = attempts,
                max_retries = max_retries,
                error = %error,
                "Delivery attempt failed"
            );
            AfterFailure::Retry { attempt: attempts }
        }
    }
}

fn head_matches(state: &QueueState, event: &QueuedEvent) -> bool {
    state.pending.front().is_some_and(|head| head.id == event.id)
}

fn describe(event: &QueuedEvent) -> &'static str {
    match event.payload.as_ref() {
        EventPayload::Message { .. } => "Message",
        EventPayload::Voice { .. } => "Voice message",
        EventPayload::Command { .. } => "Command",
    }
}
