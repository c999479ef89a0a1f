//! Outbound event queue with ordered, retried delivery.
//!
//! Producers call [`DeliveryQueue::enqueue`] and return immediately. A single
//! drain loop hands events to the configured [`Transport`](crate::transport::Transport)
//! one at a time, retrying the head on failure and discarding events that sat
//! in the queue longer than the configured timeout.

mod delivery;
mod event;

pub use delivery::{DeliveryQueue, QueueStats};
pub use event::{DeliveryState, EventKind, EventPayload, QueuedEvent, Trigger};
