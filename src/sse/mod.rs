//! Server-Sent Events stream of UI events.
//!
//! The host UI subscribes here to receive delivery notices and backend
//! replies.
//!
//! # Endpoint
//!
//! `GET /api/v1/events/stream`
//!
//! # Event Types
//!
//! - `connected` - Initial confirmation with the current online flag and queue depth
//! - `notice` - User-visible notification (`message`, `severity`)
//! - `reply` - Backend response forwarded by the transport
//! - `lagged` - The subscriber fell behind and missed events

mod handler;

pub use handler::{sse_handler, StreamEvent};
