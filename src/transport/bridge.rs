use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{DeliveryError, Transport, WireEnvelope};
use crate::queue::QueuedEvent;

/// Largest payload the host's `sendData` accepts
pub const BRIDGE_PAYLOAD_LIMIT: usize = 4096;

/// Hands events to the embedding host as newline-delimited JSON.
///
/// Success means the line was written and flushed; there is no ack.
pub struct BridgeTransport<W> {
    writer: Mutex<W>,
    limit: usize,
}

impl<W> BridgeTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            limit: BRIDGE_PAYLOAD_LIMIT,
        }
    }

    pub fn with_limit(writer: W, limit: usize) -> Self {
        Self {
            writer: Mutex::new(writer),
            limit,
        }
    }
}

impl BridgeTransport<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> Transport for BridgeTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "bridge"
    }

    async fn deliver(&self, event: &QueuedEvent) -> Result<(), DeliveryError> {
        let line = WireEnvelope::new(event).to_json()?;
        if line.len() > self.limit {
            return Err(DeliveryError::PayloadTooLarge {
                size: line.len(),
                limit: self.limit,
            });
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}
