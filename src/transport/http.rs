use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;

use super::{DeliveryError, Transport, TransportError, WireEnvelope};
use crate::config::TransportConfig;
use crate::queue::{EventPayload, QueuedEvent};
use crate::ui::UiChannel;

/// Request body: the wire envelope plus the chat endpoint's own fields
#[derive(Serialize)]
struct DeliveryBody<'a> {
    #[serde(flatten)]
    envelope: WireEnvelope<'a>,
    /// Text alias expected by the chat endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<i64>,
    tts_enabled: bool,
}

/// POSTs each event as JSON and classifies the backend's answer.
pub struct HttpTransport {
    client: Client,
    url: Url,
    chat_id: Option<i64>,
    tts_enabled: bool,
    ui: Option<UiChannel>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig, ui: Option<UiChannel>) -> Result<Self, TransportError> {
        let raw = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.endpoint.trim_start_matches('/')
        );
        let url = Url::parse(&raw).map_err(|e| TransportError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            url,
            chat_id: config.chat_id,
            tts_enabled: config.tts_enabled,
            ui,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn deliver(&self, event: &QueuedEvent) -> Result<(), DeliveryError> {
        let message = match event.payload.as_ref() {
            EventPayload::Message { content } => Some(content.as_str()),
            _ => None,
        };
        let body = DeliveryBody {
            envelope: WireEnvelope::new(event),
            message,
            chat_id: self.chat_id,
            tts_enabled: self.tts_enabled,
        };

        let response = self.client.post(self.url.clone()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;

        classify_response(&body)?;

        if let (Some(ui), Some(reply)) = (&self.ui, body.get("response")) {
            if !reply.is_null() {
                ui.reply(body.clone());
            }
        }

        Ok(())
    }
}

/// Success means a truthy `success` or a present `response`; an `error` field always fails.
fn classify_response(body: &Value) -> Result<(), DeliveryError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let reason = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(DeliveryError::Rejected(reason));
    }

    let success = body.get("success").map(is_truthy).unwrap_or(false);
    let has_response = body.get("response").is_some_and(|r| !r.is_null());

    if success || has_response {
        Ok(())
    } else {
        Err(DeliveryError::InvalidResponse(
            "response carries neither a success flag nor a reply".to_string(),
        ))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
