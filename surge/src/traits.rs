//! Seams to the collaborators the dispatcher drives: payload construction and transport.
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A webhook event body.
///
/// `event` mirrors the body's `event` field; everything else in `body` is opaque to the
/// dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub event: String,
    pub body: Value,
}

impl Payload {
    /// Wraps `body`, forcing its `event` field to `event` when the body is an object.
    pub fn new(event: impl Into<String>, mut body: Value) -> Self {
        let event = event.into();
        if let Value::Object(map) = &mut body {
            map.insert("event".to_string(), Value::String(event.clone()));
        }
        Self { event, body }
    }
}

/// Builds event bodies for a merchant.
pub trait PayloadGenerator: Send + Sync + 'static {
    /// `event_type` of `None` lets the generator choose.
    fn generate(&self, entity_id: &str, event_type: Option<&str>) -> Payload;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A response arrived with a non-2xx status.
    #[error("Request failed with status code {0}")]
    Status(u16),

    /// Timeout, refused connection or any other failure before a response.
    #[error("{0}")]
    NoResponse(String),
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status(code) => Some(*code),
            TransportError::NoResponse(_) => None,
        }
    }
}

/// Delivers a payload to the endpoint, resolving to the 2xx status code on success.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    async fn send(
        &self,
        endpoint: &Url,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}
