use crate::traits::{Payload, Transport, TransportError};
use reqwest::Client;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, trace};
use url::Url;

const USER_AGENT: &str = concat!("surge/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP POST transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &Url,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let response = self
            .client
            .post(endpoint.clone())
            .timeout(timeout)
            .json(&payload.body)
            .send()
            .await
            .map_err(|err| {
                trace!("No response for {}: {err}", payload.event);
                TransportError::NoResponse(describe(&err))
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            debug!("{} returned {status}", payload.event);
            Err(TransportError::Status(status.as_u16()))
        }
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "Request timed out".to_string()
    } else if err.is_connect() {
        format!("Connection failed: {err}")
    } else {
        err.to_string()
    }
}
