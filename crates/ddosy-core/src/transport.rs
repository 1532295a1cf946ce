//! Outbound request transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::DispatchError;

/// Sends one payload to one endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, endpoint: &str, payload: Bytes) -> Result<(), DispatchError>;
}

/// [`Transport`] backed by a pooled `reqwest` client. Payloads are POSTed
/// unmodified as the request body.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration, max_idle_per_host: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(max_idle_per_host)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, payload: Bytes) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(endpoint)
            .body(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        // Drain the body so the connection goes back to the pool.
        let _ = response.bytes().await;

        if status.is_success() {
            Ok(())
        } else {
            Err(DispatchError::Status(status.as_u16()))
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::Request(e.to_string())
    }
}
