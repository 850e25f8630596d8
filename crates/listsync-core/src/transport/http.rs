//! Batch transport over HTTP using the curl crate (libcurl).
//!
//! Each round trip POSTs the JSON-encoded batch to the configured endpoint.
//! The encoded body doubles as the resumable token: a resend posts the same
//! bytes, so a retried request cannot differ from the throttled one.

use std::str;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use super::wire::{decode_response, encode_batch};
use super::{FlushOutcome, RequestBatch, Throttle, Transport, TransportError};
use crate::retry::{classify_http_status, ErrorKind};

/// Encoded request body kept for resending.
#[derive(Debug, Clone)]
pub struct PreparedBody(Arc<Vec<u8>>);

impl PreparedBody {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: Url,
    connect_timeout: Duration,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: &str, connect_timeout: Duration, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid batch endpoint: {}", endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("batch endpoint must be http or https: {}", endpoint);
        }
        Ok(Self {
            endpoint,
            connect_timeout,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build the body and POST it on the blocking pool. Encoding reads whole
    /// attachment files, so it stays off the async workers too.
    async fn post<B>(&self, body: B) -> Result<FlushOutcome<PreparedBody>, TransportError>
    where
        B: FnOnce() -> Result<PreparedBody, TransportError> + Send + 'static,
    {
        let url = self.endpoint.to_string();
        let connect_timeout = self.connect_timeout;
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || {
            let body = body()?;
            post_blocking(&url, body, connect_timeout, timeout)
        })
        .await
        .map_err(|e| TransportError::Network(format!("request task failed: {}", e)))?
    }
}

impl Transport for HttpTransport {
    type Token = PreparedBody;

    async fn flush(
        &self,
        batch: &RequestBatch,
    ) -> Result<FlushOutcome<PreparedBody>, TransportError> {
        let batch = batch.clone();
        self.post(move || {
            let body = PreparedBody(Arc::new(encode_batch(&batch)?));
            tracing::debug!(bytes = body.0.len(), operations = batch.len(), "posting batch");
            Ok(body)
        })
        .await
    }

    async fn resend(
        &self,
        token: &PreparedBody,
    ) -> Result<FlushOutcome<PreparedBody>, TransportError> {
        tracing::debug!(bytes = token.0.len(), "resending throttled batch");
        let body = token.clone();
        self.post(move || Ok(body)).await
    }
}

fn network(e: curl::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

/// One POST. Runs in the current thread; called from `spawn_blocking`.
fn post_blocking(
    url: &str,
    body: PreparedBody,
    connect_timeout: Duration,
    timeout: Duration,
) -> Result<FlushOutcome<PreparedBody>, TransportError> {
    let mut headers: Vec<String> = Vec::new();
    let mut response_body: Vec<u8> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(network)?;
    easy.post(true).map_err(network)?;
    easy.post_fields_copy(body.as_bytes()).map_err(network)?;
    easy.connect_timeout(connect_timeout).map_err(network)?;
    easy.timeout(timeout).map_err(network)?;

    let mut list = curl::easy::List::new();
    list.append("Content-Type: application/json").map_err(network)?;
    list.append("Accept: application/json").map_err(network)?;
    // Send the body immediately instead of waiting for 100-continue.
    list.append("Expect:").map_err(network)?;
    easy.http_headers(list).map_err(network)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    headers.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(network)?;
        transfer
            .write_function(|data| {
                response_body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(network)?;
        transfer.perform().map_err(network)?;
    }

    let status = easy.response_code().map_err(network)?;
    match classify_http_status(status) {
        ErrorKind::Success => Ok(FlushOutcome::Applied(decode_response(&response_body)?)),
        ErrorKind::Throttled => Ok(FlushOutcome::Throttled(Throttle {
            status,
            retry_after: header_value(&headers, "retry-after"),
            token: body,
        })),
        ErrorKind::Other => Err(TransportError::Http {
            status,
            body: String::from_utf8_lossy(&response_body).trim().to_string(),
        }),
    }
}

/// Value of the last header named `name` (case-insensitive).
fn header_value(lines: &[String], name: &str) -> Option<String> {
    lines
        .iter()
        .filter_map(|line| line.split_once(':'))
        .filter(|(n, _)| n.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim().to_string())
        .last()
}
