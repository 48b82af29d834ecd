//! Direct invocation of a function runtime, with retries to ride out a
//! container that is still booting.

use crate::error::{GatewayError, Result};
use crate::proxy::format::pretty_json;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{HeaderMap, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Invocation endpoint of the Lambda runtime interface emulator.
pub const INVOCATION_PATH: &str = "/2015-03-31/functions/function/invocations";

/// Where and how to invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Host port bound to the runtime.
    pub port: u16,
    /// Retries after the first attempt on connection failure.
    pub retry_count: u32,
    /// Pause between attempts.
    pub retry_interval: Duration,
    /// Mirror the function output to stdout instead of stderr.
    pub stdout: bool,
}

impl InvokeOptions {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            retry_count: 3,
            retry_interval: Duration::from_millis(1000),
            stdout: false,
        }
    }

    pub fn retry(mut self, count: u32, interval: Duration) -> Self {
        self.retry_count = count;
        self.retry_interval = interval;
        self
    }

    pub fn stdout(mut self, stdout: bool) -> Self {
        self.stdout = stdout;
        self
    }
}

/// What the runtime answered.
#[derive(Debug, Clone)]
pub struct InvokeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InvokeResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client for runtime invocation endpoints.
pub struct InvocationClient {
    host: String,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl Default for InvocationClient {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl InvocationClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Invoke and mirror the output to the console stream chosen by
    /// `options.stdout`.
    pub async fn invoke(&self, data: &str, options: &InvokeOptions) -> Result<InvokeResponse> {
        let response = self.send(data, options).await?;

        if options.stdout {
            let mut out = tokio::io::stdout();
            mirror(&mut out, &response.body).await?;
        } else {
            let mut err = tokio::io::stderr();
            let text = pretty_json(&response.text());
            mirror(&mut err, text.as_bytes()).await?;
            err.write_all(b"\n\n").await?;
            err.flush().await?;
        }

        Ok(response)
    }

    /// Invoke without echoing the output anywhere.
    ///
    /// `data` must be JSON; it is rejected before any connection is made
    /// otherwise. Connection failures are retried `options.retry_count`
    /// times, `options.retry_interval` apart, after which the last error is
    /// returned.
    pub async fn send(&self, data: &str, options: &InvokeOptions) -> Result<InvokeResponse> {
        serde_json::from_str::<serde_json::Value>(data).map_err(|source| {
            GatewayError::MalformedJson {
                input: data.to_string(),
                source,
            }
        })?;

        let uri = format!("http://{}:{}{}", self.host, options.port, INVOCATION_PATH);
        let body = Bytes::from(data.to_string());
        let mut remaining = options.retry_count;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let request = Request::post(uri.as_str())
                .header(hyper::header::CONTENT_TYPE, "application/json")
                .body(Full::new(body.clone()))
                .map_err(|e| GatewayError::Invocation(e.to_string()))?;

            match self.client.request(request).await {
                Ok(response) => {
                    let (parts, body) = response.into_parts();
                    let body = body
                        .collect()
                        .await
                        .map_err(|e| GatewayError::Invocation(e.to_string()))?
                        .to_bytes();
                    debug!("Invocation answered with {}", parts.status);
                    return Ok(InvokeResponse {
                        status: parts.status,
                        headers: parts.headers,
                        body,
                    });
                }
                Err(source) if remaining == 0 => {
                    return Err(GatewayError::InvocationConnection {
                        port: options.port,
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    warn!(
                        "Function runtime on port {} is not ready ({}), retrying in {:?}",
                        options.port, e, options.retry_interval
                    );
                    remaining -= 1;
                    tokio::time::sleep(options.retry_interval).await;
                }
            }
        }
    }
}

async fn mirror<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_json_is_rejected_without_connecting() {
        let client = InvocationClient::default();
        // Port 1 is never served here; a connection attempt would be retried.
        let options = InvokeOptions::new(1).retry(5, Duration::from_secs(60));

        let result = client.send("{not json", &options).await;
        assert!(matches!(
            result,
            Err(GatewayError::MalformedJson { input, .. }) if input == "{not json"
        ));
    }

    #[test]
    fn test_default_options() {
        let options = InvokeOptions::new(9000);
        assert_eq!(options.retry_count, 3);
        assert_eq!(options.retry_interval, Duration::from_millis(1000));
        assert!(!options.stdout);
    }
}
