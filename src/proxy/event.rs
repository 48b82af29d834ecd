//! Invocation envelope sent to a function runtime, and the streaming
//! encoder that produces it.
//!
//! The envelope is emitted in two pieces. Everything except `body` is
//! available as soon as the request head is known, so it is sent first
//! with the closing brace withheld. The request body is buffered and, once
//! complete, appended as a JSON string followed by the closing brace. This
//! lets the connection to the runtime open before the caller finishes
//! uploading; the body itself is not forwarded incrementally.

use crate::http::GatewayRequest;
use crate::proxy::route::Route;
use bytes::{Bytes, BytesMut};
use hyper::body::{Body, Frame, SizeHint};
use serde::Serialize;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Request metadata a function sees under `requestContext`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub identity: serde_json::Map<String, serde_json::Value>,
    pub authorizer: serde_json::Map<String, serde_json::Value>,
    pub http_method: String,
    /// Milliseconds since the Unix epoch.
    pub request_time_epoch: u64,
}

/// Invocation envelope for one front-door request, without its body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEvent {
    pub resource: String,
    pub path: String,
    pub http_method: String,
    pub headers: BTreeMap<String, String>,
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    pub query_string_parameters: BTreeMap<String, String>,
    pub multi_value_query_string_parameters: BTreeMap<String, Vec<String>>,
    pub path_parameters: BTreeMap<String, String>,
    pub stage_variables: BTreeMap<String, String>,
    pub request_context: RequestContext,
    pub is_base64_encoded: bool,
}

impl ProxyEvent {
    /// Describe a request that matched `route`.
    pub fn new(route: &Route, request: &GatewayRequest) -> Self {
        Self {
            resource: "/".to_string(),
            path: request.path.clone(),
            http_method: request.method.clone(),
            headers: request.single_value_headers(),
            multi_value_headers: request.headers.clone(),
            query_string_parameters: route.query_params(request),
            multi_value_query_string_parameters: route.multi_query_params(request),
            path_parameters: route.path_params(request),
            stage_variables: BTreeMap::new(),
            request_context: RequestContext {
                identity: serde_json::Map::new(),
                authorizer: serde_json::Map::new(),
                http_method: request.method.clone(),
                request_time_epoch: current_timestamp(),
            },
            is_base64_encoded: false,
        }
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Incremental encoder for the envelope.
///
/// `take_prefix` yields the envelope without its closing brace exactly
/// once; `on_data` buffers body bytes; `on_end` yields the remainder.
#[derive(Debug)]
pub struct EventEncoder {
    prefix: Bytes,
    prefix_sent: bool,
    body: BytesMut,
}

impl EventEncoder {
    pub fn new(event: &ProxyEvent) -> serde_json::Result<Self> {
        let mut json = serde_json::to_vec(event)?;
        // A serialized struct always ends with its closing brace.
        json.pop();
        Ok(Self {
            prefix: Bytes::from(json),
            prefix_sent: false,
            body: BytesMut::new(),
        })
    }

    /// The envelope head, available before any body byte arrives.
    pub fn take_prefix(&mut self) -> Option<Bytes> {
        if self.prefix_sent {
            return None;
        }
        self.prefix_sent = true;
        Some(self.prefix.clone())
    }

    /// Buffer a chunk of the request body.
    pub fn on_data(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    /// Close the envelope, adding `body` when any bytes were buffered.
    pub fn on_end(&mut self) -> Bytes {
        let rest = if self.body.is_empty() {
            Bytes::from_static(b"}")
        } else {
            let text = String::from_utf8_lossy(&self.body);
            // Serializing a str cannot fail.
            let escaped = serde_json::to_string(&text).unwrap_or_default();
            Bytes::from(format!(",\"body\":{}}}", escaped))
        };

        debug!(
            event = %format!(
                "{}{}",
                String::from_utf8_lossy(&self.prefix),
                String::from_utf8_lossy(&rest)
            ),
            "Invocation event"
        );
        rest
    }

    /// Encode a fully buffered request in one go.
    pub fn encode(event: &ProxyEvent, body: &[u8]) -> serde_json::Result<Bytes> {
        let mut encoder = Self::new(event)?;
        let mut out = BytesMut::new();
        if let Some(prefix) = encoder.take_prefix() {
            out.extend_from_slice(&prefix);
        }
        encoder.on_data(body);
        out.extend_from_slice(&encoder.on_end());
        Ok(out.freeze())
    }
}

/// Request body that streams the envelope for an inbound body `B`.
pub struct EventBody<B> {
    encoder: EventEncoder,
    inner: Option<B>,
}

impl<B> EventBody<B> {
    pub fn new(encoder: EventEncoder, inner: B) -> Self {
        Self {
            encoder,
            inner: Some(inner),
        }
    }
}

impl<B> Body for EventBody<B>
where
    B: Body + Unpin,
    B::Data: AsRef<[u8]>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(prefix) = this.encoder.take_prefix() {
            return Poll::Ready(Some(Ok(Frame::data(prefix))));
        }

        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(inner).poll_frame(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(frame))) => {
                    // Trailers carry nothing the envelope can express.
                    if let Ok(data) = frame.into_data() {
                        this.encoder.on_data(data.as_ref());
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.inner = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    return Poll::Ready(Some(Ok(Frame::data(this.encoder.on_end()))));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_none() && self.encoder.prefix_sent
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}
