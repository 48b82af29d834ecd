//! Front-door HTTP server.

use crate::error::GatewayError;
use crate::http::{GatewayRequest, ProxyResponse};
use crate::invoke::INVOCATION_PATH;
use crate::proxy::event::{EventBody, EventEncoder, ProxyEvent};
use crate::proxy::format::pretty_json;
use crate::proxy::{ProxyConfig, Router};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

type RuntimeClient = Client<HttpConnector, EventBody<Incoming>>;

/// State shared by every connection.
struct Shared {
    config: ProxyConfig,
    router: Router,
    client: RuntimeClient,
}

/// Local API Gateway emulator.
///
/// Each inbound request is routed to a function runtime, re-encoded as an
/// invocation event, and the runtime's output is shaped back into an HTTP
/// response.
pub struct ProxyServer {
    shared: Arc<Shared>,
}

impl ProxyServer {
    /// Create a proxy serving the given routes.
    pub fn new(config: ProxyConfig, router: Router) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            shared: Arc::new(Shared {
                config,
                router,
                client,
            }),
        }
    }

    /// Serve connections accepted on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!("API Gateway listening on http://{}", addr);

        if !self.shared.router.has_routes() {
            warn!("No routes registered, every request will get 404");
        }

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let shared = self.shared.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let shared = shared.clone();
                    async move { handle_request(req, shared, remote_addr).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

/// Handle an incoming front-door request.
async fn handle_request(
    req: Request<Incoming>,
    shared: Arc<Shared>,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let request = GatewayRequest::from_parts(&parts);

    debug!("Handling request: {} {} from {}", request.method, parts.uri, remote_addr);

    let response = match proxy(&shared, &request, body).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                GatewayError::RouteNotFound { .. } | GatewayError::Validation(_) => {
                    info!("{} {} rejected: {}", request.method, request.path, err)
                }
                _ => error!("{} {} failed: {}", request.method, request.path, err),
            }
            ProxyResponse::from(err)
        }
    };

    info!("{} {} -> {}", request.method, request.path, response.status_code);
    Ok(response.into_response())
}

async fn proxy(
    shared: &Shared,
    request: &GatewayRequest,
    body: Incoming,
) -> crate::error::Result<ProxyResponse> {
    let route = shared
        .router
        .dispatch(request)
        .ok_or_else(|| GatewayError::RouteNotFound {
            method: request.method.clone(),
            path: request.path.clone(),
        })?;

    let errors = route.validate(request);
    if !errors.is_empty() {
        return Err(GatewayError::Validation(errors));
    }

    let event = ProxyEvent::new(route, request);
    let encoder = EventEncoder::new(&event).map_err(|e| GatewayError::Invocation(e.to_string()))?;

    let uri = format!(
        "http://{}:{}{}",
        shared.config.runtime_host,
        route.port(),
        INVOCATION_PATH
    );
    let upstream = Request::post(uri)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(EventBody::new(encoder, body))
        .map_err(|e| GatewayError::Invocation(e.to_string()))?;

    debug!("Forwarding to function '{}' on port {}", route.function_name(), route.port());

    let sent = tokio::time::timeout(shared.config.invocation_timeout, shared.client.request(upstream))
        .await
        .map_err(|_| {
            GatewayError::Invocation(format!(
                "function '{}' did not answer within {:?}",
                route.function_name(),
                shared.config.invocation_timeout
            ))
        })?;

    let response = sent.map_err(|source| GatewayError::InvocationConnection {
        port: route.port(),
        attempts: 1,
        source,
    })?;

    let output = response
        .into_body()
        .collect()
        .await
        .map_err(|e| GatewayError::Invocation(e.to_string()))?
        .to_bytes();
    let output = String::from_utf8_lossy(&output);

    debug!("Function '{}' output:\n{}", route.function_name(), pretty_json(&output));

    Ok(ProxyResponse::from_output(&output))
}
