//! Error type shared by the gateway, the container manager and the CLI.

use crate::http::ProxyResponse;
use hyper::StatusCode;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Everything that can go wrong while proxying or driving containers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// An external process could not be launched at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external process ran but exited unsuccessfully.
    #[error("`{command}` exited with code {}: {}", display_code(.code), .stderr.trim())]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The inspection command itself could not be run.
    #[error("cannot inspect container \"{name}\": {source}")]
    Inspection {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The inspection command printed something that is not an inspection document.
    #[error("cannot decode inspection output for \"{name}\": {source}")]
    InspectionFormat {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The function runtime never accepted the invocation.
    #[error("cannot reach the function runtime on port {port} after {attempts} attempt(s): {source}")]
    InvocationConnection {
        port: u16,
        attempts: u32,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// The function runtime answered but its body could not be read.
    #[error("invocation failed: {0}")]
    Invocation(String),

    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// One entry per violated parameter requirement.
    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Cannot parse to JSON: {input}")]
    MalformedJson {
        input: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid path template \"{template}\": {source}")]
    InvalidPathTemplate {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("no host port is bound to {0}/tcp")]
    PortNotBound(u16),

    #[error("function \"{0}\" is not defined in the service")]
    FunctionNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "<signal>".to_string())
}

impl GatewayError {
    /// HTTP status the front door answers with when this error ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvocationConnection { .. } | GatewayError::Invocation(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GatewayError> for ProxyResponse {
    fn from(err: GatewayError) -> Self {
        let status = err.status();
        let body = match &err {
            GatewayError::Validation(errors) => serde_json::json!({ "errors": errors }),
            other => serde_json::json!({ "message": other.to_string() }),
        };
        ProxyResponse::json(status.as_u16(), &body)
    }
}
