//! # Lambdock - Local API Gateway for Rust Lambda functions
//!
//! Lambdock runs each function of a service in its own docker container
//! (the Lambda `provided:al2` runtime image with the function binary
//! mounted in) and puts an API Gateway emulator in front of them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         HTTP client (curl, ...)                     │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        ProxyServer (front door)                     │
//! │   Router ──► Route::validate ──► ProxyEvent ──► ProxyResponse       │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                   │  POST /2015-03-31/functions/
//!                                   ▼       function/invocations
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       ContainerRegistry                             │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐             │
//! │  │Container │  │Container │  │Container │  │   ...    │             │
//! │  │ :8080    │  │ :8080    │  │ :8080    │  │          │             │
//! │  └──────────┘  └──────────┘  └──────────┘  └──────────┘             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lambdock::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let service = ServiceConfig::load("serverless.yml")?;
//!     let gateway = Gateway::new(service, ".", Arc::new(SystemRunner))?;
//!
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     gateway.serve(ProxyConfig::new(), shutdown).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Container lifecycle
//!
//! Containers are never tracked in memory. A [`container::Container`] is a
//! snapshot of `docker inspect` output, and starting or stopping one yields
//! a new snapshot:
//!
//! 1. **Inspect**: missing containers are reported as "not exist"
//! 2. **Start**: `docker run -d --rm`, publishing the runtime port 8080
//! 3. **Stop**: `docker stop`; `--rm` removes the container

pub mod color;
pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod http;
pub mod invoke;
pub mod process;
pub mod proxy;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::commands::{Gateway, LogsRequest};
    pub use crate::config::ServiceConfig;
    pub use crate::container::{Container, ContainerConfig, ContainerRegistry, StartOptions};
    pub use crate::error::GatewayError;
    pub use crate::http::{GatewayRequest, Method, ProxyResponse};
    pub use crate::invoke::{InvocationClient, InvokeOptions};
    pub use crate::process::{CommandRunner, SystemRunner};
    pub use crate::proxy::{ProxyConfig, ProxyServer, RouteConfig, Router};
}

// Re-export for convenience
pub use commands::Gateway;
pub use config::ServiceConfig;
pub use error::{GatewayError, Result};
pub use proxy::{ProxyConfig, ProxyServer};
