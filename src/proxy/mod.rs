//! Front-door proxy: routing, request validation, invocation event
//! encoding and response shaping.

mod config;
pub mod event;
pub mod format;
pub mod route;
mod router;
mod server;

pub use config::ProxyConfig;
pub use event::{EventBody, EventEncoder, ProxyEvent};
pub use route::{compile_path, RequestParameters, Route, RouteConfig};
pub use router::Router;
pub use server::ProxyServer;
