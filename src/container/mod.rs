//! Lifecycle management for the docker containers that run functions.
//!
//! State is never tracked locally: every snapshot comes from `docker
//! inspect`, and `start`/`stop` hand back a freshly inspected snapshot.

#[allow(clippy::module_inception)]
mod container;
pub mod docker;
pub mod logs;
mod registry;
pub mod state;

pub use container::{status_color, Container, ContainerConfig, StartOptions};
pub use docker::{Architecture, RUNTIME_PORT};
pub use logs::{ContainerLogs, LinePrefixer, LogExit, LogOptions, LogStream};
pub use registry::ContainerRegistry;
pub use state::{parse_inspect, InspectState, PortBinding};
