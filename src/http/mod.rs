//! Front-door HTTP types: request heads for routing and responses shaped
//! from function runtime output.

mod request;
mod response;

pub use request::{GatewayRequest, Method};
pub use response::ProxyResponse;
