//! Dynamic HTTP gateway.
//!
//! Proxies requests to targets resolved from a route table that is
//! reconciled at runtime against an external route source, and logs each
//! exchange with its captured request and response bodies.

pub mod body;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::{GatewayContext, Shutdown};
