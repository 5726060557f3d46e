//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID assigned and propagated)
//!     → capture.rs (request body captured/rewrapped, response teed to the log sink)
//!     → server.rs proxy handler (route resolution, body caching, forwarding)
//!     → Send to client
//! ```

pub mod capture;
pub mod request;
pub mod server;

pub use capture::{capture_middleware, CaptureState};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
