//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! Route payloads (separate from the settings file):
//!     source.rs    RouteSource contract + in-memory source
//!     watcher.rs   file-backed source, notify-driven pushes
//!     → RouteTableReconciler
//! ```
//!
//! # Design Decisions
//! - Settings are immutable once loaded; only routes change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::GatewayConfig;
pub use schema::{CaptureConfig, ListenerConfig, ObservabilityConfig, RouteSourceConfig, TimeoutConfig};
pub use source::{
    ChangeHandler, MemoryRouteSource, RoutePayload, RouteSource, RouteSourceError, RouteSourceKey,
    Subscription,
};
pub use watcher::FileRouteSource;
