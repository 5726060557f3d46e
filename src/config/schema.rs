//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Routes are not part of this file; they come from the route source.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::body::DEFAULT_MAX_BODY_BYTES;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Application name; the route source data id is `<name>Route`.
    pub application_name: String,

    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Body capture settings.
    pub capture: CaptureConfig,

    /// Where route payloads come from.
    pub route_source: RouteSourceConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            application_name: "gateway".to_string(),
            listener: ListenerConfig::default(),
            capture: CaptureConfig::default(),
            route_source: RouteSourceConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Request/response body capture for exchange logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Enable the capture/logging filter.
    pub enabled: bool,

    /// Ceiling for a captured body in bytes.
    pub max_body_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Route source location and fetch policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteSourceConfig {
    /// Source group.
    pub group: String,

    /// Root directory holding `<group>/<data_id>.json`.
    pub directory: PathBuf,

    /// Timeout for the initial fetch in milliseconds.
    pub fetch_timeout_ms: u64,

    /// Poll interval for the change watcher in seconds.
    pub poll_interval_secs: u64,
}

impl Default for RouteSourceConfig {
    fn default() -> Self {
        Self {
            group: "DEFAULT_GROUP".to_string(),
            directory: PathBuf::from("routes"),
            fetch_timeout_ms: 5000,
            poll_interval_secs: 2,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
