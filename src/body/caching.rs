//! Route-scoped body caching activation.
//!
//! The reconciler arms caching for route ids; the proxy handler consults the
//! registry and guarantees a [`CapturedBody`](crate::body::CapturedBody) is
//! attached to requests resolved to an armed route.

use dashmap::DashSet;

/// Receiver of cache-enable signals emitted during reconciliation.
pub trait CachingSignal: Send + Sync {
    fn enable_body_caching(&self, route_id: &str);
}

/// Set of route ids with body caching armed.
///
/// Ids are never disarmed; an armed id that leaves the route table is inert.
#[derive(Debug, Default)]
pub struct BodyCaching {
    armed: DashSet<String>,
}

impl BodyCaching {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, route_id: &str) -> bool {
        self.armed.contains(route_id)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl CachingSignal for BodyCaching {
    fn enable_body_caching(&self, route_id: &str) {
        if self.armed.insert(route_id.to_string()) {
            tracing::debug!(route_id = %route_id, "Body caching enabled");
        }
    }
}
