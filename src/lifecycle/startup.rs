//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared route table, caching registry and reconciler
//! - Subscribe to the route source and load the initial payload
//! - Start the reconciler loop
//! - Assemble the HTTP server
//!
//! # Design Decisions
//! - Subscribe before the initial fetch so no push is lost in between; a
//!   queued push older than the fetched payload is skipped by version
//! - A failed initial fetch or subscription is logged, never fatal; the
//!   table stays as it was and the source's own schedule retries

use std::sync::Arc;
use std::time::Duration;

use crate::body::BodyCaching;
use crate::config::{GatewayConfig, RouteSource, RouteSourceError, Subscription};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::sink::LogSink;
use crate::routing::{RouteTable, RouteTableReconciler};

/// Long-lived gateway state shared by the server and the reconciler.
pub struct GatewayContext {
    pub config: GatewayConfig,
    pub routes: Arc<RouteTable>,
    pub caching: Arc<BodyCaching>,
    pub reconciler: Arc<RouteTableReconciler>,
}

impl GatewayContext {
    pub fn new(config: GatewayConfig) -> Self {
        let routes = Arc::new(RouteTable::new());
        let caching = Arc::new(BodyCaching::new());
        let reconciler = Arc::new(RouteTableReconciler::new(routes.clone(), caching.clone()));
        Self {
            config,
            routes,
            caching,
            reconciler,
        }
    }

    /// Wire `source` into the reconciler and start the reconciler loop.
    ///
    /// The returned subscription keeps pushes flowing; drop or cancel it to
    /// stop them.
    pub async fn bootstrap<S: RouteSource>(
        &self,
        source: &S,
        shutdown: &Shutdown,
    ) -> Result<Subscription, RouteSourceError> {
        let reconciler = self.reconciler.clone();
        let subscription = source.subscribe(Arc::new(move |payload| reconciler.trigger(payload)));

        let timeout = Duration::from_millis(self.config.route_source.fetch_timeout_ms);
        match source.initial_fetch(timeout).await {
            Ok(payload) => {
                // Parse errors are logged by the reconciler; the table stays empty.
                let _ = self.reconciler.reconcile(&payload);
            }
            Err(e) => {
                tracing::warn!(key = %source.key(), error = %e, "Initial route fetch failed, starting with an empty table");
            }
        }

        tokio::spawn(self.reconciler.clone().run(shutdown.subscribe()));
        tracing::info!(key = %source.key(), routes = self.routes.len(), "Route source bootstrapped");

        subscription
    }

    pub fn http_server(&self, sink: Arc<dyn LogSink>) -> HttpServer {
        HttpServer::new(
            self.config.clone(),
            self.routes.clone(),
            self.caching.clone(),
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryRouteSource, RouteSourceKey};

    fn source() -> MemoryRouteSource {
        MemoryRouteSource::new(RouteSourceKey::for_application("gateway", "DEFAULT_GROUP"))
    }

    #[tokio::test]
    async fn bootstrap_loads_initial_payload_and_follows_pushes() {
        let source = source();
        source.publish(r#"[{"id":"a","uri":"http://a"}]"#);
        let shutdown = Shutdown::new();
        let ctx = GatewayContext::new(GatewayConfig::default());

        let _subscription = ctx.bootstrap(&source, &shutdown).await.unwrap();
        assert!(ctx.routes.snapshot().contains("a"));

        source.publish(r#"[{"id":"b","uri":"http://b"}]"#);
        for _ in 0..100 {
            if ctx.routes.snapshot().contains("b") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snapshot = ctx.routes.snapshot();
        assert!(snapshot.contains("b"));
        assert!(!snapshot.contains("a"));
        assert!(ctx.caching.is_enabled("a"));

        shutdown.trigger();
    }

    #[tokio::test]
    async fn missing_initial_payload_starts_empty() {
        let source = source();
        let shutdown = Shutdown::new();
        let ctx = GatewayContext::new(GatewayConfig::default());

        let subscription = ctx.bootstrap(&source, &shutdown).await;

        assert!(subscription.is_ok());
        assert!(ctx.routes.is_empty());
        shutdown.trigger();
    }
}
