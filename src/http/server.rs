//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, request ID, timeout, exchange capture)
//! - Resolve each request against the live route table
//! - Forward requests to the route target
//! - Observability (metrics, correlation IDs)

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode, Version},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::body::{capture, BodyCaching, CaptureError, CapturedBody, ContentType, Rewrap};
use crate::config::GatewayConfig;
use crate::http::capture::{capture_failure_response, capture_middleware, CaptureState};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::observability::metrics;
use crate::observability::sink::LogSink;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub caching: Arc<BodyCaching>,
    pub client: Client<HttpConnector, Body>,
    pub max_body_bytes: usize,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(
        config: GatewayConfig,
        routes: Arc<RouteTable>,
        caching: Arc<BodyCaching>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            routes,
            caching,
            client,
            max_body_bytes: config.capture.max_body_bytes,
        };

        let router = Self::build_router(&config, state, sink);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState, sink: Arc<dyn LogSink>) -> Router {
        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        if config.capture.enabled {
            let capture_state = CaptureState {
                sink,
                max_body_bytes: config.capture.max_body_bytes,
            };
            router = router.layer(middleware::from_fn_with_state(capture_state, capture_middleware));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The configured router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Resolves the route, guarantees a captured body when caching is armed, and
/// forwards to the route target.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request.request_id().unwrap_or("unknown").to_string();
    let method = request.method().clone();
    let method_str = method.to_string();
    let path = request.uri().path().to_string();

    let route = match state.routes.resolve(&request) {
        Some(route) => route,
        None => {
            tracing::warn!(request_id = %request_id, path = %path, "No route matched");
            metrics::record_request(&method_str, 404, start_time);
            return (StatusCode::NOT_FOUND, "No matching route found").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        route = route.id(),
        "Proxying request"
    );

    let request = if state.caching.is_enabled(route.id()) && !is_multipart(&request) {
        match ensure_cached(request, state.max_body_bytes).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(request_id = %request_id, route = route.id(), error = %e, "Body caching failed");
                let response = capture_failure_response(&e);
                metrics::record_request(&method_str, response.status().as_u16(), start_time);
                return response;
            }
        }
    } else {
        request
    };

    let (mut parts, body) = request.into_parts();
    parts.uri = match route.upstream_request(&parts.uri, &mut parts.headers) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(request_id = %request_id, route = route.id(), error = %e, "Route target not forwardable");
            metrics::record_request(&method_str, 502, start_time);
            return (StatusCode::BAD_GATEWAY, "Route target not forwardable").into_response();
        }
    };
    parts.headers.remove(header::HOST);
    parts.version = Version::HTTP_11;
    let upstream = Request::from_parts(parts, body);

    match state.client.request(upstream).await {
        Ok(response) => {
            let status = response.status();
            metrics::record_request(&method_str, status.as_u16(), start_time);

            let (mut parts, body) = response.into_parts();
            route.apply_response_filters(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, route = route.id(), error = %e, "Upstream error");
            metrics::record_request(&method_str, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Multipart uploads stream through unbuffered, armed or not.
fn is_multipart(request: &Request<Body>) -> bool {
    ContentType::from_headers(request.headers())
        .is_some_and(|ct| ct.essence() == ContentType::MULTIPART_FORM_DATA)
}

/// Attach a [`CapturedBody`] unless the capture middleware already did.
async fn ensure_cached(request: Request<Body>, limit: usize) -> Result<Request<Body>, CaptureError> {
    if request.extensions().get::<CapturedBody>().is_some() {
        return Ok(request);
    }
    let (parts, body) = request.into_parts();
    let captured = capture(body, &parts.headers, limit).await?;
    metrics::record_capture("request", captured.len());
    Ok(Request::rewrap(parts, &captured))
}
