//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{body::Body, http::Request, response::Response, routing::any, Router};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use dynamic_gateway::config::{GatewayConfig, MemoryRouteSource, RouteSourceKey, Subscription};
use dynamic_gateway::lifecycle::{GatewayContext, Shutdown};
use dynamic_gateway::observability::{ExchangeRecord, LogSink};

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response_str = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    addr
}

/// Start a backend that echoes the request body and reports the path it saw
/// in `x-echo-path`.
pub async fn start_echo_backend() -> SocketAddr {
    async fn echo(request: Request<Body>) -> Response {
        let path = request.uri().path().to_string();
        let content_type = request.headers().get("content-type").cloned();
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();

        let mut response = Response::new(Body::from(body));
        response
            .headers_mut()
            .insert("x-echo-path", path.parse().unwrap());
        if let Some(ct) = content_type {
            response.headers_mut().insert("content-type", ct);
        }
        response
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/", any(echo))
        .route("/{*path}", any(echo));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Log sink that keeps every record for inspection.
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<ExchangeRecord>>);

impl LogSink for RecordingSink {
    fn record(&self, record: ExchangeRecord) {
        self.0.lock().unwrap().push(record);
    }
}

impl RecordingSink {
    pub fn records(&self) -> Vec<ExchangeRecord> {
        self.0.lock().unwrap().clone()
    }

    /// Wait for at least `count` records.
    pub async fn wait_for(&self, count: usize) -> Vec<ExchangeRecord> {
        for _ in 0..100 {
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} exchange records, got {}", self.records().len());
    }
}

/// A gateway running on an ephemeral port, fed by an in-memory route source.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub source: MemoryRouteSource,
    pub sink: Arc<RecordingSink>,
    pub ctx: GatewayContext,
    pub shutdown: Arc<Shutdown>,
    _subscription: Subscription,
}

impl TestGateway {
    pub async fn start(initial_routes: &str) -> Self {
        Self::start_with(GatewayConfig::default(), initial_routes).await
    }

    pub async fn start_with(config: GatewayConfig, initial_routes: &str) -> Self {
        let source = MemoryRouteSource::new(RouteSourceKey::for_application(
            &config.application_name,
            &config.route_source.group,
        ));
        source.publish(initial_routes);

        let shutdown = Arc::new(Shutdown::new());
        let ctx = GatewayContext::new(config);
        let subscription = ctx.bootstrap(&source, &shutdown).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let server = ctx.http_server(sink.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        Self {
            addr,
            source,
            sink,
            ctx,
            shutdown,
            _subscription: subscription,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Publish a new payload and wait until the reconciler has applied it.
    pub async fn publish(&self, routes: &str) {
        let version = self.source.publish(routes);
        for _ in 0..200 {
            if self.ctx.reconciler.applied_version() >= version
                && self.ctx.reconciler.state() == dynamic_gateway::routing::ReconcileState::Idle
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("route payload version {version} was not applied");
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
