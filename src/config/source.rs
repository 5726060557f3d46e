//! Route source contract.
//!
//! A route source owns the authoritative route payload for one
//! `(data_id, group)` key. The gateway asks it for the current payload once at
//! startup and then subscribes to full-replacement pushes. Sources never send
//! deltas; every delivery is the whole payload.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

/// Identifies a payload in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteSourceKey {
    pub data_id: String,
    pub group: String,
}

impl RouteSourceKey {
    /// Key for an application's routes: data id `<application>Route`.
    pub fn for_application(application: &str, group: &str) -> Self {
        Self {
            data_id: format!("{application}Route"),
            group: group.to_string(),
        }
    }
}

impl fmt::Display for RouteSourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.data_id, self.group)
    }
}

/// A full route payload together with its version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePayload {
    pub content: String,
    /// Monotonically increasing per source.
    pub version: u64,
}

/// Failure to fetch or watch a route payload.
#[derive(Debug, Error)]
pub enum RouteSourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("initial fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("no payload published for {0}")]
    Missing(String),
}

/// Callback invoked with every pushed payload.
pub type ChangeHandler = Arc<dyn Fn(RoutePayload) + Send + Sync>;

/// Supplies route payloads for one key.
pub trait RouteSource: Send + Sync {
    fn key(&self) -> &RouteSourceKey;

    /// Fetch the current payload, giving up after `timeout`.
    fn initial_fetch(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<RoutePayload, RouteSourceError>> + Send;

    /// Register `handler` for change pushes until the subscription is cancelled.
    fn subscribe(&self, handler: ChangeHandler) -> Result<Subscription, RouteSourceError>;
}

/// Live registration with a route source. Dropping it cancels delivery.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct MemoryState {
    current: Option<RoutePayload>,
    handlers: Vec<(u64, ChangeHandler)>,
    next_handler: u64,
}

/// In-process route source. Used by tests and embedders that push routes
/// programmatically.
#[derive(Clone)]
pub struct MemoryRouteSource {
    key: RouteSourceKey,
    state: Arc<Mutex<MemoryState>>,
    version: Arc<AtomicU64>,
}

impl MemoryRouteSource {
    pub fn new(key: RouteSourceKey) -> Self {
        Self {
            key,
            state: Arc::new(Mutex::new(MemoryState::default())),
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the payload and notify every live subscriber.
    ///
    /// Returns the version assigned to the payload.
    pub fn publish(&self, content: impl Into<String>) -> u64 {
        let payload = RoutePayload {
            content: content.into(),
            version: self.version.fetch_add(1, Ordering::SeqCst) + 1,
        };
        let handlers: Vec<ChangeHandler> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.current = Some(payload.clone());
            state.handlers.iter().map(|(_, h)| h.clone()).collect()
        };

        tracing::debug!(key = %self.key, version = payload.version, "Publishing route payload");
        for handler in handlers {
            handler(payload.clone());
        }
        payload.version
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }
}

impl RouteSource for MemoryRouteSource {
    fn key(&self) -> &RouteSourceKey {
        &self.key
    }

    async fn initial_fetch(&self, _timeout: Duration) -> Result<RoutePayload, RouteSourceError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
            .ok_or_else(|| RouteSourceError::Missing(self.key.to_string()))
    }

    fn subscribe(&self, handler: ChangeHandler) -> Result<Subscription, RouteSourceError> {
        let id = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.next_handler += 1;
            let id = state.next_handler;
            state.handlers.push((id, handler));
            id
        };

        let state = Arc::downgrade(&self.state);
        Ok(Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handlers
                    .retain(|(h, _)| *h != id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> MemoryRouteSource {
        MemoryRouteSource::new(RouteSourceKey::for_application("gateway", "DEFAULT_GROUP"))
    }

    fn recorder() -> (ChangeHandler, Arc<Mutex<Vec<RoutePayload>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: ChangeHandler = Arc::new(move |p| sink.lock().unwrap().push(p));
        (handler, seen)
    }

    #[test]
    fn key_uses_route_suffix() {
        let key = RouteSourceKey::for_application("orders", "PROD");
        assert_eq!(key.data_id, "ordersRoute");
        assert_eq!(key.group, "PROD");
        assert_eq!(key.to_string(), "ordersRoute@PROD");
    }

    #[tokio::test]
    async fn initial_fetch_returns_latest_publish() {
        let source = source();
        assert!(matches!(
            source.initial_fetch(Duration::from_millis(10)).await,
            Err(RouteSourceError::Missing(_))
        ));

        source.publish("[]");
        source.publish(r#"[{"id":"a","uri":"http://a"}]"#);

        let payload = source.initial_fetch(Duration::from_millis(10)).await.unwrap();
        assert_eq!(payload.version, 2);
        assert!(payload.content.contains("\"a\""));
    }

    #[test]
    fn subscribers_receive_full_payloads_until_cancelled() {
        let source = source();
        let (handler, seen) = recorder();
        let subscription = source.subscribe(handler).unwrap();

        source.publish("[1]");
        source.publish("[2]");
        assert_eq!(source.subscriber_count(), 1);

        subscription.cancel();
        source.publish("[3]");

        let seen = seen.lock().unwrap();
        let versions: Vec<u64> = seen.iter().map(|p| p.version).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn dropping_subscription_cancels_it() {
        let source = source();
        let (handler, seen) = recorder();
        drop(source.subscribe(handler).unwrap());

        source.publish("[]");
        assert!(seen.lock().unwrap().is_empty());
    }
}
