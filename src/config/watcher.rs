//! File-backed route source.
//!
//! The payload lives at `<directory>/<group>/<data_id>.json`. Changes are
//! picked up with `notify`, and every change re-reads the whole file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::source::{
    ChangeHandler, RoutePayload, RouteSource, RouteSourceError, RouteSourceKey, Subscription,
};

/// A route source that watches a JSON payload file.
pub struct FileRouteSource {
    key: RouteSourceKey,
    path: PathBuf,
    poll_interval: Duration,
    version: Arc<AtomicU64>,
}

impl FileRouteSource {
    pub fn new(directory: &Path, key: RouteSourceKey, poll_interval: Duration) -> Self {
        let path = directory
            .join(&key.group)
            .join(format!("{}.json", key.data_id));
        Self {
            key,
            path,
            poll_interval,
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Location of the payload file.
    pub fn path(&self) -> &Path {
        &self.path
    }

}

/// Versions are reserved before the file is read, so a payload read later
/// always carries a higher version than one read earlier.
fn reserve_version(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

impl RouteSource for FileRouteSource {
    fn key(&self) -> &RouteSourceKey {
        &self.key
    }

    async fn initial_fetch(&self, timeout: Duration) -> Result<RoutePayload, RouteSourceError> {
        let version = reserve_version(&self.version);
        let content = tokio::time::timeout(timeout, tokio::fs::read_to_string(&self.path))
            .await
            .map_err(|_| RouteSourceError::Timeout(timeout))?
            .map_err(|source| RouteSourceError::Io {
                path: self.path.clone(),
                source,
            })?;

        Ok(RoutePayload { content, version })
    }

    fn subscribe(&self, handler: ChangeHandler) -> Result<Subscription, RouteSourceError> {
        // Watch the group directory so the file may be created after startup.
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let path = self.path.clone();
        let counter = self.version.clone();
        let last_content: Mutex<Option<String>> = Mutex::new(None);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    if !event.paths.iter().any(|p| p.file_name() == path.file_name()) {
                        return;
                    }
                    let version = reserve_version(&counter);
                    match std::fs::read_to_string(&path) {
                        Ok(content) => {
                            let mut last = last_content.lock().unwrap_or_else(PoisonError::into_inner);
                            if last.as_deref() == Some(content.as_str()) {
                                return;
                            }
                            *last = Some(content.clone());
                            drop(last);

                            tracing::info!(path = ?path, version, "Route payload change detected");
                            handler(RoutePayload { content, version });
                        }
                        Err(e) => {
                            tracing::warn!(path = ?path, error = %e, "Failed to re-read route payload, keeping current routes");
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, key = %self.key, "Route payload watcher started");

        let key = self.key.clone();
        Ok(Subscription::new(move || {
            drop(watcher);
            tracing::info!(key = %key, "Route payload watcher stopped");
        }))
    }
}
