//! Route table reconciliation.
//!
//! # Cycle
//! ```text
//! Idle → Fetching → Diffing → Applying → Idle
//!
//! Fetching:  take the latest pending payload
//! Diffing:   parse + compile the payload, diff ids against the live table
//! Applying:  arm body caching for every live id, then swap in
//!            (table − removed) ∪ added ∪ changed
//! ```
//!
//! # Design Decisions
//! - Single-flight: cycles hold a mutex, so two diffs never interleave writes
//! - Coalescing: pending payloads live in a `watch` slot, a newer payload
//!   replaces an unprocessed one
//! - Queued payloads older than the last applied version are skipped
//! - Parse failures abort the cycle and leave the table untouched

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};

use crate::body::caching::CachingSignal;
use crate::config::source::RoutePayload;
use crate::observability::metrics;
use crate::routing::definition::ConfigParseError;
use crate::routing::route::{compile_payload, Route};
use crate::routing::table::{RouteSnapshot, RouteTable};

/// Id-level difference between the live table and a candidate route set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub changed: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl ReconciliationDiff {
    pub fn compute(current: &RouteSnapshot, candidate: &[Route]) -> Self {
        let mut diff = Self::default();

        for route in candidate {
            let id = route.id().to_string();
            match current.get(route.id()) {
                None => diff.added.insert(id),
                Some(live) if live.definition() == route.definition() => diff.unchanged.insert(id),
                Some(_) => diff.changed.insert(id),
            };
        }

        let candidate_ids: BTreeSet<&str> = candidate.iter().map(Route::id).collect();
        diff.removed = current
            .ids()
            .filter(|id| !candidate_ids.contains(id))
            .map(str::to_string)
            .collect();

        diff
    }

    /// True when applying the diff would not modify the table.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Phase of the reconciler.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle = 0,
    Fetching = 1,
    Diffing = 2,
    Applying = 3,
}

impl From<u8> for ReconcileState {
    fn from(val: u8) -> Self {
        match val {
            1 => ReconcileState::Fetching,
            2 => ReconcileState::Diffing,
            3 => ReconcileState::Applying,
            _ => ReconcileState::Idle,
        }
    }
}

/// Applies route payloads to a [`RouteTable`] one cycle at a time.
pub struct RouteTableReconciler {
    table: Arc<RouteTable>,
    signal: Arc<dyn CachingSignal>,
    state: AtomicU8,
    cycle: Mutex<()>,
    pending: watch::Sender<Option<Arc<RoutePayload>>>,
    applied_version: AtomicU64,
    completed: AtomicU64,
}

impl RouteTableReconciler {
    pub fn new(table: Arc<RouteTable>, signal: Arc<dyn CachingSignal>) -> Self {
        let (pending, _) = watch::channel(None);
        Self {
            table,
            signal,
            state: AtomicU8::new(ReconcileState::Idle as u8),
            cycle: Mutex::new(()),
            pending,
            applied_version: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    pub fn state(&self) -> ReconcileState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// Number of cycles that reached the apply phase.
    pub fn completed_cycles(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest payload version applied so far.
    pub fn applied_version(&self) -> u64 {
        self.applied_version.load(Ordering::SeqCst)
    }

    /// Queue a payload for the background loop, replacing any unprocessed one.
    pub fn trigger(&self, payload: RoutePayload) {
        tracing::debug!(version = payload.version, "Route payload queued");
        self.pending.send_replace(Some(Arc::new(payload)));
    }

    /// Run one full cycle against `payload` right away.
    pub fn reconcile(&self, payload: &RoutePayload) -> Result<ReconciliationDiff, ConfigParseError> {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        let _idle = IdleOnDrop(&self.state);

        self.set_state(ReconcileState::Diffing);
        let candidate = match compile_payload(&payload.content) {
            Ok(routes) => routes,
            Err(e) => {
                tracing::error!(
                    version = payload.version,
                    error = %e,
                    "Rejected route payload, keeping current routes"
                );
                metrics::record_reconcile("parse_error");
                return Err(e);
            }
        };

        let current = self.table.snapshot();
        let diff = ReconciliationDiff::compute(&current, &candidate);

        self.set_state(ReconcileState::Applying);
        for id in current.ids() {
            self.signal.enable_body_caching(id);
        }

        if !diff.is_empty() {
            let removed: Vec<String> = diff.removed.iter().cloned().collect();
            let upserts: Vec<Route> = candidate
                .into_iter()
                .filter(|r| diff.added.contains(r.id()) || diff.changed.contains(r.id()))
                .collect();
            self.table.apply(&removed, upserts);
        }

        self.applied_version.fetch_max(payload.version, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        metrics::record_reconcile(if diff.is_empty() { "unchanged" } else { "applied" });
        metrics::set_active_routes(self.table.len());

        tracing::info!(
            version = payload.version,
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            unchanged = diff.unchanged.len(),
            "Route table reconciled"
        );
        Ok(diff)
    }

    /// Process queued payloads until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut changes = self.pending.subscribe();
        tracing::info!("Route reconciler started");

        loop {
            while let Some(payload) = self.take_pending() {
                if payload.version < self.applied_version() {
                    tracing::debug!(
                        version = payload.version,
                        applied = self.applied_version(),
                        "Skipping stale route payload"
                    );
                    self.set_state(ReconcileState::Idle);
                    continue;
                }
                // Errors are logged inside; the previous table stays live.
                let _ = self.reconcile(&payload);
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Route reconciler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn take_pending(&self) -> Option<Arc<RoutePayload>> {
        let mut taken = None;
        self.pending.send_if_modified(|slot| {
            taken = slot.take();
            false
        });
        if taken.is_some() {
            self.set_state(ReconcileState::Fetching);
        }
        taken
    }

    fn set_state(&self, state: ReconcileState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

struct IdleOnDrop<'a>(&'a AtomicU8);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(ReconcileState::Idle as u8, Ordering::SeqCst);
    }
}
