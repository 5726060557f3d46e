//! The live route table.
//!
//! # Responsibilities
//! - Hold the current route set keyed by id
//! - Resolve a request to the first matching route
//! - Publish updates as a whole new snapshot
//!
//! # Design Decisions
//! - Copy-on-write: readers load an `Arc<RouteSnapshot>` and keep using it
//!   while an update builds and swaps in the next one
//! - Resolution order is `(order, insertion sequence)`; an updated route keeps
//!   its original sequence
//! - Writers are serialized by the reconciler; the table does not lock

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;

use crate::routing::route::Route;

#[derive(Debug)]
struct Slot {
    route: Arc<Route>,
    seq: u64,
}

/// An immutable view of the route table.
#[derive(Debug, Default)]
pub struct RouteSnapshot {
    by_id: HashMap<String, Slot>,
    ordered: Vec<Arc<Route>>,
    next_seq: u64,
}

impl RouteSnapshot {
    pub fn get(&self, id: &str) -> Option<&Arc<Route>> {
        self.by_id.get(id).map(|slot| &slot.route)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Routes in resolution order.
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.ordered
    }

    /// Ids in resolution order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(|r| r.id())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn resolve(&self, req: &Request<Body>) -> Option<&Arc<Route>> {
        self.ordered.iter().find(|route| route.matches(req))
    }

    /// Next snapshot with `removed` dropped and `upserts` inserted or replaced.
    fn with_changes(&self, removed: &[String], upserts: Vec<Route>) -> Self {
        let mut by_id: HashMap<String, Slot> = self
            .by_id
            .iter()
            .filter(|(id, _)| !removed.contains(id))
            .map(|(id, slot)| {
                (
                    id.clone(),
                    Slot {
                        route: slot.route.clone(),
                        seq: slot.seq,
                    },
                )
            })
            .collect();
        let mut next_seq = self.next_seq;

        for route in upserts {
            let seq = match by_id.get(route.id()) {
                Some(existing) => existing.seq,
                None => {
                    next_seq += 1;
                    next_seq
                }
            };
            by_id.insert(
                route.id().to_string(),
                Slot {
                    route: Arc::new(route),
                    seq,
                },
            );
        }

        let mut slots: Vec<&Slot> = by_id.values().collect();
        slots.sort_by_key(|slot| (slot.route.order(), slot.seq));
        let ordered = slots.into_iter().map(|slot| slot.route.clone()).collect();

        Self {
            by_id,
            ordered,
            next_seq,
        }
    }
}

/// Shared, concurrently readable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    current: ArcSwap<RouteSnapshot>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot. Stays valid across later updates.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.current.load_full()
    }

    /// First matching route in the current snapshot.
    pub fn resolve(&self, req: &Request<Body>) -> Option<Arc<Route>> {
        self.current.load().resolve(req).cloned()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Apply removals and upserts as one atomic swap.
    ///
    /// Callers must serialize writers.
    pub(crate) fn apply(&self, removed: &[String], upserts: Vec<Route>) {
        let next = self.current.load().with_changes(removed, upserts);
        self.current.store(Arc::new(next));
    }
}
