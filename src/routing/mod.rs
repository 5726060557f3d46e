//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route payload (JSON array, full replacement)
//!     → definition.rs (deserialize, dedupe ids)
//!     → route.rs (compile predicates + filters)
//!     → reconciler.rs (diff against live table, arm body caching, apply)
//!     → table.rs (atomic snapshot swap)
//!
//! Incoming Request
//!     → table.rs (resolve against current snapshot)
//!     → matcher.rs (evaluate predicates)
//!     → filter.rs (rewrite path/headers for the upstream)
//! ```
//!
//! # Design Decisions
//! - The table is replaced wholesale, never edited in place
//! - First match wins, ordered by `order` then insertion
//! - An invalid route rejects its whole payload

pub mod definition;
pub mod filter;
pub mod matcher;
pub mod reconciler;
pub mod route;
pub mod table;

pub use definition::{ConfigParseError, FilterDefinition, PredicateDefinition, RouteDefinition};
pub use reconciler::{ReconcileState, ReconciliationDiff, RouteTableReconciler};
pub use route::Route;
pub use table::{RouteSnapshot, RouteTable};
