//! Body capture and replay subsystem.
//!
//! # Data Flow
//! ```text
//! inbound body stream (read once)
//!     → captured.rs (drain under a size ceiling → CapturedBody)
//!     → form.rs (decode/re-encode urlencoded forms)
//!     → rewrite.rs (rewrap message: replayable body + corrected framing)
//!     → rest of the filter chain
//!
//! reconciler cache signal
//!     → caching.rs (arm body caching for a route id)
//! ```
//!
//! # Design Decisions
//! - A body stream is consumed by value; once captured only the buffer is read
//! - `CapturedBody` is immutable and cheap to clone (`Bytes`)
//! - Form codec errors are value-local and never fail the exchange

pub mod caching;
pub mod captured;
pub mod form;
pub mod rewrite;

pub use caching::{BodyCaching, CachingSignal};
pub use captured::{capture, CaptureError, CapturedBody, Charset, ContentType, DEFAULT_MAX_BODY_BYTES};
pub use form::{FormEncodingError, FormEntries};
pub use rewrite::Rewrap;
