//! Exchange log sink.
//!
//! The capture middleware hands one [`ExchangeRecord`] per completed exchange
//! to a [`LogSink`]. Failed or cancelled exchanges produce no record.

use std::borrow::Cow;
use std::time::Duration;

use axum::http::{Method, StatusCode, Uri};

use crate::body::CapturedBody;

/// Logged in place of a multipart request body.
pub const MULTIPART_MARKER: &str = "[multipart/form-data]";

/// What was logged as the request body.
#[derive(Debug, Clone)]
pub enum LoggedBody {
    /// Captured bytes (JSON, re-encoded form or raw).
    Captured(CapturedBody),
    /// The raw query string of a GET request.
    Query(String),
    /// Multipart bodies are never captured.
    Multipart,
    /// Nothing to log.
    Empty,
}

impl LoggedBody {
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            LoggedBody::Captured(body) => body.text(),
            LoggedBody::Query(query) => Cow::Borrowed(query),
            LoggedBody::Multipart => Cow::Borrowed(MULTIPART_MARKER),
            LoggedBody::Empty => Cow::Borrowed(""),
        }
    }
}

/// One completed exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRecord {
    pub request_id: Option<String>,
    pub method: Method,
    pub uri: Uri,
    pub request_body: LoggedBody,
    pub status: StatusCode,
    pub response_body: CapturedBody,
    /// Response bytes past the capture ceiling were forwarded but not recorded.
    pub response_truncated: bool,
    pub elapsed: Duration,
}

/// Receives completed exchanges. Called once per exchange, after the response
/// stream has drained.
pub trait LogSink: Send + Sync {
    fn record(&self, record: ExchangeRecord);
}

/// Default sink: one `info` event per exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn record(&self, record: ExchangeRecord) {
        tracing::info!(
            request_id = record.request_id.as_deref().unwrap_or("-"),
            method = %record.method,
            uri = %record.uri,
            status = record.status.as_u16(),
            elapsed_ms = record.elapsed.as_millis() as u64,
            request_body = %record.request_body.text(),
            response_body = %record.response_body.text(),
            response_truncated = record.response_truncated,
            "Exchange completed"
        );
    }
}
