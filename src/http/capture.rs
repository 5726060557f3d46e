//! Exchange capture and logging middleware.
//!
//! # Request side
//! ```text
//! multipart/form-data  → not captured, logged as a marker
//! GET                  → not captured, query string logged
//! application/json     → captured, rewrapped
//! x-www-form-urlencoded→ captured, decoded, re-encoded, rewrapped
//! Content-Length > 0   → captured raw, rewrapped
//! otherwise            → passed through, nothing logged
//! ```
//!
//! # Response side
//! The upstream body is wrapped in a pass-through body that copies data frames
//! into a buffer as they flow to the client. When the last frame leaves the
//! upstream body the exchange is handed to the [`LogSink`]. An errored or
//! dropped body never reaches the sink.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use hyper::body::{Body as HttpBody, Frame, SizeHint};

use crate::body::{capture, form, CaptureError, CapturedBody, ContentType, Rewrap};
use crate::body::captured::declared_length;
use crate::http::request::RequestIdExt;
use crate::observability::metrics;
use crate::observability::sink::{ExchangeRecord, LogSink, LoggedBody};

/// State for [`capture_middleware`].
#[derive(Clone)]
pub struct CaptureState {
    pub sink: Arc<dyn LogSink>,
    pub max_body_bytes: usize,
}

pub async fn capture_middleware(
    State(state): State<CaptureState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_loggable(request.uri()) {
        return next.run(request).await;
    }

    let start = Instant::now();
    let request_id = request.request_id().map(str::to_string);
    let method = request.method().clone();
    let uri = request.uri().clone();

    let (request, request_body) = match capture_request(request, state.max_body_bytes).await {
        Ok(captured) => captured,
        Err(e) => {
            tracing::warn!(
                request_id = request_id.as_deref().unwrap_or("-"),
                method = %method,
                uri = %uri,
                error = %e,
                "Request body capture failed"
            );
            return capture_failure_response(&e);
        }
    };

    let response = next.run(request).await;

    let pending = PendingExchange {
        sink: state.sink,
        request_id,
        method,
        uri,
        request_body,
        status: response.status(),
        start,
    };
    tee_response(response, pending, state.max_body_bytes)
}

/// Only http/https exchanges are logged. Origin-form URIs carry no scheme and
/// arrive over plain HTTP.
fn is_loggable(uri: &Uri) -> bool {
    match uri.scheme_str() {
        None => true,
        Some(scheme) => scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"),
    }
}

/// Maps a capture failure to the client-facing response.
pub(crate) fn capture_failure_response(error: &CaptureError) -> Response {
    metrics::record_capture_failure(error.kind());
    let status = match error {
        CaptureError::StreamRead(_) => StatusCode::BAD_REQUEST,
        CaptureError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
    };
    (status, error.to_string()).into_response()
}

async fn capture_request(
    request: Request<Body>,
    limit: usize,
) -> Result<(Request<Body>, LoggedBody), CaptureError> {
    let content_type = ContentType::from_headers(request.headers());
    let essence = content_type.as_ref().map(ContentType::essence);

    if essence == Some(ContentType::MULTIPART_FORM_DATA) {
        return Ok((request, LoggedBody::Multipart));
    }

    if request.method() == Method::GET {
        let logged = match request.uri().query() {
            Some(query) if !query.trim().is_empty() => LoggedBody::Query(query.to_string()),
            _ => LoggedBody::Empty,
        };
        return Ok((request, logged));
    }

    let is_json = essence == Some(ContentType::JSON);
    let is_form = essence == Some(ContentType::FORM_URLENCODED);
    let has_length = declared_length(request.headers()).is_some_and(|len| len > 0);
    if !(is_json || is_form || has_length) {
        return Ok((request, LoggedBody::Empty));
    }

    let (parts, body) = request.into_parts();
    let mut captured = capture(body, &parts.headers, limit).await?;
    metrics::record_capture("request", captured.len());

    if is_form {
        captured = reencode_form(captured, content_type.as_ref());
    }

    let request = Request::rewrap(parts, &captured);
    Ok((request, LoggedBody::Captured(captured)))
}

/// Decode and re-encode a urlencoded body. An empty decode keeps the original.
fn reencode_form(captured: CapturedBody, content_type: Option<&ContentType>) -> CapturedBody {
    let charset = captured.charset();
    let entries = form::decode(&captured.text(), charset);
    if entries.is_empty() {
        return captured;
    }
    CapturedBody::new(Bytes::from(form::encode(&entries, charset)), content_type)
}

struct PendingExchange {
    sink: Arc<dyn LogSink>,
    request_id: Option<String>,
    method: Method,
    uri: Uri,
    request_body: LoggedBody,
    status: StatusCode,
    start: Instant,
}

impl PendingExchange {
    fn complete(self, recorded: Bytes, truncated: bool, content_type: Option<ContentType>) {
        metrics::record_capture("response", recorded.len());
        let elapsed: Duration = self.start.elapsed();
        self.sink.record(ExchangeRecord {
            request_id: self.request_id,
            method: self.method,
            uri: self.uri,
            request_body: self.request_body,
            status: self.status,
            response_body: CapturedBody::new(recorded, content_type.as_ref()),
            response_truncated: truncated,
            elapsed,
        });
    }
}

struct Tee {
    pending: PendingExchange,
    recorded: BytesMut,
    truncated: bool,
    limit: usize,
    content_type: Option<ContentType>,
}

impl Tee {
    fn record(&mut self, chunk: &Bytes) {
        let room = self.limit.saturating_sub(self.recorded.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.recorded
            .extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn finish(self) {
        let Tee {
            pending,
            recorded,
            truncated,
            content_type,
            ..
        } = self;
        pending.complete(recorded.freeze(), truncated, content_type);
    }
}

fn tee_response(response: Response, pending: PendingExchange, limit: usize) -> Response {
    let (parts, body) = response.into_parts();
    let tee = Tee {
        pending,
        recorded: BytesMut::new(),
        truncated: false,
        limit,
        content_type: ContentType::from_headers(&parts.headers),
    };

    // An empty body may never be polled once the server sees it is finished.
    if body.is_end_stream() {
        tee.finish();
        return Response::from_parts(parts, body);
    }

    Response::from_parts(
        parts,
        Body::new(TeeBody {
            inner: body,
            tee: Some(tee),
        }),
    )
}

/// Pass-through body that copies data frames into a [`Tee`].
///
/// The record is completed on the frame that leaves the inner body at end of
/// stream, or when the inner body yields `None`. Dropping the body before that
/// point discards the record.
struct TeeBody {
    inner: Body,
    tee: Option<Tee>,
}

impl HttpBody for TeeBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let (Some(data), Some(tee)) = (frame.data_ref(), this.tee.as_mut()) {
                    tee.record(data);
                }
                if this.inner.is_end_stream() {
                    if let Some(tee) = this.tee.take() {
                        tee.finish();
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                if let Some(tee) = this.tee.take() {
                    tracing::warn!(
                        uri = %tee.pending.uri,
                        error = %e,
                        "Response stream failed, exchange not logged"
                    );
                    metrics::record_capture_failure("stream_read");
                }
                Poll::Ready(Some(Err(e)))
            }
            None => {
                if let Some(tee) = this.tee.take() {
                    tee.finish();
                }
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
