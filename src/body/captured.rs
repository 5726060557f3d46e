//! One-shot capture of a message body into memory.
//!
//! # Responsibilities
//! - Drain a body stream exactly once, suspending on every chunk
//! - Enforce the configured size ceiling before buffering past it
//! - Remember the declared content type and charset for later decoding

use std::borrow::Cow;
use std::fmt;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap};
use futures_util::StreamExt;
use thiserror::Error;

/// Default ceiling for a single captured body (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Errors raised while draining a body stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The transport failed or closed before the body completed.
    #[error("body stream failed before completion: {0}")]
    StreamRead(#[source] axum::BoxError),

    /// The body is larger than the configured ceiling.
    #[error("body exceeds capture limit of {limit} bytes ({observed} bytes seen)")]
    PayloadTooLarge { limit: usize, observed: u64 },
}

impl CaptureError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::StreamRead(_) => "stream_read",
            CaptureError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}

/// Character sets understood by the capture and form paths.
///
/// Anything unrecognised falls back to UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1; also used for US-ASCII since it is a strict subset.
    Latin1,
}

impl Charset {
    /// Parse a charset label such as `UTF-8` or `iso-8859-1`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "us-ascii" | "ascii" => {
                Some(Charset::Latin1)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    /// Strict decode. Returns `None` when the bytes are not valid in this charset.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            Charset::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Lossy decode for logging.
    pub fn decode_lossy<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes),
            Charset::Latin1 => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Encode text. Fails with the first character this charset cannot represent.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, char> {
        match self {
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| c))
                .collect(),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed `Content-Type` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    raw: String,
    essence: String,
    charset: Charset,
}

impl ContentType {
    pub const JSON: &'static str = "application/json";
    pub const FORM_URLENCODED: &'static str = "application/x-www-form-urlencoded";
    pub const MULTIPART_FORM_DATA: &'static str = "multipart/form-data";

    /// Parse a header value like `application/json; charset=UTF-8`.
    pub fn parse(value: &str) -> Self {
        let mut params = value.split(';');
        let essence = params
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let charset = params
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
            .and_then(|(_, v)| Charset::from_label(v))
            .unwrap_or_default();

        Self {
            raw: value.to_string(),
            essence,
            charset,
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(Self::parse)
    }

    /// Lowercased `type/subtype` without parameters.
    pub fn essence(&self) -> &str {
        &self.essence
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Declared `Content-Length`, if present and well formed.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// An immutable, fully buffered message body.
///
/// Cloning shares the underlying buffer. Every call to [`CapturedBody::replay`]
/// yields a fresh body with identical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedBody {
    bytes: Bytes,
    charset: Charset,
    content_type: Option<String>,
}

impl CapturedBody {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&ContentType>) -> Self {
        Self {
            bytes: bytes.into(),
            charset: content_type.map(ContentType::charset).unwrap_or_default(),
            content_type: content_type.map(|ct| ct.as_str().to_string()),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// The declared `Content-Type` at capture time.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Body decoded with its charset, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        self.charset.decode_lossy(&self.bytes)
    }

    /// A new readable body sourced from the buffer.
    pub fn replay(&self) -> Body {
        Body::from(self.bytes.clone())
    }
}

/// Drain `body` into a [`CapturedBody`].
///
/// The declared `Content-Length` in `headers` is checked against `limit` before
/// any byte is read; chunked bodies are checked as chunks arrive and the stream
/// is dropped as soon as the ceiling is crossed.
pub async fn capture(
    body: Body,
    headers: &HeaderMap,
    limit: usize,
) -> Result<CapturedBody, CaptureError> {
    let declared = declared_length(headers);
    if let Some(len) = declared {
        if len > limit as u64 {
            return Err(CaptureError::PayloadTooLarge {
                limit,
                observed: len,
            });
        }
    }

    let capacity = declared.map(|len| len as usize).unwrap_or(0);
    let mut buf: Vec<u8> = Vec::with_capacity(capacity);
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CaptureError::StreamRead(e.into()))?;
        let observed = buf.len() + chunk.len();
        if observed > limit {
            return Err(CaptureError::PayloadTooLarge {
                limit,
                observed: observed as u64,
            });
        }
        buf.extend_from_slice(&chunk);
    }

    if let Some(expected) = declared {
        if buf.len() as u64 != expected {
            let err = std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("expected {} body bytes, received {}", expected, buf.len()),
            );
            return Err(CaptureError::StreamRead(err.into()));
        }
    }

    let content_type = ContentType::from_headers(headers);
    Ok(CapturedBody::new(buf, content_type.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn chunked_body(chunks: Vec<&'static str>) -> Body {
        let items: Vec<Result<Bytes, std::io::Error>> =
            chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        Body::from_stream(futures_util::stream::iter(items))
    }

    #[tokio::test]
    async fn capture_joins_all_chunks() {
        let body = chunked_body(vec!["{\"a\"", ":", "1}"]);
        let captured = capture(body, &HeaderMap::new(), 1024).await.unwrap();
        assert_eq!(captured.bytes().as_ref(), b"{\"a\":1}");
        assert_eq!(captured.charset(), Charset::Utf8);
    }

    #[tokio::test]
    async fn capture_records_content_type_and_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=ISO-8859-1"),
        );
        let captured = capture(Body::from(vec![0x63, 0x61, 0x66, 0xE9]), &headers, 1024)
            .await
            .unwrap();
        assert_eq!(captured.charset(), Charset::Latin1);
        assert_eq!(captured.content_type(), Some("text/plain; charset=ISO-8859-1"));
        assert_eq!(captured.text(), "café");
    }

    #[test]
    fn unknown_charset_defaults_to_utf8() {
        let ct = ContentType::parse("application/json; charset=klingon");
        assert_eq!(ct.essence(), "application/json");
        assert_eq!(ct.charset(), Charset::Utf8);
    }

    #[tokio::test]
    async fn stream_error_fails_capture() {
        let items: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = Body::from_stream(futures_util::stream::iter(items));
        let err = capture(body, &HeaderMap::new(), 1024).await.unwrap_err();
        assert!(matches!(err, CaptureError::StreamRead(_)));
    }

    #[tokio::test]
    async fn short_body_against_declared_length_is_a_stream_error() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        let err = capture(Body::from("abc"), &headers, 1024).await.unwrap_err();
        assert!(matches!(err, CaptureError::StreamRead(_)));
    }

    #[tokio::test]
    async fn declared_length_over_limit_fails_without_reading() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("4096"));
        let err = capture(Body::from("tiny"), &headers, 16).await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::PayloadTooLarge { limit: 16, observed: 4096 }
        ));
    }

    #[tokio::test]
    async fn chunked_body_over_limit_stops_reading() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let chunks = (0..10).map(|_| Ok::<_, std::io::Error>(Bytes::from_static(b"0123456789")));
        let stream = futures_util::stream::iter(chunks).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = capture(Body::from_stream(stream), &HeaderMap::new(), 25)
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::PayloadTooLarge { limit: 25, .. }));
        assert_eq!(polled.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn replay_yields_identical_bytes_each_time() {
        let captured = CapturedBody::new(Bytes::from_static(b"payload"), None);
        for _ in 0..3 {
            let bytes = axum::body::to_bytes(captured.replay(), usize::MAX).await.unwrap();
            assert_eq!(bytes.as_ref(), b"payload");
        }
    }

    #[test]
    fn latin1_encode_rejects_wide_chars() {
        assert_eq!(Charset::Latin1.encode("é"), Ok(vec![0xE9]));
        assert_eq!(Charset::Latin1.encode("€"), Err('€'));
    }
}
