//! Rewrapping messages around a captured body.
//!
//! After capture the original stream is gone. [`Rewrap`] rebuilds a request
//! or response from its head plus a [`CapturedBody`], so the rest of the chain
//! reads a body again. The captured body is also stored in the message
//! extensions; any later consumer may call [`CapturedBody::replay`] to read
//! the same bytes once more.
//!
//! Framing headers are corrected to match the buffer:
//! - not chunked in origin: `Content-Length` is set to the buffer length and
//!   any `Transfer-Encoding` is dropped
//! - chunked in origin: `Transfer-Encoding: chunked` is kept and any stale
//!   `Content-Length` is dropped
//!
//! All other headers pass through unchanged.

use axum::body::Body;
use axum::http::{header, request, response, HeaderMap, HeaderValue, Request, Response};

use crate::body::captured::CapturedBody;

/// Rebuild a message from its head and a captured body.
pub trait Rewrap: Sized {
    type Head;

    fn rewrap(head: Self::Head, captured: &CapturedBody) -> Self;
}

impl Rewrap for Request<Body> {
    type Head = request::Parts;

    fn rewrap(mut head: request::Parts, captured: &CapturedBody) -> Self {
        correct_framing(&mut head.headers, captured.len());
        head.extensions.insert(captured.clone());
        Request::from_parts(head, captured.replay())
    }
}

impl Rewrap for Response<Body> {
    type Head = response::Parts;

    fn rewrap(mut head: response::Parts, captured: &CapturedBody) -> Self {
        correct_framing(&mut head.headers, captured.len());
        head.extensions.insert(captured.clone());
        Response::from_parts(head, captured.replay())
    }
}

/// True when the message declares chunked transfer coding.
pub fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

fn correct_framing(headers: &mut HeaderMap, len: usize) {
    if is_chunked(headers) {
        headers.remove(header::CONTENT_LENGTH);
    } else {
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::StatusCode;

    use crate::body::captured::ContentType;

    fn captured(bytes: &'static [u8]) -> CapturedBody {
        CapturedBody::new(Bytes::from_static(bytes), None)
    }

    #[tokio::test]
    async fn rewrapped_request_can_be_read_repeatedly() {
        let (head, _) = Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let request = Request::rewrap(head, &captured(b"{\"a\":1}"));

        let stored = request.extensions().get::<CapturedBody>().cloned().unwrap();
        let first = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        assert_eq!(first.as_ref(), b"{\"a\":1}");

        for _ in 0..3 {
            let again = axum::body::to_bytes(stored.replay(), usize::MAX).await.unwrap();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn content_length_matches_captured_length() {
        let (head, _) = Request::builder()
            .method("POST")
            .header(header::CONTENT_LENGTH, "99")
            .header(header::CONTENT_TYPE, ContentType::FORM_URLENCODED)
            .header("x-trace", "keep-me")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let request = Request::rewrap(head, &captured(b"a=1&b=x+y"));

        assert_eq!(request.headers()[header::CONTENT_LENGTH], "9");
        assert_eq!(request.headers()[header::CONTENT_TYPE], ContentType::FORM_URLENCODED);
        assert_eq!(request.headers()["x-trace"], "keep-me");
    }

    #[test]
    fn empty_capture_sets_zero_length() {
        let (head, _) = Request::builder()
            .method("POST")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let request = Request::rewrap(head, &captured(b""));
        assert_eq!(request.headers()[header::CONTENT_LENGTH], "0");
    }

    #[test]
    fn chunked_origin_keeps_transfer_encoding() {
        let (head, _) = Request::builder()
            .method("POST")
            .header(header::TRANSFER_ENCODING, "gzip, chunked")
            .header(header::CONTENT_LENGTH, "12")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let request = Request::rewrap(head, &captured(b"abc"));

        assert_eq!(request.headers()[header::TRANSFER_ENCODING], "gzip, chunked");
        assert!(request.headers().get(header::CONTENT_LENGTH).is_none());
    }

    #[tokio::test]
    async fn response_rewrap_keeps_status_and_fixes_length() {
        let (head, _) = Response::builder()
            .status(StatusCode::CREATED)
            .header(header::CONTENT_LENGTH, "1")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let response = Response::rewrap(head, &captured(b"created"));

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "7");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"created");
    }
}
