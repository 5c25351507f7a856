//! Builds the client-facing response from an upstream response.
//!
//! This is the only place that decides which upstream headers reach the
//! client. Playlists go out as rewritten text; everything else is streamed
//! through without buffering.

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use futures_util::{Stream, TryStreamExt};
use tracing::warn;

/// Upstream headers never copied to the client. `Content-Type` is listed
/// because the classifier always supplies its own.
const SUPPRESSED_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "set-cookie",
    "content-encoding",
    "content-type",
];

fn is_suppressed(name: &HeaderName) -> bool {
    let name = name.as_str();
    SUPPRESSED_HEADERS.contains(&name) || name.starts_with("access-control-")
}

/// Upstream headers that may be mirrored to the client.
///
/// CORS headers are dropped here because the front end owns them.
pub fn forwarded_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !is_suppressed(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

fn build(status: StatusCode, mut headers: HeaderMap, content_type: &str, body: Body) -> Response {
    match HeaderValue::from_str(content_type) {
        Ok(ct) => {
            headers.insert(header::CONTENT_TYPE, ct);
        }
        Err(_) => warn!("Dropping unrepresentable Content-Type {:?}", content_type),
    }

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Rewritten playlist. Content-Length is recomputed from the new text.
///
/// The rewritten body is always a whole document, so a 206 from the upstream
/// goes out as 200.
pub fn manifest_response(
    status: StatusCode,
    upstream: &HeaderMap,
    content_type: &str,
    text: String,
) -> Response {
    let mut headers = forwarded_response_headers(upstream);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_RANGE);
    headers.remove(header::ACCEPT_RANGES);

    let status = if status == StatusCode::PARTIAL_CONTENT {
        StatusCode::OK
    } else {
        status
    };

    build(status, headers, content_type, Body::from(text))
}

/// Stream an upstream body through unchanged, keeping its status (206
/// included) and length headers.
///
/// The body is pulled only as fast as the client reads it; dropping the
/// response drops `body` and with it the upstream connection.
pub fn stream_response<S>(
    status: StatusCode,
    upstream: &HeaderMap,
    content_type: &str,
    body: S,
) -> Response
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let mut headers = forwarded_response_headers(upstream);

    // gzip, deflate and br are decoded by the client; anything still
    // encoded here is relayed as-is and must stay labelled
    if let Some(encoding) = upstream.get(header::CONTENT_ENCODING) {
        warn!("Relaying body with undecoded Content-Encoding {:?}", encoding);
        headers.insert(header::CONTENT_ENCODING, encoding.clone());
    }

    let body = body.inspect_err(|e| warn!("Upstream body failed mid-stream: {}", e));

    build(status, headers, content_type, Body::from_stream(body))
}

/// Response head for HEAD requests. Playlist lengths are unknown before
/// rewriting, so their Content-Length is dropped.
pub fn head_response(
    status: StatusCode,
    upstream: &HeaderMap,
    content_type: &str,
    is_manifest: bool,
) -> Response {
    let mut headers = forwarded_response_headers(upstream);
    if is_manifest {
        headers.remove(header::CONTENT_LENGTH);
    }

    build(status, headers, content_type, Body::empty())
}
