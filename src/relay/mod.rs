//! Fetch-classify-respond pipeline.
//!
//! Given a validated [`RelayRequest`], fetch the upstream once, decide
//! whether it is a playlist, and either rewrite it or stream it through.

pub mod classify;
pub mod fetch;
pub mod request;
pub mod response;

use crate::{
    error::{RelayError, Result},
    hls::{RelayEndpoint, base_uri, rewrite},
    metrics,
};
use axum::{
    http::{Method, header},
    response::Response,
};
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

pub use classify::{Classification, classify};
pub use fetch::{FetchError, FetchOptions, UpstreamResponse};
pub use request::RelayRequest;

/// Which path a relayed response took, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Manifest,
    Media,
}

impl RelayKind {
    /// Best guess before the upstream has answered, from the extension alone.
    pub fn for_target(target: &Url) -> Self {
        if classify::is_manifest_path(target) {
            RelayKind::Manifest
        } else {
            RelayKind::Media
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelayKind::Manifest => "manifest",
            RelayKind::Media => "media",
        }
    }
}

/// Relay one request.
///
/// Playlists are read in full and rewritten so every reference points at
/// `endpoint`; anything else is streamed. HEAD requests get the response head
/// only and never download the body.
///
/// # Errors
/// Upstream rejections, transport failures and timeouts, converted from
/// [`FetchError`].
pub async fn relay(
    client: &Client,
    request: &RelayRequest,
    endpoint: &RelayEndpoint,
    options: &FetchOptions,
) -> Result<(RelayKind, Response)> {
    let upstream = fetch::fetch(client, request, options).await?;
    let status = upstream.status();
    let classification = classify(upstream.content_type(), &request.target);
    let headers = upstream.headers().clone();

    debug!(
        "Classified {} (upstream type {:?}) as {}",
        request.target,
        upstream.content_type(),
        if classification.is_manifest {
            "manifest"
        } else {
            "media"
        }
    );

    let kind = if classification.is_manifest {
        RelayKind::Manifest
    } else {
        RelayKind::Media
    };

    if request.method == Method::HEAD {
        return Ok((
            kind,
            response::head_response(
                status,
                &headers,
                &classification.content_type,
                classification.is_manifest,
            ),
        ));
    }

    if !classification.is_manifest {
        return Ok((
            kind,
            response::stream_response(
                status,
                &headers,
                &classification.content_type,
                upstream.into_stream(),
            ),
        ));
    }

    // gzip, deflate and br were decoded by the client; any encoding left is opaque
    if let Some(encoding) = upstream.headers().get(header::CONTENT_ENCODING) {
        let encoding = String::from_utf8_lossy(encoding.as_bytes()).into_owned();
        warn!(
            "Refusing to rewrite {} with Content-Encoding {}",
            request.target, encoding
        );
        return Err(RelayError::UnsupportedEncoding(encoding));
    }

    let text = upstream.text().await?;
    let rewritten = rewrite(&text, &base_uri(&request.target), endpoint);
    metrics::record_rewritten_references(rewritten.rewritten);

    info!(
        "Rewrote playlist {}: {} references, {} left unchanged",
        request.target, rewritten.rewritten, rewritten.anomalies
    );

    Ok((
        kind,
        response::manifest_response(
            status,
            &headers,
            &classification.content_type,
            rewritten.text,
        ),
    ))
}
