use crate::{
    error::Result,
    metrics,
    relay::{self, RelayKind, RelayRequest},
    server::{state::AppState, url_validation::validate_target},
};
use axum::{
    extract::{RawQuery, State},
    http::{HeaderMap, Method},
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

/// Relay `?url=<target>` through this service
///
/// Playlists come back rewritten so every segment, variant and key request
/// returns here; anything else is streamed through unchanged.
pub async fn serve_relay(
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();

    let request = match RelayRequest::from_parts(query.as_deref(), method, &headers) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected relay request: {}", e);
            metrics::record_request("invalid", 400);
            return Err(e);
        }
    };

    let guessed_kind = RelayKind::for_target(&request.target);

    if state.config.block_private_origins
        && let Err(e) = validate_target(&request.target)
    {
        warn!("Blocked relay target {}: {}", request.target, e);
        metrics::record_request(guessed_kind.as_str(), 400);
        return Err(e);
    }

    info!("Relaying {} {}", request.method, request.target);

    match relay::relay(
        &state.http_client,
        &request,
        &state.endpoint,
        &state.fetch_options,
    )
    .await
    {
        Ok((kind, response)) => {
            metrics::record_request(kind.as_str(), response.status().as_u16());
            metrics::record_duration(kind.as_str(), start);
            Ok(response)
        }
        Err(e) => {
            metrics::record_upstream_error(guessed_kind.as_str());
            metrics::record_request(guessed_kind.as_str(), e.status().as_u16());
            metrics::record_duration(guessed_kind.as_str(), start);
            Err(e)
        }
    }
}
