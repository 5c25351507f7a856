pub mod handlers;
pub mod state;
pub mod url_validation;

use crate::{config::Config, error::RelayError};
use axum::{
    Router,
    extract::Request,
    http::{
        HeaderName, HeaderValue, Method,
        header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use state::AppState;
use std::any::Any as PanicPayload;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
};
use tracing::{error, info};

/// Header carried by every response so players and logs can tell which
/// relay build answered
pub const VERSION_HEADER: HeaderName = HeaderName::from_static("x-relay-version");

/// Non-standard range header some origins and players use alongside `Content-Range`
const X_CONTENT_RANGE: HeaderName = HeaderName::from_static("x-content-range");

/// Build the Axum router with all routes and middleware
///
/// # Errors
/// Fails if the upstream HTTP client cannot be built.
pub fn build_router(config: Config) -> Result<Router, reqwest::Error> {
    let relay_path = config.relay_path.clone();
    let state = AppState::new(config)?;

    // Browser players fetch playlists and segments cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([CONTENT_LENGTH, CONTENT_RANGE, X_CONTENT_RANGE, ACCEPT_RANGES]);

    Ok(Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::serve_metrics))
        .route(&relay_path, get(handlers::relay::serve_relay))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(middleware::from_fn(add_version_header))
        .with_state(state))
}

/// A panicking handler becomes a generic 500; the payload only reaches the logs.
fn handle_panic(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    RelayError::Internal(format!("handler panicked: {detail}")).into_response()
}

async fn add_version_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        VERSION_HEADER,
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    response
}

/// Start the Axum HTTP server
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);
    let relay_path = config.relay_path.clone();

    let app = build_router(config)?;

    // Bind TCP listener
    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("Relay listening on http://{}{}", addr, relay_path);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn panic_becomes_generic_500() {
        let response = handle_panic(Box::new("secret detail"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Internal relay error\n");
    }

    #[tokio::test]
    async fn panicking_route_is_caught_by_layer() {
        async fn boom() -> &'static str {
            panic!("boom")
        }

        let app: Router = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(handle_panic));

        let response = tower::ServiceExt::oneshot(
            app,
            axum::http::Request::builder()
                .uri("/boom")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }
}
