use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the relay to HTTP clients
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or unparseable `url` parameter; never reaches the network
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Target rejected by the private-origin guard
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// Upstream answered with a non-success status
    #[error("Upstream responded {} {status_text}", status.as_u16())]
    UpstreamRejected {
        status: StatusCode,
        status_text: String,
    },

    /// DNS, connect or TLS failure talking to the upstream
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Playlist body arrived in an encoding the relay cannot decode
    #[error("Upstream sent playlist with unsupported Content-Encoding {0}")]
    UnsupportedEncoding(String),

    /// Upstream did not answer within the configured deadline
    #[error("Upstream timed out")]
    UpstreamTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// HTTP status reported to the client for this error
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) | RelayError::InvalidOrigin(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::UpstreamRejected { status, .. } => *status,
            RelayError::UpstreamUnreachable(_) | RelayError::UnsupportedEncoding(_) => {
                StatusCode::BAD_GATEWAY
            }
            RelayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs
        let body = match &self {
            RelayError::Internal(detail) => {
                error!("Internal relay error: {}", detail);
                "Internal relay error\n".to_string()
            }
            other => {
                if status.is_server_error() {
                    error!(status = %status, error = %other, "Relay request failed");
                }
                format!("{}\n", other)
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
