//! Single-attempt upstream fetch.
//!
//! Builds the outbound request from the client's allow-listed headers,
//! applies the per-call [`FetchOptions`], and hands back the upstream
//! response head with the body still unread. Failures are never retried;
//! a retry policy belongs to whoever calls the relay.

use crate::error::RelayError;
use crate::relay::{classify::is_manifest_path, request::RelayRequest};
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use futures_util::Stream;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default upstream deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default TCP/TLS connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Sent when the client does not supply its own User-Agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.4896.127 Safari/537.36";

/// Per-call fetch settings.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Deadline for the response head, and for the body when it is read as
    /// text. Streamed bodies are not bound by it.
    ///
    /// When `None`, only the client's connect timeout applies.
    pub timeout: Option<Duration>,
    /// Fallback User-Agent
    pub user_agent: String,
    /// Send the target URL as Referer when the client sent none
    pub referer_fallback: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer_fallback: false,
        }
    }
}

/// Settings baked into the shared upstream client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Skip TLS certificate verification for upstreams
    pub accept_invalid_certs: bool,
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            accept_invalid_certs: false,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

/// Build the upstream HTTP client.
///
/// # Errors
/// Returns the builder error if the TLS backend cannot be initialised.
pub fn build_client(options: &ClientOptions) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(options.connect_timeout)
        .danger_accept_invalid_certs(options.accept_invalid_certs)
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .build()
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Upstream answered with a status outside 2xx
    #[error("upstream responded {} {status_text}", status.as_u16())]
    Rejected {
        status: StatusCode,
        status_text: String,
    },

    /// DNS, connect, TLS or mid-body failure
    #[error("upstream transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream deadline exceeded")]
    Timeout,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e)
        }
    }
}

impl From<FetchError> for RelayError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Rejected {
                status,
                status_text,
            } => RelayError::UpstreamRejected {
                status,
                status_text,
            },
            FetchError::Transport(e) => RelayError::UpstreamUnreachable(e.to_string()),
            FetchError::Timeout => RelayError::UpstreamTimeout,
        }
    }
}

/// Upstream response head with an unread body.
///
/// Consumed exactly once, through [`UpstreamResponse::text`] or
/// [`UpstreamResponse::into_stream`].
#[derive(Debug)]
pub struct UpstreamResponse {
    response: reqwest::Response,
    deadline: Option<Instant>,
}

impl UpstreamResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Read the whole body as text, within what is left of the deadline.
    pub async fn text(self) -> Result<String, FetchError> {
        let read = self.response.text();
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, read)
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::from),
            None => read.await.map_err(FetchError::from),
        }
    }

    /// Body as a lazy byte stream. Dropping the stream aborts the upstream read.
    pub fn into_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        self.response.bytes_stream()
    }
}

/// Headers sent upstream for `request`.
///
/// Starts from the client's allow-listed headers, fills in User-Agent (and
/// Referer when enabled), drops Range for playlists and always asks for an
/// uncompressed body. `Host` is derived by the client from the target URL.
pub fn upstream_headers(request: &RelayRequest, options: &FetchOptions) -> HeaderMap {
    let mut headers = request.forwarded_headers.clone();

    if !headers.contains_key(header::USER_AGENT) {
        match HeaderValue::from_str(&options.user_agent) {
            Ok(ua) => {
                headers.insert(header::USER_AGENT, ua);
            }
            Err(_) => warn!("Configured User-Agent is not a valid header value"),
        }
    }

    if options.referer_fallback
        && !headers.contains_key(header::REFERER)
        && let Ok(referer) = HeaderValue::from_str(request.target.as_str())
    {
        headers.insert(header::REFERER, referer);
    }

    // Playlists are always fetched whole
    if is_manifest_path(&request.target) && headers.remove(header::RANGE).is_some() {
        debug!("Dropping Range header for playlist {}", request.target);
    }

    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers
}

/// Issue the upstream request. One attempt, no retry.
///
/// Any 2xx status (including 206) is success.
///
/// # Errors
/// - [`FetchError::Rejected`] for any other upstream status
/// - [`FetchError::Timeout`] when the deadline passes before the head arrives
/// - [`FetchError::Transport`] for network, DNS and TLS failures
pub async fn fetch(
    client: &Client,
    request: &RelayRequest,
    options: &FetchOptions,
) -> Result<UpstreamResponse, FetchError> {
    let deadline = options.timeout.map(|t| Instant::now() + t);

    let send = client
        .request(request.method.clone(), request.target.clone())
        .headers(upstream_headers(request, options))
        .send();

    let response = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, send).await.map_err(|_| {
            warn!(
                "Upstream {} did not answer within {:?}",
                request.target, options.timeout
            );
            FetchError::Timeout
        })?,
        None => send.await,
    }
    .map_err(|e| {
        warn!("Upstream fetch failed for {}: {}", request.target, e);
        FetchError::from(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        warn!("Upstream {} responded {}", request.target, status);
        return Err(FetchError::Rejected {
            status,
            status_text: reason_phrase(&response),
        });
    }

    debug!("Upstream {} responded {}", request.target, status);

    Ok(UpstreamResponse { response, deadline })
}

/// Reason phrase as the upstream sent it, or the canonical one for `status`.
fn reason_phrase(response: &reqwest::Response) -> String {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| response.status().canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "Unknown".to_string())
}
