use crate::{
    config::Config,
    hls::RelayEndpoint,
    relay::{FetchOptions, fetch::build_client},
};
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
///
/// Everything here is immutable after startup; requests share nothing else.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Shared HTTP client for upstream fetches (pooled internally)
    pub http_client: Client,
    /// Address written into rewritten manifests
    pub endpoint: Arc<RelayEndpoint>,
    /// Per-call fetch settings derived from the config
    pub fetch_options: Arc<FetchOptions>,
    /// Prometheus exporter handle, if this process owns the recorder
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration
    ///
    /// # Errors
    /// Fails if the upstream HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let http_client = build_client(&config.client_options())?;

        Ok(Self {
            endpoint: Arc::new(config.relay_endpoint()),
            fetch_options: Arc::new(config.fetch_options()),
            config: Arc::new(config),
            http_client,
            metrics: crate::metrics::init(),
            started_at: Instant::now(),
        })
    }
}
