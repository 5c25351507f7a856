use crate::hls::RelayEndpoint;
use crate::relay::fetch::{
    ClientOptions, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
    FetchOptions,
};
use std::env;
use std::time::Duration;

/// Default route the relay listens on
pub const DEFAULT_RELAY_PATH: &str = "/proxy";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub is_dev: bool,
    /// Route serving `?url=` requests; also the path written into manifests
    pub relay_path: String,
    /// Public origin of the relay (e.g. `https://relay.example.com`). When
    /// unset, rewritten references are root-relative.
    pub public_base_url: Option<String>,
    /// Upstream deadline in seconds (0 disables it)
    pub upstream_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// User-Agent sent when the client has none
    pub user_agent: String,
    /// Skip TLS verification for upstream origins
    pub accept_invalid_certs: bool,
    /// Send the target URL as Referer when the client has none
    pub referer_fallback: bool,
    /// Reject targets that are private or loopback IP literals
    pub block_private_origins: bool,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env_bool("DEV_MODE", false);

        // Port: required in prod, defaults to 3000 in dev
        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let relay_path =
            env::var("RELAY_PATH").unwrap_or_else(|_| DEFAULT_RELAY_PATH.to_string());
        if !relay_path.starts_with('/') {
            return Err(format!("RELAY_PATH must start with '/', got {relay_path:?}").into());
        }

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());

        let upstream_timeout_secs = env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let connect_timeout_secs = env::var("CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_CONNECT_TIMEOUT_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let user_agent =
            env::var("UPSTREAM_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        Ok(Config {
            port,
            is_dev,
            relay_path,
            public_base_url,
            upstream_timeout_secs,
            connect_timeout_secs,
            user_agent,
            accept_invalid_certs: env_bool("ACCEPT_INVALID_CERTS", false),
            referer_fallback: env_bool("REFERER_FALLBACK", false),
            block_private_origins: env_bool("BLOCK_PRIVATE_ORIGINS", false),
        })
    }

    /// Address written into rewritten manifests
    pub fn relay_endpoint(&self) -> RelayEndpoint {
        match &self.public_base_url {
            Some(base) => RelayEndpoint::new(format!("{}{}", base, self.relay_path)),
            None => RelayEndpoint::new(self.relay_path.clone()),
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: (self.upstream_timeout_secs > 0)
                .then(|| Duration::from_secs(self.upstream_timeout_secs)),
            user_agent: self.user_agent.clone(),
            referer_fallback: self.referer_fallback,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            accept_invalid_certs: self.accept_invalid_certs,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

/// `true`/`false` (also `1`/`0`, `yes`/`no`); anything else yields `default`
fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key)
        .map(|v| v.trim().to_lowercase())
        .as_deref()
    {
        Ok("true" | "1" | "yes") => true,
        Ok("false" | "0" | "no") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all env-var tests to prevent races between parallel test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ALL_VARS: &[&str] = &[
        "DEV_MODE",
        "PORT",
        "RELAY_PATH",
        "PUBLIC_BASE_URL",
        "UPSTREAM_TIMEOUT_SECS",
        "CONNECT_TIMEOUT_SECS",
        "UPSTREAM_USER_AGENT",
        "ACCEPT_INVALID_CERTS",
        "REFERER_FALLBACK",
        "BLOCK_PRIVATE_ORIGINS",
    ];

    /// Set env vars, run `f`, then restore original state.
    ///
    /// `set` — vars to set; `unset` — vars to remove before running `f`.
    fn with_env(set: &[(&str, &str)], unset: &[&str], f: impl FnOnce()) {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());

        // Save state for all touched vars
        let save_set: Vec<(&str, Option<String>)> = set
            .iter()
            .map(|(k, _)| (*k, std::env::var(k).ok()))
            .collect();
        let save_unset: Vec<(&str, Option<String>)> =
            unset.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for k in unset {
            // SAFETY: serialized by ENV_LOCK — no other thread modifies env vars concurrently.
            unsafe { std::env::remove_var(k) };
        }
        for (k, v) in set {
            unsafe { std::env::set_var(k, v) };
        }

        f();

        // Restore
        for (k, old) in save_set.into_iter().chain(save_unset) {
            match old {
                Some(v) => unsafe { std::env::set_var(k, v) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    #[test]
    fn dev_mode_uses_defaults() {
        with_env(&[("DEV_MODE", "true")], ALL_VARS, || {
            let config = Config::from_env().expect("should succeed in dev mode");
            assert!(config.is_dev);
            assert_eq!(config.port, 3000);
            assert_eq!(config.relay_path, "/proxy");
            assert_eq!(config.public_base_url, None);
            assert_eq!(config.upstream_timeout_secs, 30);
            assert_eq!(config.connect_timeout_secs, 10);
            assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
            assert!(!config.accept_invalid_certs);
            assert!(!config.referer_fallback);
            assert!(!config.block_private_origins);
        });
    }

    #[test]
    fn prod_mode_requires_port() {
        with_env(&[], ALL_VARS, || {
            let result = Config::from_env();
            assert!(result.is_err(), "Should fail without PORT in prod mode");
        });
    }

    #[test]
    fn prod_mode_with_port_succeeds() {
        with_env(&[("PORT", "8080")], ALL_VARS, || {
            let config = Config::from_env().unwrap();
            assert!(!config.is_dev);
            assert_eq!(config.port, 8080);
        });
    }

    #[test]
    fn relay_path_must_be_absolute() {
        with_env(&[("DEV_MODE", "true"), ("RELAY_PATH", "api")], &[], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn relay_endpoint_is_root_relative_without_public_base() {
        with_env(&[("DEV_MODE", "true"), ("RELAY_PATH", "/api")], &["PUBLIC_BASE_URL"], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.relay_endpoint().as_str(), "/api");
        });
    }

    #[test]
    fn relay_endpoint_joins_public_base() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                ("PUBLIC_BASE_URL", "https://relay.example.com/"),
            ],
            &["RELAY_PATH"],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(
                    config.relay_endpoint().as_str(),
                    "https://relay.example.com/proxy"
                );
            },
        );
    }

    #[test]
    fn flags_parsed() {
        with_env(
            &[
                ("DEV_MODE", "1"),
                ("ACCEPT_INVALID_CERTS", "true"),
                ("REFERER_FALLBACK", "yes"),
                ("BLOCK_PRIVATE_ORIGINS", "TRUE"),
            ],
            &[],
            || {
                let config = Config::from_env().unwrap();
                assert!(config.is_dev);
                assert!(config.accept_invalid_certs);
                assert!(config.referer_fallback);
                assert!(config.block_private_origins);
                assert!(config.client_options().accept_invalid_certs);
                assert!(config.fetch_options().referer_fallback);
            },
        );
    }

    #[test]
    fn timeouts_parsed_and_zero_disables_deadline() {
        with_env(
            &[
                ("DEV_MODE", "true"),
                ("UPSTREAM_TIMEOUT_SECS", "0"),
                ("CONNECT_TIMEOUT_SECS", "3"),
            ],
            &[],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.fetch_options().timeout, None);
                assert_eq!(
                    config.client_options().connect_timeout,
                    Duration::from_secs(3)
                );
            },
        );
    }

    #[test]
    fn unparseable_timeout_falls_back_to_default() {
        with_env(
            &[("DEV_MODE", "true"), ("UPSTREAM_TIMEOUT_SECS", "soon")],
            &[],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(
                    config.fetch_options().timeout,
                    Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                );
            },
        );
    }
}
