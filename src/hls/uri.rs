//! Reference resolution for manifest rewriting.
//!
//! Resolves playlist references against the manifest's directory (RFC 3986
//! §5 via [`Url::join`]) and recognises references that already point back
//! at the relay so they are never wrapped twice.

use thiserror::Error;
use url::Url;

/// The relay's own address, as written into rewritten manifests.
///
/// Either root-relative (`/proxy`) or absolute (`https://relay.example/proxy`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayEndpoint {
    endpoint: String,
    /// `<endpoint>?url=`
    prefix: String,
    /// `<path>?url=` when the endpoint is absolute
    path_prefix: Option<String>,
}

impl RelayEndpoint {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let prefix = format!("{}?url=", endpoint);
        let path_prefix = Url::parse(&endpoint)
            .ok()
            .filter(|u| u.has_host())
            .map(|u| format!("{}?url=", u.path()));

        Self {
            endpoint,
            prefix,
            path_prefix,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.endpoint
    }

    /// Re-address an absolute URI through the relay.
    ///
    /// Everything except `A-Z a-z 0-9 - _ . ~` is percent-encoded, so the
    /// result carries no reserved characters inside the `url` value.
    pub fn wrap(&self, absolute: &str) -> String {
        format!("{}{}", self.prefix, urlencoding::encode(absolute))
    }

    /// Whether `reference` is already in the relay's `?url=` form.
    pub fn is_relayed(&self, reference: &str) -> bool {
        reference.starts_with(&self.prefix)
            || self
                .path_prefix
                .as_deref()
                .is_some_and(|p| reference.starts_with(p))
    }
}

/// Outcome of resolving one manifest reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Fetchable absolute `http(s)` URI to be relayed
    Absolute(String),
    /// Keep the reference exactly as written (already relayed, `data:`, or a
    /// non-HTTP scheme such as `skd://` that players handle themselves)
    Verbatim,
}

#[derive(Debug, Error)]
#[error("cannot resolve reference {reference:?}: {source}")]
pub struct ResolutionError {
    pub reference: String,
    #[source]
    pub source: url::ParseError,
}

/// Directory portion of a target URL: path truncated after the last `/`,
/// query and fragment dropped.
pub fn base_uri(target: &Url) -> Url {
    let mut base = target.clone();
    base.set_query(None);
    base.set_fragment(None);

    if !base.cannot_be_a_base()
        && let Some(idx) = base.path().rfind('/')
    {
        let dir = base.path()[..=idx].to_string();
        base.set_path(&dir);
    }

    base
}

/// `scheme://...` per the RFC 3986 scheme grammar.
pub fn is_absolute(reference: &str) -> bool {
    let Some((scheme, rest)) = reference.split_once(':') else {
        return false;
    };

    let mut chars = scheme.chars();
    let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    valid_scheme && rest.starts_with("//")
}

fn is_data_uri(reference: &str) -> bool {
    reference
        .get(..5)
        .is_some_and(|p| p.eq_ignore_ascii_case("data:"))
}

fn is_http_scheme(reference: &str) -> bool {
    reference
        .split_once(':')
        .is_some_and(|(scheme, _)| {
            scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
        })
}

/// Resolve `reference` against `base`.
///
/// Absolute `http(s)` references come back unchanged (not re-normalized).
///
/// # Errors
/// Returns [`ResolutionError`] when the reference cannot be joined onto the
/// base; callers are expected to keep the original text.
pub fn resolve(
    reference: &str,
    base: &Url,
    endpoint: &RelayEndpoint,
) -> Result<Resolution, ResolutionError> {
    if endpoint.is_relayed(reference) || is_data_uri(reference) {
        return Ok(Resolution::Verbatim);
    }

    if is_absolute(reference) {
        return Ok(if is_http_scheme(reference) {
            Resolution::Absolute(reference.to_string())
        } else {
            Resolution::Verbatim
        });
    }

    let joined = base.join(reference).map_err(|source| ResolutionError {
        reference: reference.to_string(),
        source,
    })?;

    // A relative reference can still land on an absolute relay endpoint
    if endpoint.is_relayed(joined.as_str()) {
        return Ok(Resolution::Verbatim);
    }

    match joined.scheme() {
        "http" | "https" => Ok(Resolution::Absolute(joined.into())),
        _ => Ok(Resolution::Verbatim),
    }
}
