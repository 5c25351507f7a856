use crate::hls::{
    parser::{self, ManifestEntry},
    uri::{self, RelayEndpoint, Resolution},
};
use crate::metrics;
use tracing::{debug, warn};
use url::Url;

/// Rewritten playlist text plus counters for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub text: String,
    /// References re-addressed through the relay
    pub rewritten: usize,
    /// References that could not be resolved and were left as written
    pub anomalies: usize,
}

/// Rewrite every reference in `text` to go through `endpoint`.
///
/// `base` is the manifest's directory (see [`uri::base_uri`]). Pure apart
/// from logging; the output has exactly as many lines as the input.
pub fn rewrite(text: &str, base: &Url, endpoint: &RelayEndpoint) -> Rewritten {
    rewrite_entries(parser::parse(text), base, endpoint)
}

/// Rewrite already-parsed entries, joining the resulting lines with `\n`.
pub fn rewrite_entries<'a>(
    entries: impl IntoIterator<Item = ManifestEntry<'a>>,
    base: &Url,
    endpoint: &RelayEndpoint,
) -> Rewritten {
    let mut out = Rewritten {
        text: String::new(),
        rewritten: 0,
        anomalies: 0,
    };

    for (idx, entry) in entries.into_iter().enumerate() {
        if idx > 0 {
            out.text.push('\n');
        }

        let line = entry.line();
        let Some((path, span)) = entry.reference() else {
            out.text.push_str(line);
            continue;
        };

        if path.is_empty() || path.starts_with('#') {
            out.text.push_str(line);
            continue;
        }

        match uri::resolve(path, base, endpoint) {
            Ok(Resolution::Absolute(absolute)) => {
                out.text.push_str(&line[..span.start]);
                out.text.push_str(&endpoint.wrap(&absolute));
                out.text.push_str(&line[span.end..]);
                out.rewritten += 1;
            }
            Ok(Resolution::Verbatim) => out.text.push_str(line),
            Err(e) => {
                warn!("Leaving manifest line {} unchanged: {}", idx + 1, e);
                metrics::record_rewrite_anomaly();
                out.text.push_str(line);
                out.anomalies += 1;
            }
        }
    }

    debug!(
        "Rewrote {} manifest references ({} left unchanged after errors)",
        out.rewritten, out.anomalies
    );

    out
}
