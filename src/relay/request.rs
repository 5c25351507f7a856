use crate::error::{RelayError, Result};
use axum::http::{HeaderMap, HeaderName, Method};
use url::Url;

/// Client headers that may reach the upstream. Everything else, including
/// `Host` and `Connection`, is dropped.
pub const FORWARDED_HEADERS: &[&str] = &[
    "user-agent",
    "accept",
    "accept-language",
    "range",
    "authorization",
    "referer",
];

/// A validated relay request: what to fetch, how, and with which client headers.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub target: Url,
    pub method: Method,
    pub forwarded_headers: HeaderMap,
}

impl RelayRequest {
    /// Build a request from the raw inbound query string and headers.
    ///
    /// # Errors
    /// Returns [`RelayError::InvalidRequest`] when `url` is missing, empty,
    /// badly percent-encoded, or not an absolute `http(s)` URL.
    pub fn from_parts(raw_query: Option<&str>, method: Method, inbound: &HeaderMap) -> Result<Self> {
        let target = target_from_query(raw_query)?;

        Ok(Self {
            target,
            method,
            forwarded_headers: forwarded_headers(inbound),
        })
    }
}

/// Extract and decode the `url` parameter from a raw query string.
///
/// A literal `+` is kept as `+`; only `%XX` escapes are decoded.
pub fn target_from_query(raw_query: Option<&str>) -> Result<Url> {
    let encoded = raw_query
        .unwrap_or_default()
        .split('&')
        .find_map(|pair| pair.strip_prefix("url="))
        .ok_or_else(|| RelayError::InvalidRequest("missing \"url\" query parameter".into()))?;

    if encoded.is_empty() {
        return Err(RelayError::InvalidRequest(
            "empty \"url\" query parameter".into(),
        ));
    }

    if !has_valid_escapes(encoded) {
        return Err(RelayError::InvalidRequest(
            "malformed percent-encoding in \"url\"".into(),
        ));
    }

    let decoded = urlencoding::decode(encoded).map_err(|_| {
        RelayError::InvalidRequest("\"url\" does not decode to UTF-8".into())
    })?;

    let target = Url::parse(decoded.trim())
        .map_err(|e| RelayError::InvalidRequest(format!("invalid target URL: {e}")))?;

    match target.scheme() {
        "http" | "https" if target.has_host() => Ok(target),
        scheme => Err(RelayError::InvalidRequest(format!(
            "unsupported target scheme '{scheme}', only http/https can be relayed"
        ))),
    }
}

/// Every `%` must start a two-hex-digit escape.
fn has_valid_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

/// Copy the allow-listed client headers, keeping repeated values.
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        for value in inbound.get_all(*name) {
            headers.append(HeaderName::from_static(*name), value.clone());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header};

    #[test]
    fn decodes_percent_encoded_target() {
        let target =
            target_from_query(Some("url=https%3A%2F%2Fcdn.example.com%2Flive%2Findex.m3u8")).unwrap();
        assert_eq!(target.as_str(), "https://cdn.example.com/live/index.m3u8");
    }

    #[test]
    fn accepts_unencoded_target_and_other_params() {
        let target = target_from_query(Some("foo=1&url=http://origin.example:8880/a/b.ts")).unwrap();
        assert_eq!(target.as_str(), "http://origin.example:8880/a/b.ts");
    }

    #[test]
    fn encoded_target_query_survives() {
        let target = target_from_query(Some(
            "url=https%3A%2F%2Fcdn.example.com%2Fx.m3u8%3Ftoken%3Da%26b%3Dc",
        ))
        .unwrap();
        assert_eq!(target.query(), Some("token=a&b=c"));
    }

    #[test]
    fn plus_is_literal() {
        let target = target_from_query(Some("url=https://cdn.example.com/a+b.ts")).unwrap();
        assert_eq!(target.path(), "/a+b.ts");
    }

    #[test]
    fn missing_url_is_rejected() {
        assert!(matches!(
            target_from_query(None),
            Err(RelayError::InvalidRequest(_))
        ));
        assert!(matches!(
            target_from_query(Some("target=https://x")),
            Err(RelayError::InvalidRequest(_))
        ));
        assert!(matches!(
            target_from_query(Some("url=")),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn malformed_escapes_are_rejected() {
        for query in ["url=https%3A%2F%2Fcdn%zz", "url=https://cdn/%", "url=https://cdn/%4"] {
            assert!(
                matches!(target_from_query(Some(query)), Err(RelayError::InvalidRequest(_))),
                "{query}"
            );
        }
    }

    #[test]
    fn non_utf8_escape_is_rejected() {
        assert!(target_from_query(Some("url=https://cdn/%FF%FE")).is_err());
    }

    #[test]
    fn non_http_targets_are_rejected() {
        for query in ["url=file:///etc/passwd", "url=ftp://cdn/x.ts", "url=not-a-url", "url=data:text/plain,x"] {
            assert!(target_from_query(Some(query)).is_err(), "{query}");
        }
    }

    #[test]
    fn only_allow_listed_headers_are_forwarded() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("relay.example"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::COOKIE, HeaderValue::from_static("session=1"));
        inbound.insert(header::RANGE, HeaderValue::from_static("bytes=1000-"));
        inbound.insert(header::USER_AGENT, HeaderValue::from_static("TestPlayer/1.0"));
        inbound.append(header::ACCEPT, HeaderValue::from_static("*/*"));
        inbound.append(header::ACCEPT, HeaderValue::from_static("video/mp2t"));

        let forwarded = forwarded_headers(&inbound);

        assert!(forwarded.get(header::HOST).is_none());
        assert!(forwarded.get(header::CONNECTION).is_none());
        assert!(forwarded.get(header::COOKIE).is_none());
        assert_eq!(forwarded.get(header::RANGE).unwrap(), "bytes=1000-");
        assert_eq!(forwarded.get(header::USER_AGENT).unwrap(), "TestPlayer/1.0");
        assert_eq!(forwarded.get_all(header::ACCEPT).iter().count(), 2);
    }
}
