//! Manifest-vs-media decision and emitted Content-Type.
//!
//! The policy is a handful of ordered tables rather than branching logic;
//! every input falls through to a defined answer.

use url::Url;

/// Content-Type emitted for rewritten playlists.
pub const MANIFEST_CONTENT_TYPE: &str = "application/x-mpegurl";

/// Fallback when neither the upstream nor the extension table names a type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Declared types that always mean "playlist".
const MANIFEST_TYPES: &[&str] = &[
    "application/x-mpegurl",
    "application/vnd.apple.mpegurl",
    "audio/x-mpegurl",
    "audio/mpegurl",
];

/// Declared types too generic to trust; the extension decides.
const AMBIGUOUS_TYPES: &[&str] = &[
    "text/plain",
    "application/octet-stream",
    "binary/octet-stream",
];

/// Declared media types forwarded unchanged.
const MEDIA_TYPES: &[&str] = &[
    "video/mp2t",
    "video/mpeg",
    "video/mp4",
    "audio/aac",
    "audio/mpeg",
    "application/octet-stream",
];

/// Extension fallback, consulted when the declared type is not in [`MEDIA_TYPES`].
const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("ts", "video/mp2t"),
    ("mp4", "video/mp4"),
    ("aac", "audio/aac"),
    ("mp3", "audio/mpeg"),
    ("key", "application/octet-stream"),
    ("mkv", "video/x-matroska"),
];

const MANIFEST_EXTENSION: &str = "m3u8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_manifest: bool,
    pub content_type: String,
}

/// Lowercased MIME essence: `Video/MP2T; charset=x` → `video/mp2t`
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Lowercased extension of the last path segment, if any.
fn extension(target: &Url) -> Option<String> {
    let last = target.path().rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Whether the target path names a playlist (`.m3u8`, any case).
pub fn is_manifest_path(target: &Url) -> bool {
    extension(target).as_deref() == Some(MANIFEST_EXTENSION)
}

/// Decide how to relay an upstream response.
///
/// A declared playlist type always wins. A missing or generic declared type
/// defers to the `.m3u8` extension.
pub fn classify(upstream_content_type: Option<&str>, target: &Url) -> Classification {
    let declared = upstream_content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty());
    let declared_essence = declared.map(essence);
    let declared_essence = declared_essence.as_deref();

    let is_manifest = match declared_essence {
        Some(ct) if MANIFEST_TYPES.contains(&ct) => true,
        Some(ct) if AMBIGUOUS_TYPES.contains(&ct) => is_manifest_path(target),
        Some(_) => false,
        None => is_manifest_path(target),
    };

    if is_manifest {
        return Classification {
            is_manifest,
            content_type: MANIFEST_CONTENT_TYPE.to_string(),
        };
    }

    let content_type = declared
        .filter(|_| declared_essence.is_some_and(|ct| MEDIA_TYPES.contains(&ct)))
        .or_else(|| {
            let ext = extension(target)?;
            EXTENSION_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, ct)| *ct)
        })
        .or(declared)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    Classification {
        is_manifest,
        content_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn check(content_type: Option<&str>, target: &str) -> (bool, String) {
        let c = classify(content_type, &url(target));
        (c.is_manifest, c.content_type)
    }

    #[test]
    fn octet_stream_with_m3u8_extension_is_manifest() {
        assert_eq!(
            check(Some("application/octet-stream"), "https://cdn.example.com/x.m3u8"),
            (true, MANIFEST_CONTENT_TYPE.to_string())
        );
    }

    #[test]
    fn mpeg_ts_segment_is_media() {
        assert_eq!(
            check(Some("video/mp2t"), "https://cdn.example.com/seg1.ts"),
            (false, "video/mp2t".to_string())
        );
    }

    #[test]
    fn declared_manifest_type_wins_without_extension() {
        for ct in [
            "application/vnd.apple.mpegurl",
            "application/x-mpegURL",
            "audio/mpegurl; charset=utf-8",
        ] {
            assert_eq!(
                check(Some(ct), "https://cdn.example.com/playlist?id=7"),
                (true, MANIFEST_CONTENT_TYPE.to_string()),
                "{ct}"
            );
        }
    }

    #[test]
    fn specific_non_manifest_type_beats_extension() {
        assert_eq!(
            check(Some("text/html"), "https://cdn.example.com/x.m3u8"),
            (false, "text/html".to_string())
        );
    }

    #[test]
    fn missing_type_defers_to_extension() {
        assert!(check(None, "https://cdn.example.com/LIVE.M3U8").0);
        assert_eq!(
            check(None, "https://cdn.example.com/seg.ts"),
            (false, "video/mp2t".to_string())
        );
        assert_eq!(check(Some("  "), "https://cdn.example.com/seg.aac").1, "audio/aac");
    }

    #[test]
    fn text_plain_media_uses_extension_table() {
        assert_eq!(
            check(Some("text/plain"), "https://cdn.example.com/movie.mkv"),
            (false, "video/x-matroska".to_string())
        );
    }

    #[test]
    fn recognised_media_type_kept_verbatim() {
        assert_eq!(
            check(Some("application/octet-stream"), "https://cdn.example.com/seg.ts").1,
            "application/octet-stream"
        );
        assert_eq!(
            check(Some("video/MP4; codecs=avc1"), "https://cdn.example.com/a.bin").1,
            "video/MP4; codecs=avc1"
        );
    }

    #[test]
    fn uncommon_declared_type_kept_when_no_table_hit() {
        assert_eq!(
            check(Some("image/webp"), "https://cdn.example.com/poster").1,
            "image/webp"
        );
    }

    #[test]
    fn nothing_known_falls_back_to_octet_stream() {
        assert_eq!(
            check(None, "https://cdn.example.com/blob"),
            (false, DEFAULT_CONTENT_TYPE.to_string())
        );
    }

    #[test]
    fn manifest_path_ignores_query_and_directories() {
        assert!(is_manifest_path(&url("https://a/live/index.m3u8?token=1")));
        assert!(!is_manifest_path(&url("https://a/live.m3u8/seg.ts")));
        assert!(!is_manifest_path(&url("https://a/live/")));
    }
}
