//! Line-classification grammar for HLS playlists.
//!
//! Every line of a playlist becomes exactly one [`ManifestEntry`]. Lines are
//! classified independently, apart from remembering the last tag so that a
//! bare reference line knows whether it follows `#EXTINF` or
//! `#EXT-X-STREAM-INF`. A path is never taken from a tag's own value list;
//! `#EXTINF:10.0,title` is a plain directive.

use std::ops::Range;

/// What a bare reference line points at, judged by the tag before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Follows `#EXTINF`
    Segment,
    /// Follows `#EXT-X-STREAM-INF`
    VariantPlaylist,
    Unknown,
}

/// One classified playlist line, borrowing from the source text.
///
/// `line` is the raw line without its `\n` terminator (a `\r` stays part of
/// it). `span` is the byte range of `path` inside `line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry<'a> {
    StandaloneReference {
        path: &'a str,
        kind: ReferenceKind,
        line: &'a str,
        span: Range<usize>,
    },
    AttributeReference {
        /// Tag name without the leading `#`, e.g. `EXT-X-KEY`
        tag: &'a str,
        path: &'a str,
        line: &'a str,
        span: Range<usize>,
    },
    Directive {
        line: &'a str,
    },
    BlankOrOther {
        line: &'a str,
    },
}

impl<'a> ManifestEntry<'a> {
    pub fn line(&self) -> &'a str {
        match self {
            ManifestEntry::StandaloneReference { line, .. }
            | ManifestEntry::AttributeReference { line, .. }
            | ManifestEntry::Directive { line }
            | ManifestEntry::BlankOrOther { line } => *line,
        }
    }

    /// The reference carried by this entry and its span, if any.
    pub fn reference(&self) -> Option<(&'a str, Range<usize>)> {
        match self {
            ManifestEntry::StandaloneReference { path, span, .. }
            | ManifestEntry::AttributeReference { path, span, .. } => Some((*path, span.clone())),
            _ => None,
        }
    }
}

/// Lazy iterator over the entries of a playlist.
pub struct Entries<'a> {
    lines: std::str::Split<'a, char>,
    last_tag: Option<&'a str>,
}

/// Classify every line of `text`, in order.
///
/// Splitting is on `\n` only, so joining the entries' lines with `\n`
/// reproduces `text` byte for byte.
pub fn parse(text: &str) -> Entries<'_> {
    Entries {
        lines: text.split('\n'),
        last_tag: None,
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = ManifestEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;
        let entry = classify_line(line, self.last_tag);

        match &entry {
            ManifestEntry::Directive { line } | ManifestEntry::AttributeReference { line, .. } => {
                self.last_tag = Some(tag_name(*line));
            }
            ManifestEntry::StandaloneReference { .. } => self.last_tag = None,
            ManifestEntry::BlankOrOther { .. } => {}
        }

        Some(entry)
    }
}

fn classify_line<'a>(line: &'a str, last_tag: Option<&str>) -> ManifestEntry<'a> {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return ManifestEntry::BlankOrOther { line };
    }

    if trimmed.starts_with('#') {
        return match find_uri_attribute(line) {
            Some(span) => ManifestEntry::AttributeReference {
                tag: tag_name(line),
                path: &line[span.clone()],
                line,
                span,
            },
            None => ManifestEntry::Directive { line },
        };
    }

    let start = line.len() - line.trim_start().len();
    let span = start..start + trimmed.len();

    let kind = match last_tag {
        Some("EXTINF") => ReferenceKind::Segment,
        Some("EXT-X-STREAM-INF") => ReferenceKind::VariantPlaylist,
        _ => ReferenceKind::Unknown,
    };

    ManifestEntry::StandaloneReference {
        path: trimmed,
        kind,
        line,
        span,
    }
}

/// `#EXT-X-KEY:METHOD=...` → `EXT-X-KEY`
fn tag_name(line: &str) -> &str {
    let tag = line.trim().trim_start_matches('#');
    tag.split_once(':').map_or(tag, |(name, _)| name)
}

/// Byte range of the value of a quoted `URI` attribute inside a tag line.
///
/// Walks the attribute list after the first `:` with quote awareness, so
/// commas inside quoted values and names like `X-ASSET-URI` do not confuse it.
fn find_uri_attribute(line: &str) -> Option<Range<usize>> {
    let list_start = line.find(':')? + 1;
    let bytes = line.as_bytes();
    let mut pos = list_start;

    while pos < bytes.len() {
        // Attribute name runs to '='
        let name_start = pos;
        while pos < bytes.len() && bytes[pos] != b'=' && bytes[pos] != b',' {
            pos += 1;
        }
        if pos >= bytes.len() {
            return None;
        }
        if bytes[pos] == b',' {
            pos += 1;
            continue;
        }

        let name = line[name_start..pos].trim();
        pos += 1;

        if bytes.get(pos) == Some(&b'"') {
            let value_start = pos + 1;
            let value_len = line[value_start..].find('"')?;
            let value_end = value_start + value_len;

            if name == "URI" {
                return Some(value_start..value_end);
            }
            pos = value_end + 1;
        }

        // Skip to the next unquoted comma
        while pos < bytes.len() && bytes[pos] != b',' {
            pos += 1;
        }
        pos += 1;
    }

    None
}
