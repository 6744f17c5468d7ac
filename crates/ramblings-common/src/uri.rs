//! AT-URI parsing and document path normalization.

use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::LazyLock;

static AT_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^at://([^/]+)/([^/]+)/([^/]+)$").expect("AT-URI regex should compile")
});

static AT_AUTHORITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^at://([^/]+)/").expect("authority regex should compile"));

/// A fully qualified record URI: `at://{repo}/{collection}/{rkey}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtUri<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub rkey: &'a str,
}

impl<'a> AtUri<'a> {
    /// Parse a three-segment record URI. Anything else returns `None`.
    pub fn parse(uri: &'a str) -> Option<Self> {
        let caps = AT_URI_RE.captures(uri)?;
        Some(Self {
            repo: caps.get(1)?.as_str(),
            collection: caps.get(2)?.as_str(),
            rkey: caps.get(3)?.as_str(),
        })
    }
}

/// Authority segment of any `at://` URI, e.g. the DID of a publication.
pub fn at_uri_authority(uri: &str) -> Option<&str> {
    AT_AUTHORITY_RE
        .captures(uri)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Strip leading slashes from a document path.
pub fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Normalize a single-string slug.
pub fn normalize_slug(slug: &str) -> String {
    normalize_path(slug).to_string()
}

/// Normalize a slug given as path segments: each segment is percent-decoded
/// and the segments are rejoined with `/`.
pub fn normalize_slug_segments<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(|s| percent_decode_str(s.as_ref()).decode_utf8_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    normalize_path(&joined).to_string()
}
