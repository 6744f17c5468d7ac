//! Document metadata pulled from loosely typed record values.
//!
//! Each field is read through an ordered list of candidate paths; the first
//! path holding a non-empty string wins.

use std::cmp::Reverse;
use std::sync::LazyLock;

use ramblings_common::Record;
use ramblings_common::uri::normalize_path;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use smol_str::SmolStr;

use crate::facet::escape_html;

/// A path into a record value, outermost key first.
type FieldPath = &'static [&'static str];

pub const TITLE_FIELDS: &[FieldPath] = &[&["title"], &["name"], &["content", "title"]];

pub const DESCRIPTION_FIELDS: &[FieldPath] =
    &[&["description"], &["summary"], &["content", "description"]];

pub const PUBLISHED_AT_FIELDS: &[FieldPath] = &[
    &["publishedAt"],
    &["createdAt"],
    &["indexedAt"],
    &["updatedAt"],
    &["content", "publishedAt"],
];

const UNTITLED: &str = "Untitled";
const WORDS_PER_MINUTE: usize = 200;

static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("paragraph regex should compile"));

/// First non-empty string found along `rules`.
pub fn first_field<'a>(value: &'a Value, rules: &[FieldPath]) -> Option<&'a str> {
    rules.iter().find_map(|path| {
        path.iter()
            .try_fold(value, |v, key| v.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    })
}

/// Title, then name, then `content.title`, then the document path.
pub fn extract_title(value: &Value) -> String {
    if let Some(title) = first_field(value, TITLE_FIELDS) {
        return title.to_string();
    }
    let path = value
        .get("path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or(UNTITLED);
    normalize_path(path).to_string()
}

/// Explicit description fields, then the first non-empty line of the plain
/// text body.
pub fn extract_description(value: &Value) -> Option<String> {
    first_field(value, DESCRIPTION_FIELDS)
        .or_else(|| {
            value
                .get("textContent")
                .and_then(Value::as_str)
                .and_then(|text| text.split('\n').find(|line| !line.is_empty()))
        })
        .map(str::to_string)
}

pub fn extract_published_at(value: &Value) -> Option<String> {
    first_field(value, PUBLISHED_AT_FIELDS).map(str::to_string)
}

pub fn extract_tags(value: &Value) -> Vec<String> {
    value
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Lightweight index entry for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub cid: SmolStr,
    pub path: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub tags: Vec<String>,
}

impl DocumentSummary {
    pub fn from_record(record: &Record) -> Self {
        let value = &record.value;
        Self {
            cid: record.cid.clone(),
            path: record.path().unwrap_or_default().to_string(),
            title: extract_title(value),
            description: extract_description(value),
            published_at: extract_published_at(value),
            tags: extract_tags(value),
        }
    }

    /// Publish time in epoch milliseconds, if it parses.
    pub fn published_millis(&self) -> Option<i64> {
        self.published_at.as_deref().and_then(parse_millis)
    }
}

pub(crate) fn parse_millis(timestamp: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|ts| ts.timestamp_millis())
}

/// Newest first; undated or unparseable entries go last in input order.
pub fn sort_by_published(summaries: &mut [DocumentSummary]) {
    summaries.sort_by_key(|summary| Reverse(summary.published_millis()));
}

/// `"{n} min read"` at 200 words per minute, rounded up. `None` for text
/// without words.
pub fn reading_time(text: &str) -> Option<String> {
    let words = text.split_whitespace().count();
    if words == 0 {
        return None;
    }
    let minutes = words.div_ceil(WORDS_PER_MINUTE);
    Some(format!("{minutes} min read"))
}

/// Plain-text fallback: blank-line separated paragraphs, trimmed and
/// escaped.
pub fn render_fallback(text: &str) -> String {
    PARAGRAPH_BREAK_RE
        .split(text)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| format!("<p>{}</p>", escape_html(part)))
        .collect()
}
