use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::uri::{AtUri, normalize_path};

/// One remote document as returned by `com.atproto.repo.listRecords`.
///
/// Records are immutable once fetched; the cache shares them behind `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub cid: SmolStr,
    pub uri: String,
    #[serde(default)]
    pub value: Value,
}

impl Record {
    /// The raw `value.path` string, if it is a non-empty string.
    pub fn raw_path(&self) -> Option<&str> {
        self.value
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
    }

    /// Canonical slug of this document (leading slashes removed).
    pub fn path(&self) -> Option<&str> {
        self.raw_path().map(normalize_path)
    }

    /// Provider-assigned record key, the last segment of the record URI.
    pub fn rkey(&self) -> Option<&str> {
        AtUri::parse(&self.uri).map(|u| u.rkey)
    }

    /// Publication the document belongs to (`value.site`).
    pub fn site(&self) -> Option<&str> {
        self.value.get("site").and_then(Value::as_str)
    }

    pub fn tags(&self) -> Vec<String> {
        self.value
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
}

/// One page of a `listRecords` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub records: Vec<Record>,
}
