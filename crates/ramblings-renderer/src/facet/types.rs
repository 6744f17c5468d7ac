use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Half-open UTF-8 byte range `[byte_start, byte_end)`.
///
/// Offsets are kept signed and unvalidated: facets come from remote JSON
/// and out-of-range values are resolved leniently by
/// [`byte_slice`](super::byte_slice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteRange {
    pub byte_start: i64,
    pub byte_end: i64,
}

impl ByteRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            byte_start: start,
            byte_end: end,
        }
    }

    /// Read `{byteStart, byteEnd}`. A missing start is 0, a missing end
    /// collapses onto the start.
    fn from_value(index: Option<&Value>) -> Self {
        let start = index
            .and_then(|i| i.get("byteStart"))
            .and_then(as_offset)
            .unwrap_or(0);
        let end = index
            .and_then(|i| i.get("byteEnd"))
            .and_then(as_offset)
            .unwrap_or(start);
        Self::new(start, end)
    }

    pub fn start(&self) -> i64 {
        self.byte_start
    }

    pub fn end(&self) -> i64 {
        self.byte_end
    }
}

fn as_offset(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

/// A byte-range annotation over a text field, generic over the feature
/// vocabulary it was written in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facet<F> {
    pub index: ByteRange,
    pub features: Vec<F>,
}

impl<F: DeserializeOwned> Facet<F> {
    /// Parse one facet. Features that fail to parse are dropped on their
    /// own; only a non-object facet is rejected as a whole.
    pub fn from_value(value: &Value) -> Option<Self> {
        let facet = value.as_object()?;
        let index = ByteRange::from_value(facet.get("index"));
        let features = facet
            .get("features")
            .and_then(Value::as_array)
            .map(|features| {
                features
                    .iter()
                    .filter_map(|f| F::deserialize(f).ok())
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { index, features })
    }
}

/// Parse a facet list, tolerating a missing or malformed value.
pub fn parse_facets<F: DeserializeOwned>(value: Option<&Value>) -> Vec<Facet<F>> {
    value
        .and_then(Value::as_array)
        .map(|facets| facets.iter().filter_map(Facet::from_value).collect())
        .unwrap_or_default()
}

/// Features of the long-form document vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum DocumentFeature {
    #[serde(rename = "blog.pckt.richtext.facet#link")]
    #[serde(alias = "pub.leaflet.richtext.facet#link")]
    Link {
        #[serde(default)]
        uri: Option<SmolStr>,
        #[serde(default)]
        url: Option<SmolStr>,
    },
    #[serde(rename = "blog.pckt.richtext.facet#bold")]
    #[serde(alias = "pub.leaflet.richtext.facet#bold")]
    Bold,
    #[serde(rename = "blog.pckt.richtext.facet#italic")]
    #[serde(alias = "pub.leaflet.richtext.facet#italic")]
    Italic,
    #[serde(rename = "blog.pckt.richtext.facet#underline")]
    #[serde(alias = "pub.leaflet.richtext.facet#underline")]
    Underline,
    #[serde(rename = "blog.pckt.richtext.facet#strikethrough")]
    #[serde(alias = "pub.leaflet.richtext.facet#strikethrough")]
    Strikethrough,
    #[serde(rename = "blog.pckt.richtext.facet#code")]
    #[serde(alias = "pub.leaflet.richtext.facet#code")]
    Code,
    #[serde(rename = "blog.pckt.richtext.facet#highlight")]
    #[serde(alias = "pub.leaflet.richtext.facet#highlight")]
    Highlight,
    #[serde(rename = "blog.pckt.richtext.facet#id")]
    #[serde(alias = "pub.leaflet.richtext.facet#id")]
    Id {
        #[serde(default)]
        id: Option<SmolStr>,
    },
    #[serde(rename = "blog.pckt.richtext.facet#didMention")]
    #[serde(alias = "pub.leaflet.richtext.facet#didMention")]
    DidMention {
        #[serde(default)]
        did: Option<SmolStr>,
    },
    #[serde(rename = "blog.pckt.richtext.facet#atMention")]
    #[serde(alias = "pub.leaflet.richtext.facet#atMention")]
    AtMention {
        #[serde(default)]
        handle: Option<SmolStr>,
    },
    #[serde(other)]
    Unknown,
}

/// Features of the social-post vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum SocialFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link {
        #[serde(default)]
        uri: Option<SmolStr>,
    },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention {
        #[serde(default)]
        did: Option<SmolStr>,
    },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag {
        #[serde(default)]
        tag: Option<SmolStr>,
    },
    #[serde(other)]
    Unknown,
}

/// Treat empty strings like absent values.
pub(crate) fn present(value: &Option<SmolStr>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_pckt_facet() {
        let facet: Facet<DocumentFeature> = Facet::from_value(&json!({
            "index": {"byteStart": 5, "byteEnd": 15},
            "features": [
                {"$type": "blog.pckt.richtext.facet#code"},
                {"$type": "blog.pckt.richtext.facet#strikethrough"}
            ]
        }))
        .unwrap();

        assert_eq!(facet.index, ByteRange::new(5, 15));
        assert_eq!(
            facet.features,
            vec![DocumentFeature::Code, DocumentFeature::Strikethrough]
        );
    }

    #[test]
    fn test_leaflet_alias_and_link_url() {
        let facet: Facet<DocumentFeature> = Facet::from_value(&json!({
            "index": {"byteStart": 0, "byteEnd": 4},
            "features": [
                {"$type": "pub.leaflet.richtext.facet#bold"},
                {"$type": "blog.pckt.richtext.facet#link", "url": "https://example.com"}
            ]
        }))
        .unwrap();

        assert_eq!(facet.features[0], DocumentFeature::Bold);
        assert!(matches!(
            &facet.features[1],
            DocumentFeature::Link { uri: None, url: Some(u) } if u == "https://example.com"
        ));
    }

    #[test]
    fn test_deserialize_bsky_facet() {
        let facet: Facet<SocialFeature> = Facet::from_value(&json!({
            "index": {"byteStart": 0, "byteEnd": 10},
            "features": [
                {"$type": "app.bsky.richtext.facet#link", "uri": "https://example.com"},
                {"$type": "app.bsky.richtext.facet#mention", "did": "did:plc:abc123"},
                {"$type": "app.bsky.richtext.facet#tag", "tag": "rust"}
            ]
        }))
        .unwrap();

        assert_eq!(facet.features.len(), 3);
        assert!(matches!(&facet.features[2], SocialFeature::Tag { tag: Some(t) } if t == "rust"));
    }

    #[test]
    fn test_unknown_features_are_kept_as_unknown() {
        let facet: Facet<SocialFeature> = Facet::from_value(&json!({
            "index": {"byteStart": 0, "byteEnd": 1},
            "features": [{"$type": "app.bsky.richtext.facet#future"}, {"no": "type"}]
        }))
        .unwrap();
        assert_eq!(facet.features, vec![SocialFeature::Unknown]);
    }

    #[test]
    fn test_missing_index_defaults() {
        let facet: Facet<DocumentFeature> =
            Facet::from_value(&json!({ "index": { "byteStart": 3 } })).unwrap();
        assert_eq!(facet.index, ByteRange::new(3, 3));
        assert!(facet.features.is_empty());

        let facet: Facet<DocumentFeature> = Facet::from_value(&json!({})).unwrap();
        assert_eq!(facet.index, ByteRange::new(0, 0));
    }

    #[test]
    fn test_parse_facets_tolerates_garbage() {
        let facets: Vec<Facet<DocumentFeature>> =
            parse_facets(Some(&json!([{ "index": {"byteStart": 0, "byteEnd": 2} }, 7, "x"])));
        assert_eq!(facets.len(), 1);

        let none: Vec<Facet<DocumentFeature>> = parse_facets(Some(&json!({"not": "a list"})));
        assert!(none.is_empty());
    }
}
