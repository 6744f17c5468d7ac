//! Document block trees.
//!
//! Blocks arrive as loosely shaped JSON (`$type`, optional `attrs`, children
//! under one of several keys). [`Block::from_value`] normalizes every field
//! fallback once, so the compiler only ever sees a closed set of variants.

mod renderer;

pub use renderer::{BlockRenderContext, compile, render_block};

use serde_json::Value;
use smol_str::SmolStr;

use crate::facet::{DocumentFeature, Facet, parse_facets, render_rich_text};

const BLOCK_TYPE_PREFIX: &str = "blog.pckt.block.";

/// Text plus the facets annotating it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RichText {
    pub text: String,
    pub facets: Vec<Facet<DocumentFeature>>,
}

impl RichText {
    /// `text ?? plaintext ?? attrs.text`, with `facets ?? attrs.facets`.
    fn from_block(block: &Value) -> Self {
        let text = field(block, "text")
            .or_else(|| field(block, "plaintext"))
            .or_else(|| attr(block, "text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let facets = parse_facets(field_or_attr(block, "facets"));
        Self { text, facets }
    }

    pub fn to_html(&self) -> String {
        render_rich_text(&self.text, &self.facets)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageBlock {
    pub src: Option<String>,
    pub blob: Option<String>,
    pub alt: Option<String>,
    pub title: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IframeBlock {
    pub src: Option<String>,
    pub title: Option<String>,
    pub height: Option<String>,
    pub width: Option<String>,
    pub allow: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        /// Clamped to 1..=6 for output.
        level: u8,
        /// The level as written is exactly 1 (or missing). Only such a
        /// heading counts as the document title.
        declared_one: bool,
        content: RichText,
    },
    Text(RichText),
    Blockquote {
        children: Vec<Block>,
        content: RichText,
    },
    BulletList(Vec<Block>),
    OrderedList {
        start: Option<String>,
        items: Vec<Block>,
    },
    ListItem {
        children: Vec<Block>,
        content: RichText,
    },
    CodeBlock {
        code: String,
        language: Option<String>,
    },
    HorizontalRule,
    HardBreak,
    Image(ImageBlock),
    Website {
        href: Option<String>,
        title: Option<String>,
        description: Option<String>,
    },
    Iframe(IframeBlock),
    SocialEmbed {
        uri: Option<String>,
    },
    /// `None` when the block has no item list at all; each item is the blob
    /// CID if one could be found.
    Gallery {
        items: Option<Vec<Option<String>>>,
    },
    TaskList(Vec<Block>),
    TaskItem {
        checked: bool,
        content: RichText,
    },
    Table(Vec<Block>),
    TableRow(Vec<Block>),
    TableCell {
        header: bool,
        children: Vec<Block>,
        content: RichText,
        colspan: Option<u32>,
        rowspan: Option<u32>,
    },
    Mention {
        did: Option<String>,
        handle: Option<String>,
        content: RichText,
    },
    /// Anything outside the vocabulary. Renders as nothing.
    Unknown(SmolStr),
}

impl Block {
    pub fn from_value(block: &Value) -> Self {
        let Some(kind) = block_type(block) else {
            return Block::Unknown(SmolStr::default());
        };

        match kind {
            "heading" => Block::Heading {
                level: heading_level(block),
                declared_one: declared_level(block) == Some(1.0),
                content: RichText::from_block(block),
            },
            "text" => Block::Text(RichText::from_block(block)),
            "blockquote" => Block::Blockquote {
                children: children(block),
                content: RichText::from_block(block),
            },
            "bulletList" => Block::BulletList(children(block)),
            "orderedList" => Block::OrderedList {
                start: field_or_attr(block, "start").and_then(truthy_scalar),
                items: children(block),
            },
            "listItem" => Block::ListItem {
                children: children(block),
                content: RichText::from_block(block),
            },
            "codeBlock" => Block::CodeBlock {
                code: field_or_attr(block, "code")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                language: field_or_attr(block, "language").and_then(truthy_scalar),
            },
            "horizontalRule" => Block::HorizontalRule,
            "hardBreak" => Block::HardBreak,
            "image" => Block::Image(ImageBlock {
                src: attr(block, "src").and_then(Value::as_str).map(str::to_string),
                blob: blob_cid(attr(block, "blob")),
                alt: attr(block, "alt").and_then(truthy_scalar),
                title: attr(block, "title").and_then(truthy_scalar),
                width: attr(block, "width").and_then(truthy_scalar),
                height: attr(block, "height").and_then(truthy_scalar),
            }),
            "website" => {
                let href = first_string(block, &["url", "href", "src"]);
                Block::Website {
                    title: first_string(block, &["title", "name"]).or_else(|| href.clone()),
                    description: first_string(block, &["description", "summary"]),
                    href,
                }
            }
            "iframe" => Block::Iframe(IframeBlock {
                src: first_string(block, &["src", "url"]),
                title: attr(block, "title").and_then(truthy_scalar),
                height: attr(block, "height").and_then(truthy_scalar),
                width: attr(block, "width").and_then(truthy_scalar),
                allow: attr(block, "allow").and_then(truthy_scalar),
            }),
            "blueskyEmbed" => Block::SocialEmbed {
                uri: field(block, "uri")
                    .or_else(|| attr(block, "uri"))
                    .or_else(|| attr(block, "url"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            "gallery" => Block::Gallery {
                items: attr(block, "items")
                    .or_else(|| attr(block, "images"))
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| blob_cid(item.get("blob")))
                            .collect()
                    }),
            },
            "taskList" => Block::TaskList(children(block)),
            "taskItem" => Block::TaskItem {
                checked: field_or_attr(block, "checked").is_some_and(truthy),
                content: RichText::from_block(block),
            },
            "table" => Block::Table(children(block)),
            "tableRow" => Block::TableRow(children(block)),
            "tableCell" | "tableHeader" => Block::TableCell {
                header: kind == "tableHeader",
                children: children(block),
                content: RichText::from_block(block),
                colspan: field_or_attr(block, "colspan").and_then(span),
                rowspan: field_or_attr(block, "rowspan").and_then(span),
            },
            "mention" => Block::Mention {
                did: field_or_attr(block, "did").and_then(truthy_scalar),
                handle: field_or_attr(block, "handle").and_then(truthy_scalar),
                content: RichText::from_block(block),
            },
            other => Block::Unknown(SmolStr::new(other)),
        }
    }

    pub fn from_values(blocks: &[Value]) -> Vec<Block> {
        blocks.iter().map(Block::from_value).collect()
    }

    pub fn is_title_heading(&self) -> bool {
        matches!(
            self,
            Block::Heading {
                declared_one: true,
                ..
            }
        )
    }
}

/// Block name with the vocabulary prefix removed. Bare names are accepted.
fn block_type(block: &Value) -> Option<&str> {
    let kind = block.get("$type").and_then(Value::as_str)?;
    Some(kind.strip_prefix(BLOCK_TYPE_PREFIX).unwrap_or(kind))
}

/// A non-null top-level field.
fn field<'a>(block: &'a Value, key: &str) -> Option<&'a Value> {
    block.get(key).filter(|v| !v.is_null())
}

/// A non-null field under `attrs`.
fn attr<'a>(block: &'a Value, key: &str) -> Option<&'a Value> {
    block
        .get("attrs")
        .and_then(|attrs| attrs.get(key))
        .filter(|v| !v.is_null())
}

fn field_or_attr<'a>(block: &'a Value, key: &str) -> Option<&'a Value> {
    field(block, key).or_else(|| attr(block, key))
}

/// First attribute among `keys` holding a string.
fn first_string(block: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| attr(block, key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Children live under `items`, `content` or `children`, whichever is a list.
fn children(block: &Value) -> Vec<Block> {
    ["items", "content", "children"]
        .iter()
        .find_map(|key| field(block, key).and_then(Value::as_array))
        .map(|children| Block::from_values(children))
        .unwrap_or_default()
}

fn heading_level(block: &Value) -> u8 {
    field_or_attr(block, "level")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(1)
        .clamp(1, 6) as u8
}

/// The level as written, read the way a loose numeric coercion would: a
/// missing level is 1, numeric strings parse, anything else is `None`.
fn declared_level(block: &Value) -> Option<f64> {
    match field_or_attr(block, "level") {
        None => Some(1.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(_) => None,
    }
}

fn span(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 1)
}

/// Blob CID from `ref.$link`, `cid`, or a bare string `ref`.
pub(crate) fn blob_cid(blob: Option<&Value>) -> Option<String> {
    let blob = blob?;
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    non_empty(blob.get("ref").and_then(|r| r.get("$link")))
        .or_else(|| non_empty(blob.get("cid")))
        .or_else(|| non_empty(blob.get("ref")))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A string or a non-zero number, rendered as text.
fn truthy_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if truthy(value) => Some(n.to_string()),
        _ => None,
    }
}
