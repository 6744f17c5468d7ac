//! Comment threads from the public social AppView.
//!
//! One `getPostThread` call fetches the whole reply tree; it is converted
//! depth-first into [`ThreadNode`]s, dropping placeholder replies (deleted,
//! blocked, not found), and every level is sorted by relevance.

use std::sync::LazyLock;

use miette::Diagnostic;
use ramblings_common::ContentConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::facet::{Facet, SocialFeature, parse_facets, profile_url, render_social_text};

const THREAD_VIEW: &str = "app.bsky.feed.defs#threadViewPost";
const EXTERNAL_VIEW: &str = "app.bsky.embed.external#view";
const RECORD_VIEW: &str = "app.bsky.embed.record#view";
const RECORD_VIEW_RECORD: &str = "app.bsky.embed.record#viewRecord";
const FALLBACK_AVATAR: &str = "/fallback.svg";

static POST_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<author>did:plc:[a-z0-9]+)/.*?/(?P<post>[a-z0-9]+)")
        .expect("post URI regex should compile")
});

/// The single failure callers see: the thread could not be shown.
#[derive(Debug, Error, Diagnostic)]
#[error("comments unavailable for {uri}")]
#[diagnostic(code(thread::unavailable))]
pub struct CommentsUnavailable {
    pub uri: String,
    #[source]
    pub reason: ThreadFailure,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ThreadFailure {
    #[error("not a post URI")]
    #[diagnostic(code(thread::invalid_uri))]
    InvalidUri,

    #[error("thread request failed")]
    #[diagnostic(code(thread::request))]
    Request(#[source] reqwest::Error),

    #[error("thread API responded with status {0}")]
    #[diagnostic(code(thread::status))]
    Status(u16),

    #[error("failed to read thread response")]
    #[diagnostic(code(thread::body))]
    Body(#[source] reqwest::Error),

    #[error("failed to decode thread response")]
    #[diagnostic(code(thread::decode))]
    Decode(#[source] serde_json::Error),

    #[error("response is not a thread view")]
    #[diagnostic(code(thread::not_a_thread))]
    NotAThread,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadAuthor {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub href: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Engagement {
    pub likes: u64,
    pub reposts: u64,
    pub quotes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalEmbed {
    pub uri: String,
    pub title: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotedPost {
    pub author: ThreadAuthor,
    pub permalink: String,
    pub body: String,
    pub facets: Vec<Facet<SocialFeature>>,
}

impl QuotedPost {
    pub fn body_html(&self) -> String {
        render_social_text(&self.body, &self.facets)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadNode {
    pub author: ThreadAuthor,
    pub permalink: String,
    pub body: String,
    pub facets: Vec<Facet<SocialFeature>>,
    pub created_at: Option<String>,
    pub engagement: Engagement,
    /// Replies in the whole subtree, not just direct children.
    pub reply_count: u64,
    pub external: Option<ExternalEmbed>,
    pub quote: Option<QuotedPost>,
    pub replies: Vec<ThreadNode>,
}

impl ThreadNode {
    /// Engagement-weighted relevance. The creation-time term is far below
    /// one like and only separates otherwise equal replies.
    pub fn score(&self) -> f64 {
        let engagement = self.engagement.likes as f64 * 2.0
            + self.engagement.reposts as f64 * 1.5
            + self.engagement.quotes as f64
            + self.reply_count as f64 * 0.5;
        let created_at = self
            .created_at
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.timestamp_millis() as f64)
            .unwrap_or(0.0);
        engagement + created_at / 1e15
    }

    pub fn body_html(&self) -> String {
        render_social_text(&self.body, &self.facets)
    }

    /// Convert a `threadViewPost` and its replies. Anything else (including a
    /// thread view missing required fields) yields `None`.
    pub fn from_thread_view(value: &Value) -> Option<Self> {
        if value.get("$type").and_then(Value::as_str) != Some(THREAD_VIEW) {
            return None;
        }
        match ThreadViewPost::deserialize(value) {
            Ok(view) => Some(view.into_node()),
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed thread view");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ThreadViewPost {
    post: PostView,
    #[serde(default)]
    replies: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    author: ProfileView,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    embed: Option<Value>,
    #[serde(default)]
    like_count: Option<u64>,
    #[serde(default)]
    repost_count: Option<u64>,
    #[serde(default)]
    quote_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView {
    did: String,
    #[serde(default)]
    handle: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

impl ProfileView {
    fn into_author(self) -> ThreadAuthor {
        ThreadAuthor {
            href: profile_url(&self.did),
            avatar: self
                .avatar
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| FALLBACK_AVATAR.to_string()),
            did: self.did,
            handle: self.handle,
            display_name: self.display_name,
        }
    }
}

impl ThreadViewPost {
    fn into_node(self) -> ThreadNode {
        let mut replies: Vec<ThreadNode> = self
            .replies
            .iter()
            .filter_map(ThreadNode::from_thread_view)
            .collect();
        replies.sort_by(|a, b| b.score().total_cmp(&a.score()));

        let reply_count =
            replies.len() as u64 + replies.iter().map(|r| r.reply_count).sum::<u64>();

        let post = self.post;
        let record = &post.record;
        let embed = post.embed.as_ref();
        let author = post.author.into_author();

        ThreadNode {
            permalink: permalink(&post.uri).unwrap_or_else(|| author.href.clone()),
            body: record
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            facets: parse_facets(record.get("facets")),
            created_at: record
                .get("createdAt")
                .and_then(Value::as_str)
                .map(str::to_string),
            engagement: Engagement {
                likes: post.like_count.unwrap_or(0),
                reposts: post.repost_count.unwrap_or(0),
                quotes: post.quote_count.unwrap_or(0),
            },
            reply_count,
            external: embed.and_then(external_embed),
            quote: embed.and_then(quoted_post),
            author,
            replies,
        }
    }
}

/// Split a post URI into `(author DID, post key)`.
pub fn decompose_post_uri(uri: &str) -> Option<(&str, &str)> {
    let caps = POST_URI_RE.captures(uri)?;
    Some((caps.name("author")?.as_str(), caps.name("post")?.as_str()))
}

/// Web permalink for a post URI.
pub fn permalink(uri: &str) -> Option<String> {
    decompose_post_uri(uri).map(|(did, post)| format!("{}/post/{post}", profile_url(did)))
}

fn external_embed(embed: &Value) -> Option<ExternalEmbed> {
    if embed.get("$type").and_then(Value::as_str) != Some(EXTERNAL_VIEW) {
        return None;
    }
    let external = embed.get("external")?;
    let uri = non_empty_str(external.get("uri"))?;
    let title = non_empty_str(external.get("title"))?;

    let host = Url::parse(uri)
        .ok()
        .and_then(|url| {
            let host = url.host_str()?.to_string();
            Some(match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            })
        })
        .map(|host| host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
        .unwrap_or_default();

    Some(ExternalEmbed {
        uri: uri.to_string(),
        title: title.to_string(),
        host,
    })
}

fn quoted_post(embed: &Value) -> Option<QuotedPost> {
    if embed.get("$type").and_then(Value::as_str) != Some(RECORD_VIEW) {
        return None;
    }
    let record = embed.get("record")?;
    if record.get("$type").and_then(Value::as_str) != Some(RECORD_VIEW_RECORD) {
        return None;
    }

    let author = ProfileView::deserialize(record.get("author")?).ok()?.into_author();
    let uri = record.get("uri").and_then(Value::as_str).unwrap_or_default();
    let value = record.get("value");

    Some(QuotedPost {
        permalink: permalink(uri).unwrap_or_else(|| author.href.clone()),
        body: value
            .and_then(|v| v.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        facets: parse_facets(value.and_then(|v| v.get("facets"))),
        author,
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Interpret a `getPostThread` response body.
pub fn thread_from_response(body: &Value) -> Result<ThreadNode, ThreadFailure> {
    body.get("thread")
        .and_then(ThreadNode::from_thread_view)
        .ok_or(ThreadFailure::NotAThread)
}

/// Parse a `getPostThread` body without serde_json's nesting limit. Every
/// reply level nests two objects, so long reply chains pass the default
/// limit of 128; the stack grows on demand instead.
pub fn decode_response(bytes: &[u8]) -> Result<Value, ThreadFailure> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))
        .map_err(ThreadFailure::Decode)?;
    de.end().map_err(ThreadFailure::Decode)?;
    Ok(value)
}

/// Fetches comment threads from a public AppView.
#[derive(Debug, Clone)]
pub struct ThreadFetcher {
    http: reqwest::Client,
    api: Url,
    depth: u32,
}

impl ThreadFetcher {
    pub fn new(http: reqwest::Client, api: Url, depth: u32) -> Self {
        Self { http, api, depth }
    }

    pub fn from_config(http: reqwest::Client, config: &ContentConfig) -> Self {
        Self::new(http, config.thread_api.clone(), config.thread_depth)
    }

    pub fn thread_url(&self, post_uri: &str) -> Option<Url> {
        let base = self.api.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/xrpc/app.bsky.feed.getPostThread")).ok()?;
        url.query_pairs_mut()
            .append_pair("uri", post_uri)
            .append_pair("depth", &self.depth.to_string());
        Some(url)
    }

    pub async fn fetch_thread(&self, post_uri: &str) -> Result<ThreadNode, CommentsUnavailable> {
        match self.fetch(post_uri).await {
            Ok(thread) => {
                tracing::debug!(uri = %post_uri, replies = thread.reply_count, "fetched thread");
                Ok(thread)
            }
            Err(reason) => {
                tracing::warn!(uri = %post_uri, error = %reason, "comments unavailable");
                Err(CommentsUnavailable {
                    uri: post_uri.to_string(),
                    reason,
                })
            }
        }
    }

    async fn fetch(&self, post_uri: &str) -> Result<ThreadNode, ThreadFailure> {
        if decompose_post_uri(post_uri).is_none() {
            return Err(ThreadFailure::InvalidUri);
        }
        let url = self.thread_url(post_uri).ok_or(ThreadFailure::InvalidUri)?;

        let res = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(ThreadFailure::Request)?;

        let status = res.status();
        if !status.is_success() {
            return Err(ThreadFailure::Status(status.as_u16()));
        }

        let bytes = res.bytes().await.map_err(ThreadFailure::Body)?;
        let body = decode_response(&bytes)?;
        thread_from_response(&body)
    }
}
