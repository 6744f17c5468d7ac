//! The content facade: index, slug lookup, rendering, publication metadata
//! and comments, all behind one shared [`RecordCache`].

use std::sync::Arc;
use std::time::Duration;

use ramblings_common::cache::{self, Cache};
use ramblings_common::uri::normalize_path;
use ramblings_common::{
    AtUri, ConfigError, ContentConfig, Error, Lookup, Record, RecordCache, RepoSource, Snapshot,
};
use serde::Serialize;
use serde_json::Value;
use smol_str::SmolStr;

use crate::blocks::{Block, BlockRenderContext, blob_cid, compile};
use crate::sanitize::sanitize_html;
use crate::summary::{
    DESCRIPTION_FIELDS, DocumentSummary, extract_description, extract_published_at,
    extract_tags, extract_title, first_field, reading_time, render_fallback, sort_by_published,
};
use crate::thread::{CommentsUnavailable, ThreadFetcher, ThreadNode};

const CONTENT_TYPE: &str = "blog.pckt.content";
const DEFAULT_PUBLICATION_TITLE: &str = "Ramblings";

// Blobs are content addressed, so the TTL only bounds memory.
const BLOB_CACHE_CAPACITY: u64 = 256;
const BLOB_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A document compiled to sanitized HTML, plus the metadata a page needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDocument {
    pub html: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub path: String,
    pub tags: Vec<String>,
    pub reading_time: Option<String>,
    /// Social post that hosts the document's comments.
    pub social_post_uri: Option<String>,
    pub document_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Publication {
    pub title: String,
    pub description: Option<String>,
}

pub struct ContentService<S> {
    cache: RecordCache<S>,
    blobs: Cache<SmolStr, Arc<Value>>,
    threads: ThreadFetcher,
}

impl<S: RepoSource> ContentService<S> {
    pub fn new(source: Arc<S>, config: &ContentConfig, threads: ThreadFetcher) -> Self {
        Self::with_cache(RecordCache::new(source, config), threads)
    }

    pub fn with_cache(records: RecordCache<S>, threads: ThreadFetcher) -> Self {
        Self {
            cache: records,
            blobs: cache::new_cache(BLOB_CACHE_CAPACITY, BLOB_CACHE_TTL),
            threads,
        }
    }

    pub fn cache(&self) -> &RecordCache<S> {
        &self.cache
    }

    /// Summaries of every document, newest first.
    pub async fn index(&self) -> Result<Vec<DocumentSummary>, Error> {
        let snapshot = self.cache.get().await?;
        let mut summaries: Vec<_> = snapshot
            .records()
            .iter()
            .map(|record| DocumentSummary::from_record(record))
            .collect();
        sort_by_published(&mut summaries);
        Ok(summaries)
    }

    pub async fn by_slug(&self, slug: &str) -> Result<Lookup, Error> {
        self.cache.lookup(slug).await
    }

    pub async fn by_slug_segments<T: AsRef<str>>(&self, segments: &[T]) -> Result<Lookup, Error> {
        self.cache.lookup_segments(segments).await
    }

    pub async fn render(&self, record: &Record) -> Result<RenderedDocument, Error> {
        let snapshot = self.cache.get().await?;
        Ok(self.render_with(&snapshot, record).await)
    }

    /// Render every document of the current snapshot concurrently. Output
    /// keeps snapshot order.
    pub async fn render_all(&self) -> Result<Vec<RenderedDocument>, Error> {
        let snapshot = self.cache.get().await?;
        let renders = snapshot
            .records()
            .iter()
            .map(|record| self.render_with(&snapshot, record));
        Ok(n0_future::join_all(renders).await)
    }

    async fn render_with(&self, snapshot: &Snapshot, record: &Record) -> RenderedDocument {
        let ctx = BlockRenderContext::new(snapshot.did(), snapshot.pds_url());
        let value = &record.value;

        let mut html = String::new();
        if let Some(content) = value
            .get("content")
            .filter(|c| c.get("$type").and_then(Value::as_str) == Some(CONTENT_TYPE))
        {
            let items = self.content_items(content, &ctx).await;
            if !items.is_empty() {
                let mut blocks = Block::from_values(&items);
                if blocks.first().is_some_and(Block::is_title_heading) {
                    blocks.remove(0);
                }
                html = compile(&blocks, &ctx);
            }
        }

        let text_content = value
            .get("textContent")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty());
        if html.is_empty() {
            if let Some(text) = text_content {
                html = render_fallback(text);
            }
        }

        tracing::debug!(uri = %record.uri, bytes = html.len(), "rendered document");

        RenderedDocument {
            html: sanitize_html(&html),
            title: extract_title(value),
            description: extract_description(value),
            published_at: extract_published_at(value),
            path: record.path().unwrap_or_default().to_string(),
            tags: extract_tags(value),
            reading_time: text_content.and_then(reading_time),
            social_post_uri: value
                .pointer("/bskyPostRef/uri")
                .and_then(Value::as_str)
                .map(str::to_string),
            document_uri: record.uri.clone(),
        }
    }

    /// Block items of a content envelope: the inline `items` array when there
    /// is one, otherwise the items stored in the referenced blob.
    // TODO: revisit the inline-versus-blob precedence if the content lexicon
    // settles on one storage form.
    async fn content_items(&self, content: &Value, ctx: &BlockRenderContext) -> Vec<Value> {
        if let Some(items) = content.get("items").and_then(Value::as_array) {
            return items.clone();
        }

        let Some(cid) = blob_cid(content.get("blob")) else {
            return Vec::new();
        };
        let Some(blob) = self.blob_json(&cid, ctx).await else {
            return Vec::new();
        };

        blob.get("items")
            .or_else(|| blob.pointer("/content/items"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    async fn blob_json(&self, cid: &str, ctx: &BlockRenderContext) -> Option<Arc<Value>> {
        let key = SmolStr::new(cid);
        if let Some(hit) = self.blobs.get(&key) {
            tracing::debug!(%cid, "blob cache hit");
            return Some(hit);
        }

        match self
            .cache
            .source()
            .fetch_blob_json(&ctx.pds_url, &ctx.did, cid)
            .await
        {
            Ok(blob) => {
                let blob = Arc::new(blob);
                self.blobs.insert(key, blob.clone());
                Some(blob)
            }
            Err(err) => {
                tracing::warn!(%cid, error = %err, "content blob unavailable");
                None
            }
        }
    }

    /// Title and description of the publication record itself.
    pub async fn publication(&self) -> Result<Publication, Error> {
        let publication_uri = self.cache.publication_uri();
        let parsed = AtUri::parse(publication_uri).ok_or_else(|| {
            ConfigError::InvalidPublicationUri {
                uri: publication_uri.to_string(),
            }
        })?;
        let snapshot = self.cache.get().await?;

        let value = self
            .cache
            .source()
            .get_record(
                snapshot.pds_url(),
                parsed.repo,
                parsed.collection,
                parsed.rkey,
            )
            .await?;

        Ok(Publication {
            title: value
                .get("title")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_PUBLICATION_TITLE)
                .to_string(),
            description: first_field(&value, DESCRIPTION_FIELDS).map(str::to_string),
        })
    }

    /// Comment thread rooted at a document's social post.
    pub async fn comments(&self, post_uri: &str) -> Result<ThreadNode, CommentsUnavailable> {
        self.threads.fetch_thread(post_uri).await
    }
}

/// Canonical path for a redirect target, with a single leading slash.
pub fn redirect_location(path: &str) -> String {
    format!("/{}", normalize_path(path))
}
