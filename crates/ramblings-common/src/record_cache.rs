//! TTL-bounded cache of publication records.
//!
//! The cache holds at most one [`Snapshot`]: every record of the publication
//! plus three lookup indexes derived from the same record list in one pass.
//! A snapshot is never mutated; a rebuild produces a new one and swaps the
//! shared pointer, so readers see either the old or the new snapshot.
//!
//! Rebuilds are single-flight. Callers that arrive while a rebuild is
//! running wait for it and reuse its outcome instead of starting another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use smol_str::SmolStr;
use web_time::Instant;

use crate::client::RepoSource;
use crate::config::ContentConfig;
use crate::error::{Error, FetchError};
use crate::record::Record;
use crate::resolve::{Identity, IdentityResolver};
use crate::uri::{normalize_slug, normalize_slug_segments};

/// Result of resolving a slug against the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The slug is a canonical document path.
    Found(Arc<Record>),
    /// The slug is an old identifier (CID or record key) of a document that
    /// now lives at this canonical path.
    Redirect(String),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Fresh,
    Stale,
}

/// Immutable, fully indexed view of the publication's records.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    expires_at: Instant,
    did: String,
    pds_url: String,
    records: Vec<Arc<Record>>,
    by_path: HashMap<String, Arc<Record>>,
    by_cid: HashMap<SmolStr, String>,
    by_rkey: HashMap<SmolStr, String>,
}

impl Snapshot {
    /// Filter `records` to the publication and derive every index from the
    /// filtered list.
    pub fn build(
        identity: &Identity,
        records: Vec<Record>,
        publication_uri: &str,
        expires_at: Instant,
        generation: u64,
    ) -> Self {
        let mut kept = Vec::new();
        let mut by_path = HashMap::new();
        let mut by_cid = HashMap::new();
        let mut by_rkey = HashMap::new();

        for record in records {
            if record.site() != Some(publication_uri) {
                continue;
            }
            let Some(path) = record.path().map(str::to_string) else {
                continue;
            };

            let record = Arc::new(record);
            by_cid.insert(record.cid.clone(), path.clone());
            if let Some(rkey) = record.rkey() {
                by_rkey.insert(SmolStr::new(rkey), path.clone());
            }
            by_path.insert(path, record.clone());
            kept.push(record);
        }

        Self {
            generation,
            expires_at,
            did: identity.did.clone(),
            pds_url: identity.pds_url.clone(),
            records: kept,
            by_path,
            by_cid,
            by_rkey,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn pds_url(&self) -> &str {
        &self.pds_url
    }

    pub fn records(&self) -> &[Arc<Record>] {
        &self.records
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.by_path.keys().map(String::as_str)
    }

    /// Three-way check on an already normalized slug: canonical path first,
    /// then CID, then record key.
    pub fn lookup(&self, slug: &str) -> Lookup {
        if let Some(record) = self.by_path.get(slug) {
            return Lookup::Found(record.clone());
        }

        match self.by_cid.get(slug).or_else(|| self.by_rkey.get(slug)) {
            Some(path) => Lookup::Redirect(path.clone()),
            None => Lookup::NotFound,
        }
    }
}

pub struct RecordCache<S> {
    source: Arc<S>,
    identity: IdentityResolver,
    publication_uri: String,
    collection: String,
    page_size: u32,
    ttl: Duration,
    current: RwLock<Option<Arc<Snapshot>>>,
    rebuild: tokio::sync::Mutex<()>,
    /// Completed rebuild attempts, successful or not.
    attempts: AtomicU64,
    generation: AtomicU64,
}

impl<S: RepoSource> RecordCache<S> {
    pub fn new(source: Arc<S>, config: &ContentConfig) -> Self {
        Self::with_identity(source, config, IdentityResolver::from_config(config))
    }

    pub fn with_identity(source: Arc<S>, config: &ContentConfig, identity: IdentityResolver) -> Self {
        Self {
            source,
            identity,
            publication_uri: config.publication_uri.clone(),
            collection: config.collection.clone(),
            page_size: config.page_size,
            ttl: config.cache_ttl,
            current: RwLock::new(None),
            rebuild: tokio::sync::Mutex::new(()),
            attempts: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn publication_uri(&self) -> &str {
        &self.publication_uri
    }

    /// Current snapshot without triggering a rebuild.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn state(&self) -> CacheState {
        match self.snapshot() {
            Some(snapshot) if snapshot.is_fresh(Instant::now()) => CacheState::Fresh,
            _ => CacheState::Stale,
        }
    }

    /// Return the snapshot, rebuilding first if it is stale or absent.
    pub async fn get(&self) -> Result<Arc<Snapshot>, Error> {
        let observed = self.attempts.load(Ordering::Acquire);
        if let Some(snapshot) = self.snapshot() {
            if snapshot.is_fresh(Instant::now()) {
                tracing::debug!(generation = snapshot.generation, "record cache hit");
                return Ok(snapshot);
            }
        }
        tracing::debug!("record cache miss");
        self.rebuild_coalesced(observed).await
    }

    /// Rebuild regardless of TTL.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, Error> {
        let observed = self.attempts.load(Ordering::Acquire);
        tracing::debug!("record cache refresh");
        self.rebuild_coalesced(observed).await
    }

    /// Resolve a slug. A miss forces one rebuild before reporting
    /// [`Lookup::NotFound`], so freshly published or renamed documents are
    /// found without waiting for the TTL.
    pub async fn lookup(&self, slug: &str) -> Result<Lookup, Error> {
        self.lookup_normalized(normalize_slug(slug)).await
    }

    /// [`RecordCache::lookup`] for a slug given as percent-encoded segments.
    pub async fn lookup_segments<T: AsRef<str>>(&self, segments: &[T]) -> Result<Lookup, Error> {
        self.lookup_normalized(normalize_slug_segments(segments)).await
    }

    async fn lookup_normalized(&self, slug: String) -> Result<Lookup, Error> {
        let snapshot = self.get().await?;
        match snapshot.lookup(&slug) {
            Lookup::NotFound => {}
            hit => return Ok(hit),
        }

        tracing::debug!(%slug, "slug not in snapshot, forcing refresh");
        let refreshed = self.refresh().await?;
        Ok(refreshed.lookup(&slug))
    }

    async fn rebuild_coalesced(&self, observed: u64) -> Result<Arc<Snapshot>, Error> {
        let _guard = self.rebuild.lock().await;

        // Another caller finished a rebuild while we waited for the lock.
        if self.attempts.load(Ordering::Acquire) != observed {
            if let Some(snapshot) = self.snapshot() {
                return Ok(snapshot);
            }
        }

        let outcome = self.build().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self
                    .current
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());
                tracing::info!(
                    generation = snapshot.generation,
                    records = snapshot.records.len(),
                    "record cache rebuilt"
                );
                Ok(snapshot)
            }
            Err(err) => match self.snapshot() {
                Some(previous) => {
                    tracing::warn!(
                        error = %err,
                        generation = previous.generation,
                        "record cache rebuild failed, keeping previous snapshot"
                    );
                    Ok(previous)
                }
                None => Err(err),
            },
        }
    }

    async fn build(&self) -> Result<Snapshot, Error> {
        let identity = self.identity.resolve(&*self.source).await?;
        let records = self.fetch_all(&identity).await?;
        let fetched = records.len();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Snapshot::build(
            &identity,
            records,
            &self.publication_uri,
            Instant::now() + self.ttl,
            generation,
        );
        tracing::debug!(fetched, kept = snapshot.records.len(), "filtered records");
        Ok(snapshot)
    }

    /// Page through the whole collection. Any failure discards the pages
    /// fetched so far.
    async fn fetch_all(&self, identity: &Identity) -> Result<Vec<Record>, FetchError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .source
                .list_records(
                    &identity.pds_url,
                    &identity.did,
                    &self.collection,
                    self.page_size,
                    cursor.as_deref(),
                )
                .await?;
            records.extend(page.records);

            match page.cursor {
                Some(next) if !next.is_empty() => {
                    if cursor.as_deref() == Some(next.as_str()) {
                        tracing::warn!(cursor = %next, "listRecords repeated its cursor, stopping");
                        break;
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordPage;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    const PUBLICATION: &str = "at://did:plc:test/site.standard.publication/pub";

    fn record(cid: &str, rkey: &str, path: &str) -> Record {
        serde_json::from_value(json!({
            "cid": cid,
            "uri": format!("at://did:plc:test/site.standard.document/{rkey}"),
            "value": { "site": PUBLICATION, "path": path, "title": cid }
        }))
        .unwrap()
    }

    /// In-memory repository serving pages of records.
    #[derive(Default)]
    struct FakeRepo {
        pages: Mutex<Vec<Vec<Record>>>,
        fail: std::sync::atomic::AtomicBool,
        /// Index of the one page that errors; earlier pages succeed.
        fail_page: Mutex<Option<usize>>,
        resolve_calls: AtomicUsize,
        list_calls: AtomicUsize,
    }

    impl FakeRepo {
        fn with_pages(pages: Vec<Vec<Record>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                ..Default::default()
            }
        }

        fn set_pages(&self, pages: Vec<Vec<Record>>) {
            *self.pages.lock().unwrap() = pages;
        }

        fn lists(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    impl RepoSource for FakeRepo {
        async fn resolve_pds(&self, _did: &str) -> Result<String, FetchError> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            Ok("https://pds.test".to_string())
        }

        async fn list_records(
            &self,
            _pds_url: &str,
            _did: &str,
            _collection: &str,
            _limit: u32,
            cursor: Option<&str>,
        ) -> Result<RecordPage, FetchError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Status {
                    url: "https://pds.test".into(),
                    status: 502,
                });
            }
            let pages = self.pages.lock().unwrap().clone();
            let index: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            if *self.fail_page.lock().unwrap() == Some(index) {
                return Err(FetchError::Status {
                    url: "https://pds.test".into(),
                    status: 503,
                });
            }
            let records = pages.get(index).cloned().unwrap_or_default();
            let cursor = (index + 1 < pages.len()).then(|| (index + 1).to_string());
            Ok(RecordPage { cursor, records })
        }

        async fn get_record(
            &self,
            _pds_url: &str,
            _repo: &str,
            _collection: &str,
            _rkey: &str,
        ) -> Result<Value, FetchError> {
            Ok(Value::Null)
        }

        async fn fetch_blob_json(
            &self,
            _pds_url: &str,
            _did: &str,
            _cid: &str,
        ) -> Result<Value, FetchError> {
            Ok(Value::Null)
        }
    }

    fn cache_with(repo: FakeRepo, ttl: Duration) -> RecordCache<FakeRepo> {
        let config = ContentConfig {
            publication_uri: PUBLICATION.to_string(),
            cache_ttl: ttl,
            ..Default::default()
        };
        let identity = IdentityResolver::new(
            std::env::temp_dir().join("ramblings-no-such-did-file"),
            Some("did:plc:test".into()),
        );
        RecordCache::with_identity(Arc::new(repo), &config, identity)
    }

    #[tokio::test]
    async fn test_builds_all_pages_and_filters() {
        let mut foreign = record("bafyforeign", "f1", "foreign");
        foreign.value["site"] = json!("at://did:plc:other/site.standard.publication/x");
        let mut pathless = record("bafynopath", "n1", "");
        pathless.value.as_object_mut().unwrap().remove("path");

        let repo = FakeRepo::with_pages(vec![
            vec![record("bafy1", "k1", "/one"), foreign],
            vec![record("bafy2", "k2", "two"), pathless],
        ]);
        let cache = cache_with(repo, Duration::from_secs(60));

        let snapshot = cache.get().await.unwrap();
        assert_eq!(cache.source().lists(), 2);
        assert_eq!(snapshot.records().len(), 2);
        let mut paths: Vec<_> = snapshot.paths().collect();
        paths.sort();
        assert_eq!(paths, vec!["one", "two"]);
        assert_eq!(snapshot.did(), "did:plc:test");
        assert_eq!(snapshot.pds_url(), "https://pds.test");
        assert_eq!(cache.state(), CacheState::Fresh);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_reused() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "one")]]),
            Duration::from_secs(60),
        );
        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.source().lists(), 1);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_rebuilt() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "one")]]),
            Duration::ZERO,
        );
        let first = cache.get().await.unwrap();
        assert_eq!(cache.state(), CacheState::Stale);
        let second = cache.get().await.unwrap();
        assert!(second.generation() > first.generation());
        assert_eq!(cache.source().lists(), 2);
    }

    #[tokio::test]
    async fn test_identity_resolved_once() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "one")]]),
            Duration::ZERO,
        );
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        cache.refresh().await.unwrap();
        assert_eq!(cache.source().resolve_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rebuild_twice_yields_same_paths() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![
                vec![record("bafy1", "k1", "one"), record("bafy2", "k2", "two")],
                vec![record("bafy3", "k3", "three")],
            ]),
            Duration::from_secs(60),
        );
        let first = cache.refresh().await.unwrap();
        let second = cache.refresh().await.unwrap();
        let mut a: Vec<_> = first.paths().collect();
        let mut b: Vec<_> = second.paths().collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_ne!(first.generation(), second.generation());
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_rebuild() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "one")]]),
            Duration::from_secs(60),
        );
        let (a, b, c) = tokio::join!(cache.get(), cache.get(), cache.get());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(cache.source().lists(), 1);
    }

    #[tokio::test]
    async fn test_lookup_path_hit() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "/notes/first")]]),
            Duration::from_secs(60),
        );
        match cache.lookup("//notes/first").await.unwrap() {
            Lookup::Found(record) => assert_eq!(record.cid, "bafy1"),
            other => panic!("expected a record, got {other:?}"),
        }
        assert_eq!(cache.source().lists(), 1);
    }

    #[tokio::test]
    async fn test_lookup_old_identifiers_redirect() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafyX", "3kold", "/new-path")]]),
            Duration::from_secs(60),
        );
        assert_eq!(
            cache.lookup("bafyX").await.unwrap(),
            Lookup::Redirect("new-path".into())
        );
        assert_eq!(
            cache.lookup("3kold").await.unwrap(),
            Lookup::Redirect("new-path".into())
        );
        assert_eq!(cache.source().lists(), 1);
    }

    #[tokio::test]
    async fn test_lookup_segments_are_decoded() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "café/a b")]]),
            Duration::from_secs(60),
        );
        let hit = cache.lookup_segments(&["caf%C3%A9", "a%20b"]).await.unwrap();
        assert!(matches!(hit, Lookup::Found(_)));
    }

    #[tokio::test]
    async fn test_miss_forces_one_refresh() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "one")]]),
            Duration::from_secs(60),
        );
        cache.get().await.unwrap();

        // Published upstream after the snapshot was taken.
        cache.source().set_pages(vec![vec![
            record("bafy1", "k1", "one"),
            record("bafy2", "k2", "fresh"),
        ]]);

        assert!(matches!(
            cache.lookup("fresh").await.unwrap(),
            Lookup::Found(_)
        ));
        assert_eq!(cache.source().lists(), 2);

        assert_eq!(cache.lookup("missing").await.unwrap(), Lookup::NotFound);
        assert_eq!(cache.source().lists(), 3);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_snapshot() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "one")]]),
            Duration::ZERO,
        );
        let first = cache.get().await.unwrap();
        cache.source().fail.store(true, Ordering::SeqCst);
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_failed_first_build_propagates() {
        let repo = FakeRepo::with_pages(vec![]);
        repo.fail.store(true, Ordering::SeqCst);
        let cache = cache_with(repo, Duration::from_secs(60));
        assert!(matches!(
            cache.get().await,
            Err(Error::Fetch(FetchError::Status { status: 502, .. }))
        ));
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_late_page_failure_discards_partial_pages() {
        let cache = cache_with(
            FakeRepo::with_pages(vec![vec![record("bafy1", "k1", "one")]]),
            Duration::ZERO,
        );
        let first = cache.get().await.unwrap();

        // Page 0 now carries a new document, but page 1 fails.
        cache.source().set_pages(vec![
            vec![record("bafy1", "k1", "one"), record("bafy2", "k2", "partial")],
            vec![record("bafy3", "k3", "three")],
        ]);
        *cache.source().fail_page.lock().unwrap() = Some(1);

        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lookup("partial"), Lookup::NotFound);
        assert_eq!(cache.source().lists(), 3);
    }

    #[tokio::test]
    async fn test_late_page_failure_on_first_build_propagates() {
        let repo = FakeRepo::with_pages(vec![
            vec![record("bafy1", "k1", "one")],
            vec![record("bafy2", "k2", "two")],
        ]);
        *repo.fail_page.lock().unwrap() = Some(1);
        let cache = cache_with(repo, Duration::from_secs(60));

        assert!(matches!(
            cache.get().await,
            Err(Error::Fetch(FetchError::Status { status: 503, .. }))
        ));
        assert_eq!(cache.source().lists(), 2);
        assert!(cache.snapshot().is_none());
    }
}
