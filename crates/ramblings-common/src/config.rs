use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::uri::{AtUri, at_uri_authority};

/// Runtime configuration for the content pipeline.
#[derive(Debug, Clone)]
pub struct ContentConfig {
    /// AT-URI of the publication whose documents are served.
    pub publication_uri: String,
    /// File holding the repository DID (`.well-known/atproto-did`).
    pub did_file: PathBuf,
    /// PLC directory used to resolve `did:plc` identities.
    pub plc_directory: Url,
    /// Collection listed from the repository.
    pub collection: String,
    /// Page size for `listRecords`.
    pub page_size: u32,
    /// How long a record snapshot stays fresh.
    pub cache_ttl: Duration,
    /// Public AppView used for comment threads.
    pub thread_api: Url,
    /// Maximum reply depth requested for a thread.
    pub thread_depth: u32,
    /// Per-request timeout for every upstream call.
    pub http_timeout: Duration,
}

impl ContentConfig {
    pub const DEFAULT_PUBLICATION_URI: &'static str =
        "at://did:plc:zviscnpwyvj6y32agi5davn5/site.standard.publication/3me7e3v47hr2l";
    pub const DEFAULT_DID_FILE: &'static str = "public/.well-known/atproto-did";
    pub const DEFAULT_PLC_DIRECTORY: &'static str = "https://plc.directory";
    pub const DEFAULT_COLLECTION: &'static str = "site.standard.document";
    pub const DEFAULT_PAGE_SIZE: u32 = 100;
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(12 * 60);
    pub const DEFAULT_THREAD_API: &'static str = "https://public.api.bsky.app";
    pub const DEFAULT_THREAD_DEPTH: u32 = 1000;
    pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

    /// Load configuration from environment variables.
    ///
    /// Optional env vars (defaults in parentheses):
    /// - `RAMBLINGS_PUBLICATION_URI`
    /// - `RAMBLINGS_DID_FILE` (public/.well-known/atproto-did)
    /// - `RAMBLINGS_PLC_DIRECTORY` (https://plc.directory)
    /// - `RAMBLINGS_COLLECTION` (site.standard.document)
    /// - `RAMBLINGS_PAGE_SIZE` (100)
    /// - `RAMBLINGS_CACHE_TTL_SECS` (720)
    /// - `RAMBLINGS_THREAD_API` (https://public.api.bsky.app)
    /// - `RAMBLINGS_THREAD_DEPTH` (1000)
    /// - `RAMBLINGS_HTTP_TIMEOUT_SECS` (20)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let publication_uri =
            std::env::var("RAMBLINGS_PUBLICATION_URI").unwrap_or(defaults.publication_uri);
        if AtUri::parse(&publication_uri).is_none() {
            return Err(ConfigError::InvalidPublicationUri {
                uri: publication_uri,
            });
        }

        let did_file = std::env::var("RAMBLINGS_DID_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.did_file);

        let plc_directory = match std::env::var("RAMBLINGS_PLC_DIRECTORY") {
            Ok(s) => parse_url(&s)?,
            Err(_) => defaults.plc_directory,
        };

        let collection = std::env::var("RAMBLINGS_COLLECTION").unwrap_or(defaults.collection);

        let page_size = env_number("RAMBLINGS_PAGE_SIZE")?.unwrap_or(defaults.page_size);

        let cache_ttl = env_number("RAMBLINGS_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);

        let thread_api = match std::env::var("RAMBLINGS_THREAD_API") {
            Ok(s) => parse_url(&s)?,
            Err(_) => defaults.thread_api,
        };

        let thread_depth = env_number("RAMBLINGS_THREAD_DEPTH")?.unwrap_or(defaults.thread_depth);

        let http_timeout = env_number("RAMBLINGS_HTTP_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        Ok(Self {
            publication_uri,
            did_file,
            plc_directory,
            collection,
            page_size,
            cache_ttl,
            thread_api,
            thread_depth,
            http_timeout,
        })
    }

    /// DID named by the publication URI authority.
    pub fn publication_did(&self) -> Option<&str> {
        at_uri_authority(&self.publication_uri).filter(|a| a.starts_with("did:"))
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            publication_uri: Self::DEFAULT_PUBLICATION_URI.to_string(),
            did_file: PathBuf::from(Self::DEFAULT_DID_FILE),
            plc_directory: Url::parse(Self::DEFAULT_PLC_DIRECTORY)
                .expect("default PLC directory is a valid URL"),
            collection: Self::DEFAULT_COLLECTION.to_string(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            cache_ttl: Self::DEFAULT_CACHE_TTL,
            thread_api: Url::parse(Self::DEFAULT_THREAD_API)
                .expect("default thread API is a valid URL"),
            thread_depth: Self::DEFAULT_THREAD_DEPTH,
            http_timeout: Self::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

fn parse_url(s: &str) -> Result<Url, ConfigError> {
    Url::parse(s).map_err(|e| ConfigError::UrlParse {
        url: s.to_string(),
        message: e.to_string(),
    })
}

fn env_number<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContentConfig::default();
        assert_eq!(config.collection, "site.standard.document");
        assert_eq!(config.page_size, 100);
        assert_eq!(config.cache_ttl, Duration::from_secs(720));
        assert_eq!(config.thread_depth, 1000);
        assert_eq!(config.publication_did(), Some("did:plc:zviscnpwyvj6y32agi5davn5"));
    }

    #[test]
    fn test_publication_did_requires_did_authority() {
        let config = ContentConfig {
            publication_uri: "at://alice.example.com/site.standard.publication/x".into(),
            ..Default::default()
        };
        assert_eq!(config.publication_did(), None);
    }
}
