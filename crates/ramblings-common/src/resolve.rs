//! Repository identity discovery.
//!
//! The repository DID and its PDS endpoint rarely change, so they are
//! resolved once and kept for the lifetime of the resolver, independently of
//! the record snapshot TTL.

use std::path::PathBuf;

use tokio::sync::OnceCell;

use crate::client::RepoSource;
use crate::config::ContentConfig;
use crate::error::{ConfigError, Error};

/// A resolved repository: DID plus the PDS serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub did: String,
    pub pds_url: String,
}

#[derive(Debug)]
pub struct IdentityResolver {
    did_file: PathBuf,
    fallback_did: Option<String>,
    identity: OnceCell<Identity>,
}

impl IdentityResolver {
    pub fn new(did_file: impl Into<PathBuf>, fallback_did: Option<String>) -> Self {
        Self {
            did_file: did_file.into(),
            fallback_did,
            identity: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ContentConfig) -> Self {
        Self::new(
            config.did_file.clone(),
            config.publication_did().map(str::to_string),
        )
    }

    /// The repository DID: the DID file when it holds a non-empty value,
    /// otherwise the publication URI authority.
    pub fn discover_did(&self) -> Result<String, ConfigError> {
        match std::fs::read_to_string(&self.did_file) {
            Ok(contents) => {
                let did = contents.trim();
                if !did.is_empty() {
                    return Ok(did.to_string());
                }
            }
            Err(_) => {
                tracing::debug!(
                    path = %self.did_file.display(),
                    "DID file unavailable, using publication DID"
                );
            }
        }

        self.fallback_did.clone().ok_or(ConfigError::MissingDid)
    }

    /// Resolve the identity once; later calls return the cached value.
    /// A failed resolution is not cached.
    pub async fn resolve<S: RepoSource>(&self, source: &S) -> Result<Identity, Error> {
        self.identity
            .get_or_try_init(|| async {
                let did = self.discover_did()?;
                let pds_url = source.resolve_pds(&did).await?;
                tracing::info!(%did, %pds_url, "resolved repository identity");
                Ok::<_, Error>(Identity { did, pds_url })
            })
            .await
            .cloned()
    }

    /// The cached identity, if it has been resolved.
    pub fn cached(&self) -> Option<&Identity> {
        self.identity.get()
    }
}
