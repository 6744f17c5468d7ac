//! Shared plumbing for ramblings: configuration, repository access and the
//! publication record cache.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod record;
pub mod record_cache;
pub mod resolve;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod uri;

pub use crate::client::{RepoSource, XrpcClient, blob_url};
pub use crate::config::ContentConfig;
pub use crate::error::{ConfigError, Error, FetchError};
pub use crate::record::{Record, RecordPage};
pub use crate::record_cache::{CacheState, Lookup, RecordCache, Snapshot};
pub use crate::resolve::{Identity, IdentityResolver};
pub use crate::uri::{AtUri, normalize_slug, normalize_slug_segments};
