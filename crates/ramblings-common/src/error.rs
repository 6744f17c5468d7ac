//! Error types shared by the record cache and the repository client.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for ramblings operations
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

/// Upstream failures while talking to the identity directory, the PDS, or
/// the public AppView.
#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("request to {url} failed")]
    #[diagnostic(code(fetch::request))]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    #[diagnostic(code(fetch::status))]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}")]
    #[diagnostic(code(fetch::decode))]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no atproto PDS endpoint found in DID document for {did}")]
    #[diagnostic(
        code(fetch::missing_endpoint),
        help("the DID document needs a service with id `#atproto_pds`")
    )]
    MissingEndpoint { did: String },

    #[error("unsupported DID method: {did}")]
    #[diagnostic(code(fetch::unsupported_did))]
    UnsupportedDid { did: String },

    #[error("invalid URL: {uri}")]
    #[diagnostic(code(fetch::invalid_uri))]
    InvalidUri { uri: String },
}

/// Configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing ATProto DID")]
    #[diagnostic(
        code(config::missing_did),
        help("write the DID to the DID file or use a publication URI with a DID authority")
    )]
    MissingDid,

    #[error("invalid publication URI: {uri}")]
    #[diagnostic(code(config::publication_uri))]
    InvalidPublicationUri { uri: String },

    #[error("failed to parse URL {url}: {message}")]
    #[diagnostic(code(config::url_parse))]
    UrlParse { url: String, message: String },

    #[error("invalid value {value:?} for {var}")]
    #[diagnostic(code(config::invalid_number))]
    InvalidNumber { var: &'static str, value: String },
}

impl FetchError {
    pub(crate) fn request(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn decode(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }
}
