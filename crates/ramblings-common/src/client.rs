//! Repository access: identity documents, record listing and blobs.
//!
//! [`RepoSource`] is the seam the record cache and the content service talk
//! through; [`XrpcClient`] is the HTTP implementation.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::FetchError;
use crate::record::RecordPage;

/// Source of repository data.
///
/// Implementations can hit the network, or serve canned pages in tests.
pub trait RepoSource: Send + Sync {
    /// Resolve a DID to its PDS endpoint (no trailing slash).
    fn resolve_pds(&self, did: &str) -> impl Future<Output = Result<String, FetchError>> + Send;

    /// Fetch one page of `com.atproto.repo.listRecords`.
    fn list_records(
        &self,
        pds_url: &str,
        did: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<RecordPage, FetchError>> + Send;

    /// Fetch a single record's `value` via `com.atproto.repo.getRecord`.
    fn get_record(
        &self,
        pds_url: &str,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send;

    /// Fetch a blob and decode it as JSON.
    fn fetch_blob_json(
        &self,
        pds_url: &str,
        did: &str,
        cid: &str,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

#[derive(Debug, Deserialize)]
struct DidDocument {
    #[serde(default)]
    service: Vec<DidService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidService {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    service_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetRecordOutput {
    #[serde(default)]
    value: Value,
}

/// HTTP implementation of [`RepoSource`].
#[derive(Debug, Clone)]
pub struct XrpcClient {
    http: reqwest::Client,
    plc_directory: Url,
}

impl XrpcClient {
    pub fn new(plc_directory: Url, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ramblings/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::request(plc_directory.as_str(), e))?;
        Ok(Self {
            http,
            plc_directory,
        })
    }

    pub fn with_client(http: reqwest::Client, plc_directory: Url) -> Self {
        Self {
            http,
            plc_directory,
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn did_document_url(&self, did: &str) -> Result<Url, FetchError> {
        if did.starts_with("did:plc:") {
            let base = self.plc_directory.as_str().trim_end_matches('/');
            parse_url(&format!("{base}/{did}"))
        } else if let Some(host) = did.strip_prefix("did:web:") {
            parse_url(&format!("https://{host}/.well-known/did.json"))
        } else {
            Err(FetchError::UnsupportedDid {
                did: did.to_string(),
            })
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        tracing::debug!(%url, "GET");
        let res = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::request(url.as_str(), e))?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        res.json::<T>()
            .await
            .map_err(|e| FetchError::decode(url.as_str(), e))
    }
}

impl RepoSource for XrpcClient {
    async fn resolve_pds(&self, did: &str) -> Result<String, FetchError> {
        let url = self.did_document_url(did)?;
        let doc: DidDocument = self.get_json(url).await?;
        select_pds_endpoint(&doc).ok_or_else(|| FetchError::MissingEndpoint {
            did: did.to_string(),
        })
    }

    async fn list_records(
        &self,
        pds_url: &str,
        did: &str,
        collection: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, FetchError> {
        let mut url = xrpc_url(pds_url, "com.atproto.repo.listRecords")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("repo", did)
                .append_pair("collection", collection)
                .append_pair("limit", &limit.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        self.get_json(url).await
    }

    async fn get_record(
        &self,
        pds_url: &str,
        repo: &str,
        collection: &str,
        rkey: &str,
    ) -> Result<Value, FetchError> {
        let mut url = xrpc_url(pds_url, "com.atproto.repo.getRecord")?;
        url.query_pairs_mut()
            .append_pair("repo", repo)
            .append_pair("collection", collection)
            .append_pair("rkey", rkey);
        let output: GetRecordOutput = self.get_json(url).await?;
        Ok(output.value)
    }

    async fn fetch_blob_json(
        &self,
        pds_url: &str,
        did: &str,
        cid: &str,
    ) -> Result<Value, FetchError> {
        let url = blob_url(pds_url, did, cid).ok_or_else(|| FetchError::InvalidUri {
            uri: pds_url.to_string(),
        })?;
        self.get_json(url).await
    }
}

/// Build the `com.atproto.sync.getBlob` URL for a blob in `did`'s repository.
pub fn blob_url(pds_url: &str, did: &str, cid: &str) -> Option<Url> {
    let mut url = xrpc_url(pds_url, "com.atproto.sync.getBlob").ok()?;
    url.query_pairs_mut()
        .append_pair("did", did)
        .append_pair("cid", cid);
    Some(url)
}

fn xrpc_url(pds_url: &str, nsid: &str) -> Result<Url, FetchError> {
    parse_url(&format!("{}/xrpc/{nsid}", pds_url.trim_end_matches('/')))
}

fn parse_url(s: &str) -> Result<Url, FetchError> {
    Url::parse(s).map_err(|_| FetchError::InvalidUri { uri: s.to_string() })
}

fn select_pds_endpoint(doc: &DidDocument) -> Option<String> {
    doc.service
        .iter()
        .find(|s| {
            s.id.as_deref().is_some_and(|id| id.ends_with("#atproto_pds"))
                || s.kind.as_deref() == Some("AtprotoPersonalDataServer")
        })
        .and_then(|s| s.service_endpoint.as_deref())
        .map(|endpoint| endpoint.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> DidDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_select_pds_by_id() {
        let d = doc(json!({
            "service": [
                { "id": "#other", "type": "Other", "serviceEndpoint": "https://other.example" },
                { "id": "#atproto_pds", "type": "X", "serviceEndpoint": "https://pds.example/" }
            ]
        }));
        assert_eq!(select_pds_endpoint(&d).as_deref(), Some("https://pds.example"));
    }

    #[test]
    fn test_select_pds_by_type() {
        let d = doc(json!({
            "service": [
                { "type": "AtprotoPersonalDataServer", "serviceEndpoint": "https://pds.example" }
            ]
        }));
        assert_eq!(select_pds_endpoint(&d).as_deref(), Some("https://pds.example"));
    }

    #[test]
    fn test_select_pds_missing() {
        assert_eq!(select_pds_endpoint(&doc(json!({}))), None);
        let d = doc(json!({ "service": [{ "id": "#atproto_pds" }] }));
        assert_eq!(select_pds_endpoint(&d), None);
    }

    #[test]
    fn test_blob_url() {
        let url = blob_url("https://pds.example/", "did:plc:abc", "bafyblob").unwrap();
        assert_eq!(
            url.as_str(),
            "https://pds.example/xrpc/com.atproto.sync.getBlob?did=did%3Aplc%3Aabc&cid=bafyblob"
        );
    }

    #[test]
    fn test_did_document_urls() {
        let client = XrpcClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://plc.directory").unwrap(),
        );
        assert_eq!(
            client.did_document_url("did:plc:abc").unwrap().as_str(),
            "https://plc.directory/did:plc:abc"
        );
        assert_eq!(
            client.did_document_url("did:web:example.com").unwrap().as_str(),
            "https://example.com/.well-known/did.json"
        );
        assert!(matches!(
            client.did_document_url("did:key:z6Mk"),
            Err(FetchError::UnsupportedDid { .. })
        ));
    }
}
