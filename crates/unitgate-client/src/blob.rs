//! Blob store client
//!
//! Function units and dependencies live as objects in a Swift-style blob
//! store addressed by `(account, container, name)`. The store is assumed
//! consistent within a single call and is never retried here.

use bytes::Bytes;
use http::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use unitgate_common::{BlobStoreConfig, Error, ObjectMetadata, Result};

/// An object fetched from the blob store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteObject {
    /// Object payload
    pub body: Bytes,
    /// Provenance metadata reported with the payload
    pub metadata: ObjectMetadata,
}

/// Read access to the remote blob store
pub trait BlobStore: Send + Sync {
    /// Fetch an object's payload and metadata
    fn get_object(&self, account: &str, container: &str, name: &str) -> Result<RemoteObject>;

    /// Fetch only an object's metadata
    fn head_object(&self, account: &str, container: &str, name: &str) -> Result<ObjectMetadata>;
}

/// Blocking HTTP client for a Swift-style object API
pub struct HttpBlobStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpBlobStore {
    /// Create a client from configuration
    pub fn new(config: &BlobStoreConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn object_url(&self, account: &str, container: &str, name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.endpoint,
            urlencoding::encode(account),
            urlencoding::encode(container),
            urlencoding::encode(name)
        )
    }

    fn send(
        &self,
        method: reqwest::Method,
        account: &str,
        container: &str,
        name: &str,
    ) -> Result<reqwest::blocking::Response> {
        let url = self.object_url(account, container, name);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(token) = &self.auth_token {
            request = request.header("X-Auth-Token", token);
        }

        let response = request
            .send()
            .map_err(|e| Error::remote_fetch(container, name, e))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::remote_fetch(container, name, "object not found")),
            status => Err(Error::remote_fetch(
                container,
                name,
                format!("unexpected status {status}"),
            )),
        }
    }
}

impl BlobStore for HttpBlobStore {
    fn get_object(&self, account: &str, container: &str, name: &str) -> Result<RemoteObject> {
        let response = self.send(reqwest::Method::GET, account, container, name)?;
        let metadata = metadata_from_headers(response.headers());
        let body = response
            .bytes()
            .map_err(|e| Error::remote_fetch(container, name, e))?;

        Ok(RemoteObject { body, metadata })
    }

    fn head_object(&self, account: &str, container: &str, name: &str) -> Result<ObjectMetadata> {
        let response = self.send(reqwest::Method::HEAD, account, container, name)?;
        Ok(metadata_from_headers(response.headers()))
    }
}

/// Convert response headers to metadata with canonical header-name case
#[must_use]
pub fn metadata_from_headers(headers: &HeaderMap) -> ObjectMetadata {
    let mut metadata = ObjectMetadata::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            metadata.insert(canonical_header_name(name.as_str()), value);
        }
    }
    metadata
}

/// `x-object-meta-foo` becomes `X-Object-Meta-Foo`
#[must_use]
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}
