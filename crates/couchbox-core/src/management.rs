//! Client for the Couchbase management REST API.
//!
//! Every call is a single form-encoded request. Non-2xx responses are
//! surfaced with the response body verbatim; nothing here retries.

use crate::bootstrap::BootstrapStep;
use crate::error::{CoreError, Result};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings endpoint, used both as readiness check and to set credentials.
const SETTINGS_WEB: [&str; 2] = ["settings", "web"];

/// Bucket collection endpoint.
const BUCKETS: [&str; 3] = ["pools", "default", "buckets"];

/// Administrator credentials used for basic auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Administrator username.
    pub username: String,
    /// Administrator password.
    pub password: String,
}

/// HTTP client bound to one node's management port.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    http: reqwest::Client,
    base_url: String,
    endpoint: Url,
    credentials: Credentials,
}

impl ManagementClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8091`).
    ///
    /// `request_timeout` bounds every single request.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        request_timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let endpoint = Url::parse(&base_url)
            .map_err(|e| CoreError::Config(format!("invalid management url {base_url:?}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(CoreError::Config(format!(
                "management url {base_url:?} cannot be a base"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            endpoint,
            credentials,
        })
    }

    /// Base URL of the management API.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Credentials used for authenticated calls.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Unauthenticated GET of the settings endpoint.
    ///
    /// Returns the status code; transport errors (connection refused,
    /// reset, timeout) come back as [`CoreError::Http`].
    pub async fn check_settings(&self) -> Result<StatusCode> {
        let response = self.http.get(self.url(&SETTINGS_WEB)?).send().await?;
        Ok(response.status())
    }

    /// Set the administrator credentials. This is the only unauthenticated POST.
    pub async fn set_admin_credentials(&self) -> Result<()> {
        let step = BootstrapStep::SetAdminCredentials;
        tracing::debug!(username = %self.credentials.username, "Setting admin credentials");
        let request = self.http.post(self.url(&SETTINGS_WEB)?).form(&[
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("port", "SAME"),
        ]);
        self.send_step(step, request).await
    }

    /// Create a bucket.
    pub async fn create_bucket(&self, name: &str, bucket_type: &str, ram_quota_mb: u32) -> Result<()> {
        let step = BootstrapStep::CreateBucket;
        tracing::debug!(bucket = %name, bucket_type, ram_quota_mb, "Creating bucket");
        let request = self.authed(self.http.post(self.url(&BUCKETS)?)).form(&[
            ("name", name.to_string()),
            ("bucketType", bucket_type.to_string()),
            ("ramQuotaMB", ram_quota_mb.to_string()),
        ]);
        self.send_step(step, request).await
    }

    /// Create a scope inside a bucket.
    pub async fn create_scope(&self, bucket: &str, name: &str) -> Result<()> {
        let step = BootstrapStep::CreateScope;
        tracing::debug!(bucket, scope = %name, "Creating scope");
        let request = self
            .authed(self.http.post(self.url(&scopes_segments(bucket))?))
            .form(&[("name", name)]);
        self.send_step(step, request).await
    }

    /// Create a collection inside a scope.
    pub async fn create_collection(
        &self,
        bucket: &str,
        scope: &str,
        name: &str,
        max_ttl: u32,
        history: bool,
    ) -> Result<()> {
        let step = BootstrapStep::CreateCollection;
        tracing::debug!(bucket, scope, collection = %name, max_ttl, history, "Creating collection");
        let mut segments = scopes_segments(bucket);
        segments.extend([scope, "collections"]);
        let request = self.authed(self.http.post(self.url(&segments)?)).form(&[
            ("name", name.to_string()),
            ("maxTTL", max_ttl.to_string()),
            ("history", history.to_string()),
        ]);
        self.send_step(step, request).await
    }

    /// List all buckets.
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        tracing::debug!("Listing buckets");
        let request = self.authed(self.http.get(self.url(&BUCKETS)?));
        let buckets: Vec<BucketInfo> = self.fetch(request).await?;
        tracing::trace!(count = buckets.len(), "Buckets listed");
        Ok(buckets)
    }

    /// Fetch the scope/collection manifest of a bucket.
    pub async fn list_scopes(&self, bucket: &str) -> Result<ScopeManifest> {
        tracing::debug!(bucket, "Listing scopes");
        let request = self.authed(self.http.get(self.url(&scopes_segments(bucket))?));
        self.fetch(request).await
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CoreError::Config(format!("management url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    async fn send_step(&self, step: BootstrapStep, request: RequestBuilder) -> Result<()> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(%step, error = %e, "Provisioning request failed");
            CoreError::Http(e)
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(%step, status = status.as_u16(), "Provisioning step succeeded");
            return Ok(());
        }

        let body = body_text(response).await;
        tracing::error!(%step, status = status.as_u16(), body = %body, "Provisioning step rejected");
        Err(CoreError::ProvisioningFailed {
            step,
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = body_text(response).await;
            tracing::warn!(status = status.as_u16(), body = %body, "Inspection request rejected");
            return Err(CoreError::InspectionFailed {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn scopes_segments(bucket: &str) -> Vec<&str> {
    let mut segments = BUCKETS.to_vec();
    segments.extend([bucket, "scopes"]);
    segments
}

async fn body_text(response: Response) -> String {
    response.text().await.unwrap_or_default()
}

/// A bucket as reported by `GET /pools/default/buckets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Storage type as reported by the server (`membase` for couchbase buckets).
    #[serde(rename = "bucketType", default, skip_serializing_if = "Option::is_none")]
    pub bucket_type: Option<String>,
    /// Every other field of the descriptor.
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Scope/collection manifest of a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeManifest {
    /// Manifest revision.
    #[serde(default)]
    pub uid: String,
    /// Scopes in the bucket, system scopes included.
    pub scopes: Vec<ScopeInfo>,
}

impl ScopeManifest {
    /// Find a scope by name.
    pub fn scope(&self, name: &str) -> Option<&ScopeInfo> {
        self.scopes.iter().find(|s| s.name == name)
    }
}

/// One scope in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeInfo {
    /// Scope name.
    pub name: String,
    /// Scope id within the manifest.
    #[serde(default)]
    pub uid: String,
    /// Collections in the scope.
    #[serde(default)]
    pub collections: Vec<CollectionInfo>,
}

impl ScopeInfo {
    /// Find a collection by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionInfo> {
        self.collections.iter().find(|c| c.name == name)
    }
}

/// One collection in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Collection id within the manifest.
    #[serde(default)]
    pub uid: String,
    /// Document expiry in seconds, `0` for none.
    #[serde(rename = "maxTTL", default, skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<u32>,
    /// Whether change history is retained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<bool>,
}
