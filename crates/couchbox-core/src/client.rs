//! Client handle bound to a provisioned cluster.
//!
//! A [`Cluster`] is built fresh per call and has a lifetime independent of
//! the container that produced it. Document operations go over the
//! encrypted management port's document endpoint.

use crate::error::{CoreError, Result};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scheme of the advertised connection URL.
pub const SECURE_SCHEME: &str = "couchbases";

/// Common flags value the server uses to tag JSON documents.
const JSON_DOCUMENT_FLAGS: u32 = 0x0200_0000;

/// Interval between readiness checks in [`Cluster::wait_until_ready`].
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// TCP keep-alive interval when keep-alive is enabled.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Username/password authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordAuthenticator {
    /// Username sent with every request.
    pub username: String,
    /// Password sent with every request.
    pub password: String,
}

impl PasswordAuthenticator {
    /// Create an authenticator from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Transport scheme of the document endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointScheme {
    /// TLS to the secure management port.
    #[default]
    Https,
    /// Plain HTTP, for in-process fakes only.
    Http,
}

impl EndpointScheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Https => "https",
            Self::Http => "http",
        }
    }
}

/// Options for a [`Cluster`] handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOptions {
    /// Timeout for each document operation (default: 10 seconds).
    pub kv_timeout: Duration,
    /// How long [`Cluster::wait_until_ready`] may block (default: 15 seconds).
    pub ready_timeout: Duration,
    /// Enable TCP keep-alive (default: true).
    pub tcp_keep_alive: bool,
    /// Accept any server certificate. Traffic stays encrypted but the
    /// server is not authenticated. Only meant for throwaway test containers.
    pub insecure_skip_tls_verify: bool,
    /// Scheme used to reach the document endpoint (default: HTTPS).
    /// The advertised connection URL is `couchbases://` either way.
    pub endpoint_scheme: EndpointScheme,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            kv_timeout: Duration::from_secs(10),
            ready_timeout: Duration::from_secs(15),
            tcp_keep_alive: true,
            insecure_skip_tls_verify: false,
            endpoint_scheme: EndpointScheme::Https,
        }
    }
}

impl ClusterOptions {
    /// Options for a container with a self-signed certificate:
    /// the defaults with `insecure_skip_tls_verify` turned on.
    pub fn for_test_container() -> Self {
        Self {
            insecure_skip_tls_verify: true,
            ..Default::default()
        }
    }
}

/// Handle to a running cluster.
///
/// Cheap to clone; clones share the underlying connection pool and can be
/// used concurrently.
#[derive(Debug, Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

#[derive(Debug)]
struct ClusterInner {
    http: reqwest::Client,
    connection_url: String,
    endpoint: Url,
    auth: PasswordAuthenticator,
    options: ClusterOptions,
}

impl Cluster {
    /// Build a handle for `host`, talking to `endpoint_port` with the
    /// scheme from `options`.
    pub fn connect(
        host: &str,
        endpoint_port: u16,
        auth: PasswordAuthenticator,
        options: ClusterOptions,
    ) -> Result<Self> {
        let endpoint = format!("{}://{host}:{endpoint_port}", options.endpoint_scheme.as_str());
        Self::with_endpoint(host, &endpoint, auth, options)
    }

    /// Build a handle advertised for `host` that sends requests to `endpoint`.
    pub fn with_endpoint(
        host: &str,
        endpoint: &str,
        auth: PasswordAuthenticator,
        options: ClusterOptions,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| CoreError::Config(format!("invalid endpoint {endpoint:?}: {e}")))?;

        if options.insecure_skip_tls_verify {
            tracing::warn!(
                host,
                "TLS certificate verification disabled; use only with test containers"
            );
        }

        let http = reqwest::Client::builder()
            .timeout(options.kv_timeout)
            .tcp_keepalive(options.tcp_keep_alive.then_some(KEEP_ALIVE_INTERVAL))
            .danger_accept_invalid_certs(options.insecure_skip_tls_verify)
            .build()?;

        tracing::debug!(host, endpoint = %endpoint, "Cluster handle created");
        Ok(Self {
            inner: Arc::new(ClusterInner {
                http,
                connection_url: format!("{SECURE_SCHEME}://{host}"),
                endpoint,
                auth,
                options,
            }),
        })
    }

    /// Advertised connection URL (`couchbases://<host>`).
    pub fn connection_url(&self) -> &str {
        &self.inner.connection_url
    }

    /// Options this handle was built with.
    pub fn options(&self) -> &ClusterOptions {
        &self.inner.options
    }

    /// Block until every node reports `healthy`, or `timeout` elapses.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let mut attempts = 0u32;
        let check = async {
            loop {
                attempts += 1;
                match self.cluster_healthy().await {
                    Ok(true) => return,
                    Ok(false) => tracing::trace!(attempt = attempts, "Cluster not healthy yet"),
                    Err(e) => tracing::trace!(error = %e, attempt = attempts, "Readiness check failed"),
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(timeout, check).await {
            Ok(()) => {
                tracing::info!(
                    url = %self.connection_url(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Cluster ready"
                );
                Ok(())
            }
            Err(_) => {
                tracing::warn!(url = %self.connection_url(), ?timeout, "Cluster readiness timeout");
                Err(CoreError::ClientReadinessTimeout(timeout))
            }
        }
    }

    /// Open a bucket.
    pub fn bucket(&self, name: impl Into<String>) -> Bucket {
        Bucket {
            cluster: self.clone(),
            name: name.into(),
        }
    }

    async fn cluster_healthy(&self) -> Result<bool> {
        let url = self.url(&["pools", "default"])?;
        let response = self.request(Method::GET, url).send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let pool: PoolDetails = serde_json::from_slice(&response.bytes().await?)?;
        Ok(!pool.nodes.is_empty() && pool.nodes.iter().all(|n| n.status == "healthy"))
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.inner.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CoreError::Config(format!("endpoint {} cannot be a base", self.inner.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .basic_auth(&self.inner.auth.username, Some(&self.inner.auth.password))
    }
}

/// Handle to a bucket.
#[derive(Debug, Clone)]
pub struct Bucket {
    cluster: Cluster,
    name: String,
}

impl Bucket {
    /// Bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a scope in this bucket.
    pub fn scope(&self, name: impl Into<String>) -> Scope {
        Scope {
            bucket: self.clone(),
            name: name.into(),
        }
    }
}

/// Handle to a scope.
#[derive(Debug, Clone)]
pub struct Scope {
    bucket: Bucket,
    name: String,
}

impl Scope {
    /// Scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a collection in this scope.
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection {
            scope: self.clone(),
            name: name.into(),
        }
    }
}

/// Handle to a collection; performs document operations.
#[derive(Debug, Clone)]
pub struct Collection {
    scope: Scope,
    name: String,
}

impl Collection {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or replace a JSON document.
    pub async fn upsert<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let body = serde_json::to_string(value)?;
        tracing::debug!(collection = %self.name, key, size = body.len(), "Upserting document");

        let flags = JSON_DOCUMENT_FLAGS.to_string();
        let response = self
            .cluster()
            .request(Method::POST, self.doc_url(key)?)
            .form(&[("value", body.as_str()), ("flags", flags.as_str())])
            .send()
            .await?;

        check_document_status(key, response).await.map(|_| ())
    }

    /// Fetch a document.
    pub async fn get(&self, key: &str) -> Result<GetResult> {
        tracing::debug!(collection = %self.name, key, "Getting document");
        let response = self
            .cluster()
            .request(Method::GET, self.doc_url(key)?)
            .send()
            .await?;

        let response = check_document_status(key, response).await?;
        let raw: RawDocument = serde_json::from_slice(&response.bytes().await?)?;
        let content = match raw.json {
            serde_json::Value::String(text) => serde_json::from_str(&text)?,
            other => other,
        };
        Ok(GetResult {
            key: key.to_string(),
            meta: raw.meta,
            content,
        })
    }

    /// Delete a document.
    pub async fn remove(&self, key: &str) -> Result<()> {
        tracing::debug!(collection = %self.name, key, "Removing document");
        let response = self
            .cluster()
            .request(Method::DELETE, self.doc_url(key)?)
            .send()
            .await?;

        check_document_status(key, response).await.map(|_| ())
    }

    fn cluster(&self) -> &Cluster {
        &self.scope.bucket.cluster
    }

    fn doc_url(&self, key: &str) -> Result<Url> {
        self.cluster().url(&[
            "pools",
            "default",
            "buckets",
            &self.scope.bucket.name,
            "scopes",
            &self.scope.name,
            "collections",
            &self.name,
            "docs",
            key,
        ])
    }
}

async fn check_document_status(key: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(CoreError::DocumentNotFound(key.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(key, status = status.as_u16(), body = %body, "Document operation rejected");
    Err(CoreError::Document {
        key: key.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Result of [`Collection::get`].
#[derive(Debug, Clone)]
pub struct GetResult {
    /// Document key.
    pub key: String,
    /// Server-side metadata.
    pub meta: DocumentMeta,
    content: serde_json::Value,
}

impl GetResult {
    /// Decode the document body.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.content.clone())?)
    }

    /// Raw document body.
    pub fn content(&self) -> &serde_json::Value {
        &self.content
    }
}

/// Metadata returned alongside a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Document key as stored.
    #[serde(default)]
    pub id: String,
    /// Revision string.
    #[serde(default)]
    pub rev: Option<String>,
    /// Expiry as a Unix timestamp, `0` for none.
    #[serde(default)]
    pub expiration: Option<u64>,
    /// Common flags; `0x02000000` marks JSON.
    #[serde(default)]
    pub flags: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    meta: DocumentMeta,
    json: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PoolDetails {
    #[serde(default)]
    nodes: Vec<NodeStatus>,
}

#[derive(Debug, Deserialize)]
struct NodeStatus {
    status: String,
}
