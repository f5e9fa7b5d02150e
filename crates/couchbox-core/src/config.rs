//! Provisioning configuration.
//!
//! Credentials and resource names resolve with the precedence
//! explicit value > environment variable > hardcoded fallback:
//!
//! | Field | Variable | Fallback |
//! |-------|----------|----------|
//! | username | `COUCHBASE_USERNAME` | `Administrator` |
//! | password | `COUCHBASE_PASSWORD` | `password` |
//! | bucket | `COUCHBASE_BUCKET` | `default` |
//! | scope | `COUCHBASE_SCOPE` | `default` |
//! | collection | `COUCHBASE_COLLECTION` | `default` |
//!
//! The fallbacks exist for throwaway test containers only.

use crate::client::ClusterOptions;
use crate::error::CoreError;
use crate::readiness::ReadinessPolicy;

/// Default image reference.
pub const DEFAULT_IMAGE: &str = "couchbase:latest";

/// Management REST API port inside the container.
pub const MANAGEMENT_PORT: u16 = 8091;

/// TLS management REST API port inside the container.
pub const SECURE_MANAGEMENT_PORT: u16 = 18091;

/// Ports exposed when none are given explicitly.
pub const DEFAULT_PORTS: [u16; 18] = [
    8091, 8092, 8093, 8094, 8095, 8096, 8097, 9123, 11207, 11210, 11280, 18091, 18092, 18093,
    18094, 18095, 18096, 18097,
];

/// Fallback source for the admin username.
pub const ENV_USERNAME: &str = "COUCHBASE_USERNAME";
/// Fallback source for the admin password.
pub const ENV_PASSWORD: &str = "COUCHBASE_PASSWORD";
/// Fallback source for the bucket name.
pub const ENV_BUCKET: &str = "COUCHBASE_BUCKET";
/// Fallback source for the scope name.
pub const ENV_SCOPE: &str = "COUCHBASE_SCOPE";
/// Fallback source for the collection name.
pub const ENV_COLLECTION: &str = "COUCHBASE_COLLECTION";

/// Configuration for provisioning a Couchbase container.
///
/// Immutable once the container is started.
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    /// Image reference (default: `couchbase:latest`).
    pub image: String,
    /// Administrator username.
    pub username: String,
    /// Administrator password.
    pub password: String,
    /// Bucket to create.
    pub bucket: String,
    /// Scope to create inside the bucket.
    pub scope: String,
    /// Collection to create inside the scope.
    pub collection: String,
    /// Bucket type (default: `couchbase`).
    pub bucket_type: String,
    /// Bucket RAM quota in MB (default: 256).
    pub bucket_ram_quota_mb: u32,
    /// Collection max TTL in seconds (default: 3600).
    pub collection_max_ttl: u32,
    /// Collection history retention (default: false).
    pub collection_history: bool,
    /// Management port inside the container (default: 8091).
    pub management_port: u16,
    /// TLS management port inside the container (default: 18091).
    pub secure_management_port: u16,
    /// Container ports to expose.
    pub exposed_ports: Vec<u16>,
    /// Bind every exposed port to the same host port (default: true).
    ///
    /// SDK-style clients connect to the well-known ports on the advertised
    /// host, so random host ports would not be reachable by them.
    pub bind_ports_identically: bool,
    /// Readiness polling bounds.
    pub readiness: ReadinessPolicy,
    /// Options for client handles returned by `client()`.
    pub client: ClusterOptions,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            username: "Administrator".to_string(),
            password: "password".to_string(),
            bucket: "default".to_string(),
            scope: "default".to_string(),
            collection: "default".to_string(),
            bucket_type: "couchbase".to_string(),
            bucket_ram_quota_mb: 256,
            collection_max_ttl: 3600,
            collection_history: false,
            management_port: MANAGEMENT_PORT,
            secure_management_port: SECURE_MANAGEMENT_PORT,
            exposed_ports: DEFAULT_PORTS.to_vec(),
            bind_ports_identically: true,
            readiness: ReadinessPolicy::default(),
            client: ClusterOptions::default(),
        }
    }
}

impl ProvisioningConfig {
    /// Create a new config builder.
    pub fn builder() -> ProvisioningConfigBuilder {
        ProvisioningConfigBuilder::default()
    }

    /// Environment variables handed to the container at start.
    pub fn container_env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_USERNAME.to_string(), self.username.clone()),
            (ENV_PASSWORD.to_string(), self.password.clone()),
            (ENV_BUCKET.to_string(), self.bucket.clone()),
        ]
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        let required = [
            ("image", &self.image),
            ("username", &self.username),
            ("password", &self.password),
            ("bucket", &self.bucket),
            ("scope", &self.scope),
            ("collection", &self.collection),
            ("bucket_type", &self.bucket_type),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(CoreError::Config(format!("{name} must not be empty")));
            }
        }
        if self.bucket_ram_quota_mb == 0 {
            return Err(CoreError::Config("bucket_ram_quota_mb must be > 0".into()));
        }
        if !self.exposed_ports.contains(&self.management_port) {
            return Err(CoreError::Config(format!(
                "management port {} must be exposed",
                self.management_port
            )));
        }
        self.readiness.validate()?;
        Ok(())
    }
}

/// Builder for ProvisioningConfig.
#[derive(Debug, Default)]
pub struct ProvisioningConfigBuilder {
    image: Option<String>,
    username: Option<String>,
    password: Option<String>,
    bucket: Option<String>,
    scope: Option<String>,
    collection: Option<String>,
    bucket_type: Option<String>,
    bucket_ram_quota_mb: Option<u32>,
    collection_max_ttl: Option<u32>,
    collection_history: Option<bool>,
    exposed_ports: Option<Vec<u16>>,
    bind_ports_identically: Option<bool>,
    readiness: Option<ReadinessPolicy>,
    client: Option<ClusterOptions>,
    insecure_skip_tls_verify: Option<bool>,
}

impl ProvisioningConfigBuilder {
    /// Set the image reference.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the administrator username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the administrator password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the bucket name.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Set the scope name.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the collection name.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Set the bucket type.
    pub fn bucket_type(mut self, bucket_type: impl Into<String>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    /// Set the bucket RAM quota in MB.
    pub fn bucket_ram_quota_mb(mut self, mb: u32) -> Self {
        self.bucket_ram_quota_mb = Some(mb);
        self
    }

    /// Set the collection max TTL in seconds.
    pub fn collection_max_ttl(mut self, seconds: u32) -> Self {
        self.collection_max_ttl = Some(seconds);
        self
    }

    /// Enable or disable collection history retention.
    pub fn collection_history(mut self, enabled: bool) -> Self {
        self.collection_history = Some(enabled);
        self
    }

    /// Set the exposed ports. An empty list keeps the defaults.
    pub fn exposed_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.exposed_ports = Some(ports.into_iter().collect());
        self
    }

    /// Bind exposed ports to the same host ports, or let the runtime pick.
    pub fn bind_ports_identically(mut self, enabled: bool) -> Self {
        self.bind_ports_identically = Some(enabled);
        self
    }

    /// Set the readiness polling bounds.
    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = Some(policy);
        self
    }

    /// Set the options for client handles.
    pub fn client_options(mut self, options: ClusterOptions) -> Self {
        self.client = Some(options);
        self
    }

    /// Accept any server certificate on client handles.
    ///
    /// Off unless set. Test containers serve a self-signed certificate, so
    /// `client()` against a real container needs this turned on.
    pub fn insecure_skip_tls_verify(mut self, enabled: bool) -> Self {
        self.insecure_skip_tls_verify = Some(enabled);
        self
    }

    /// Build the configuration, falling back to process environment variables.
    pub fn build(self) -> Result<ProvisioningConfig, CoreError> {
        self.build_with_env(|key| std::env::var(key).ok())
    }

    /// Build the configuration with a custom environment lookup.
    pub fn build_with_env<F>(self, env: F) -> Result<ProvisioningConfig, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = ProvisioningConfig::default();
        let resolve = |explicit: Option<String>, key: &str, fallback: String| {
            explicit
                .filter(|v| !v.is_empty())
                .or_else(|| env(key).filter(|v| !v.is_empty()))
                .unwrap_or(fallback)
        };

        let mut exposed_ports = self
            .exposed_ports
            .filter(|ports| !ports.is_empty())
            .unwrap_or(default.exposed_ports);
        for port in [default.management_port, default.secure_management_port] {
            if !exposed_ports.contains(&port) {
                exposed_ports.push(port);
            }
        }

        let client = self.client.unwrap_or(default.client);

        let config = ProvisioningConfig {
            image: self.image.unwrap_or(default.image),
            username: resolve(self.username, ENV_USERNAME, default.username),
            password: resolve(self.password, ENV_PASSWORD, default.password),
            bucket: resolve(self.bucket, ENV_BUCKET, default.bucket),
            scope: resolve(self.scope, ENV_SCOPE, default.scope),
            collection: resolve(self.collection, ENV_COLLECTION, default.collection),
            bucket_type: self.bucket_type.unwrap_or(default.bucket_type),
            bucket_ram_quota_mb: self
                .bucket_ram_quota_mb
                .unwrap_or(default.bucket_ram_quota_mb),
            collection_max_ttl: self
                .collection_max_ttl
                .unwrap_or(default.collection_max_ttl),
            collection_history: self
                .collection_history
                .unwrap_or(default.collection_history),
            management_port: default.management_port,
            secure_management_port: default.secure_management_port,
            exposed_ports,
            bind_ports_identically: self
                .bind_ports_identically
                .unwrap_or(default.bind_ports_identically),
            readiness: self.readiness.unwrap_or(default.readiness),
            client: ClusterOptions {
                insecure_skip_tls_verify: self
                    .insecure_skip_tls_verify
                    .unwrap_or(client.insecure_skip_tls_verify),
                ..client
            },
        };
        config.validate()?;
        Ok(config)
    }
}
