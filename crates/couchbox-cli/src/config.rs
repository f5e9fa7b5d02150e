//! Configuration for the couchbox binary.
//!
//! Configuration is loaded from environment variables with sensible defaults.
//! Credentials and resource names come from the `COUCHBASE_*` variables
//! resolved by [`couchbox_core::ProvisioningConfig`].

use couchbox_core::{CoreError, ProvisioningConfig, ReadinessPolicy, DEFAULT_IMAGE};
use std::time::Duration;

/// Default readiness deadline in seconds.
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 120;

/// Configuration for the couchbox binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Image reference to run.
    pub image: String,

    /// Readiness deadline (default: 120 seconds).
    pub ready_timeout: Duration,

    /// Hold the container until Ctrl-C (default: true).
    pub keep_running: bool,

    /// Bind exposed ports to the same host ports (default: true).
    pub bind_ports: bool,

    /// Accept the server's self-signed certificate (default: false).
    pub insecure_skip_tls_verify: bool,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("image reference must not be empty")]
    EmptyImage,

    #[error("ready timeout must be greater than zero")]
    ZeroReadyTimeout,

    #[error(transparent)]
    Provisioning(#[from] CoreError),
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
            keep_running: true,
            bind_ports: true,
            insecure_skip_tls_verify: false,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `COUCHBOX_IMAGE` | `couchbase:latest` |
    /// | `COUCHBOX_READY_TIMEOUT_SECS` | `120` |
    /// | `COUCHBOX_KEEP_RUNNING` | `true` |
    /// | `COUCHBOX_BIND_PORTS` | `true` |
    /// | `COUCHBOX_INSECURE_SKIP_TLS_VERIFY` | `false` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a custom variable lookup.
    pub fn from_lookup<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let flag = |key: &str, fallback: bool| {
            env(key)
                .map(|v| v != "false" && v != "0")
                .unwrap_or(fallback)
        };

        Self {
            image: env("COUCHBOX_IMAGE")
                .filter(|v| !v.is_empty())
                .unwrap_or(default.image),
            ready_timeout: env("COUCHBOX_READY_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.ready_timeout),
            keep_running: flag("COUCHBOX_KEEP_RUNNING", default.keep_running),
            bind_ports: flag("COUCHBOX_BIND_PORTS", default.bind_ports),
            insecure_skip_tls_verify: flag(
                "COUCHBOX_INSECURE_SKIP_TLS_VERIFY",
                default.insecure_skip_tls_verify,
            ),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::EmptyImage);
        }
        if self.ready_timeout.is_zero() {
            return Err(ConfigError::ZeroReadyTimeout);
        }
        Ok(())
    }

    /// Resolve the provisioning configuration, reading `COUCHBASE_*` variables.
    pub fn provisioning(&self) -> Result<ProvisioningConfig, ConfigError> {
        self.validate()?;
        let config = ProvisioningConfig::builder()
            .image(&self.image)
            .bind_ports_identically(self.bind_ports)
            .insecure_skip_tls_verify(self.insecure_skip_tls_verify)
            .readiness(ReadinessPolicy {
                deadline: self.ready_timeout,
                ..ReadinessPolicy::default()
            })
            .build()?;
        Ok(config)
    }
}
