//! Configuration types for containers.

use crate::error::{ContainerError, Result};
use std::time::Duration;

/// Configuration for starting a new container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image name without tag (e.g. `couchbase`)
    pub image: String,
    /// Image tag (default: `latest`)
    pub tag: String,
    /// Container ports to expose
    pub exposed_ports: Vec<u16>,
    /// Fixed host bindings as `(host_port, container_port)`
    pub bound_ports: Vec<(u16, u16)>,
    /// Environment variables passed to the container
    pub env: Vec<(String, String)>,
    /// Maximum time the runtime may take to bring the container up
    pub startup_timeout: Duration,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            image: String::new(),
            tag: "latest".into(),
            exposed_ports: Vec::new(),
            bound_ports: Vec::new(),
            env: Vec::new(),
            startup_timeout: Duration::from_secs(120),
        }
    }
}

impl ContainerSpec {
    /// Create a spec for an image reference such as `couchbase:7.6.2`.
    pub fn for_image(reference: &str) -> Self {
        let (image, tag) = split_image_reference(reference);
        Self {
            image,
            tag,
            ..Default::default()
        }
    }

    /// Full image reference (`name:tag`).
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.image.is_empty() {
            return Err(ContainerError::Config("image is required".into()));
        }
        if self.tag.is_empty() {
            return Err(ContainerError::Config("image tag must not be empty".into()));
        }
        for (host, container) in &self.bound_ports {
            if !self.exposed_ports.contains(container) {
                return Err(ContainerError::Config(format!(
                    "port {container} is bound to host port {host} but not exposed"
                )));
            }
        }
        if self.startup_timeout.is_zero() {
            return Err(ContainerError::Config(
                "startup_timeout must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Split `name[:tag]` into its parts. A colon inside a registry host
/// (`localhost:5000/couchbase`) is not a tag separator.
fn split_image_reference(reference: &str) -> (String, String) {
    let last_segment_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[last_segment_start..].rfind(':') {
        Some(i) => {
            let split = last_segment_start + i;
            (
                reference[..split].to_string(),
                reference[split + 1..].to_string(),
            )
        }
        None => (reference.to_string(), "latest".to_string()),
    }
}
