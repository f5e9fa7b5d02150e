//! Builder pattern for ergonomic container configuration.

use crate::config::ContainerSpec;
use crate::error::Result;
use crate::DockerContainer;
use std::time::Duration;

/// Fluent builder for configuring and starting containers.
///
/// # Example
///
/// ```no_run
/// use couchbox_container::ContainerBuilder;
///
/// # async fn example() -> couchbox_container::Result<()> {
/// let container = ContainerBuilder::new("couchbase:7.6.2")
///     .with_exposed_ports([8091, 11210])
///     .bind_exposed_ports()
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    spec: ContainerSpec,
}

impl ContainerBuilder {
    /// Create a new builder for an image reference (`name[:tag]`).
    pub fn new(image: &str) -> Self {
        Self {
            spec: ContainerSpec::for_image(image),
        }
    }

    /// Expose a container port. Duplicates are ignored.
    pub fn with_exposed_port(mut self, port: u16) -> Self {
        if !self.spec.exposed_ports.contains(&port) {
            self.spec.exposed_ports.push(port);
        }
        self
    }

    /// Expose several container ports.
    pub fn with_exposed_ports(self, ports: impl IntoIterator<Item = u16>) -> Self {
        ports
            .into_iter()
            .fold(self, |builder, port| builder.with_exposed_port(port))
    }

    /// Bind a container port to a fixed host port.
    pub fn with_bound_port(mut self, host_port: u16, container_port: u16) -> Self {
        self.spec.bound_ports.push((host_port, container_port));
        self
    }

    /// Bind every exposed port to the same port number on the host.
    pub fn bind_exposed_ports(mut self) -> Self {
        self.spec.bound_ports = self
            .spec
            .exposed_ports
            .iter()
            .map(|port| (*port, *port))
            .collect();
        self
    }

    /// Set an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.env.push((key.into(), value.into()));
        self
    }

    /// Set the maximum time the runtime may take to start the container.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.spec.startup_timeout = timeout;
        self
    }

    /// Build and return the configuration without starting a container.
    ///
    /// Useful for testing or inspecting the configuration.
    pub fn build_spec(self) -> ContainerSpec {
        self.spec
    }

    /// Build and start the container.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or startup fails.
    pub async fn build(self) -> Result<DockerContainer> {
        DockerContainer::start(self.spec).await
    }
}
