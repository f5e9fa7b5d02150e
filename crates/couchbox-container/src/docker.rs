//! DockerContainer type - a container started through testcontainers.

use crate::config::ContainerSpec;
use crate::error::{ContainerError, Result};
use crate::handle::ContainerHandle;
use async_trait::async_trait;
use std::time::Duration;
use testcontainers::core::ContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::io::AsyncBufReadExt;

/// Represents a running or stopped Docker container.
pub struct DockerContainer {
    /// Configuration used to start this container
    spec: ContainerSpec,
    /// Current state of the container
    state: ContainerState,
    /// Underlying testcontainers handle
    inner: ContainerAsync<GenericImage>,
}

/// Current state of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Container is running
    Running,
    /// Container is stopped
    Stopped,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Running => write!(f, "running"),
            ContainerState::Stopped => write!(f, "stopped"),
        }
    }
}

impl DockerContainer {
    /// Pull (if needed) and start a container with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the runtime
    /// fails to start the container.
    pub async fn start(spec: ContainerSpec) -> Result<Self> {
        spec.validate()?;

        let start = std::time::Instant::now();
        tracing::info!(
            image = %spec.reference(),
            exposed = spec.exposed_ports.len(),
            bound = spec.bound_ports.len(),
            "Starting container"
        );

        let mut image = GenericImage::new(spec.image.clone(), spec.tag.clone());
        for port in &spec.exposed_ports {
            image = image.with_exposed_port(ContainerPort::Tcp(*port));
        }

        let mut request = image.with_startup_timeout(spec.startup_timeout);
        for (host_port, container_port) in &spec.bound_ports {
            request = request.with_mapped_port(*host_port, ContainerPort::Tcp(*container_port));
        }
        for (key, value) in &spec.env {
            request = request.with_env_var(key.clone(), value.clone());
        }

        let inner = request.start().await.map_err(|e| {
            tracing::error!(image = %spec.reference(), error = %e, "Container start failed");
            ContainerError::Runtime(format!("start failed: {e}"))
        })?;

        tracing::info!(
            id = %inner.id(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Container started"
        );

        Ok(Self {
            spec,
            state: ContainerState::Running,
            inner,
        })
    }

    /// Get the current state of the container.
    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Get the configuration used to start this container.
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state != ContainerState::Running {
            return Err(ContainerError::InvalidState {
                expected: ContainerState::Running.to_string(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerHandle for DockerContainer {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn host(&self) -> Result<String> {
        let host = self
            .inner
            .get_host()
            .await
            .map_err(|e| ContainerError::Runtime(format!("host lookup failed: {e}")))?;
        Ok(host.to_string())
    }

    async fn mapped_port(&self, internal_port: u16) -> Result<u16> {
        self.ensure_running()?;
        self.inner
            .get_host_port_ipv4(ContainerPort::Tcp(internal_port))
            .await
            .map_err(|e| {
                ContainerError::Runtime(format!("port {internal_port} is not mapped: {e}"))
            })
    }

    async fn wait_for_log(&self, marker: &str, timeout: Duration) -> Result<()> {
        self.ensure_running()?;
        let start = std::time::Instant::now();
        tracing::debug!(id = %self.id(), marker, ?timeout, "Waiting for log marker");

        let mut lines = self.inner.stdout(true).lines();
        let search = async {
            while let Some(line) = lines.next_line().await? {
                tracing::trace!(line = %line, "container log");
                if line.contains(marker) {
                    return Ok(true);
                }
            }
            Ok::<bool, std::io::Error>(false)
        };

        match tokio::time::timeout(timeout, search).await {
            Ok(Ok(true)) => {
                tracing::debug!(
                    id = %self.id(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Log marker seen"
                );
                Ok(())
            }
            Ok(Ok(false)) => Err(ContainerError::LogStreamClosed {
                marker: marker.to_string(),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!(id = %self.id(), marker, ?timeout, "Log marker timeout");
                Err(ContainerError::LogTimeout {
                    marker: marker.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.ensure_running()?;
        tracing::info!(id = %self.id(), "Stopping container");

        self.inner
            .stop()
            .await
            .map_err(|e| ContainerError::Runtime(format!("stop failed: {e}")))?;

        self.state = ContainerState::Stopped;
        Ok(())
    }
}
