//! The container runtime seam.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A started container as seen by the provisioning code.
///
/// [`DockerContainer`](crate::DockerContainer) is the real implementation;
/// tests plug in fakes that point at an in-process server.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    /// Runtime identifier of the container.
    fn id(&self) -> &str;

    /// Host address the container's ports are reachable on.
    async fn host(&self) -> Result<String>;

    /// Host port mapped to the given container port.
    async fn mapped_port(&self, internal_port: u16) -> Result<u16>;

    /// Block until a log line containing `marker` shows up, or `timeout` elapses.
    async fn wait_for_log(&self, marker: &str, timeout: Duration) -> Result<()>;

    /// Stop the container.
    async fn stop(&mut self) -> Result<()>;
}
