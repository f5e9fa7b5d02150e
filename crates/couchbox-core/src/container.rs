//! CouchbaseContainer - a provisioned Couchbase Server in a container.

use crate::bootstrap::{BootstrapSequencer, BootstrapState, Lifecycle};
use crate::client::{Cluster, PasswordAuthenticator, SECURE_SCHEME};
use crate::config::ProvisioningConfig;
use crate::error::{CoreError, Result};
use crate::management::{BucketInfo, Credentials, ManagementClient, ScopeManifest};
use crate::readiness::ReadinessPoller;
use chrono::{DateTime, Utc};
use couchbox_container::{ContainerBuilder, ContainerHandle};
use std::fmt;
use thiserror::Error;

/// A Couchbase Server container and its bootstrap lifecycle.
///
/// Provisioning consists of:
/// 1. Starting the container
/// 2. Waiting for the management endpoint
/// 3. Setting admin credentials
/// 4. Creating the bucket, scope and collection
///
/// If provisioning fails the container keeps running and this value stays
/// usable for inspection; discard it and start a new one to retry. Dropping
/// the value removes the container.
pub struct CouchbaseContainer {
    config: ProvisioningConfig,
    handle: Box<dyn ContainerHandle>,
    management: ManagementClient,
    lifecycle: Lifecycle,
    host: String,
    launched_at: DateTime<Utc>,
}

impl CouchbaseContainer {
    /// Start and fully provision a container.
    ///
    /// ```no_run
    /// use couchbox_core::{CouchbaseContainer, ProvisioningConfig};
    ///
    /// # async fn example() -> couchbox_core::Result<()> {
    /// let config = ProvisioningConfig::builder()
    ///     .bucket("travel")
    ///     .insecure_skip_tls_verify(true)
    ///     .build()?;
    /// let container = CouchbaseContainer::start(config).await?;
    ///
    /// let cluster = container.client().await?;
    /// let collection = cluster
    ///     .bucket(&container.config().bucket)
    ///     .scope(&container.config().scope)
    ///     .collection(&container.config().collection);
    /// collection.upsert("k1", &serde_json::json!({"hello": "world"})).await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// A [`StartError`] carrying the cause and, once the container was
    /// launched, the half-provisioned container itself.
    pub async fn start(config: ProvisioningConfig) -> std::result::Result<Self, StartError> {
        let container = Self::launch(config)
            .await
            .map_err(|error| StartError {
                error,
                container: None,
            })?;
        container.into_provisioned().await
    }

    /// Provision, handing the container back alongside the error on failure.
    pub async fn into_provisioned(mut self) -> std::result::Result<Self, StartError> {
        match self.provision().await {
            Ok(()) => Ok(self),
            Err(error) => {
                tracing::warn!(
                    container = %self.handle.id(),
                    state = %self.lifecycle.state(),
                    "Container left running for inspection"
                );
                Err(StartError {
                    error,
                    container: Some(Box::new(self)),
                })
            }
        }
    }

    /// Start the container without provisioning it.
    pub async fn launch(config: ProvisioningConfig) -> Result<Self> {
        config.validate()?;

        let mut lifecycle = Lifecycle::new();
        lifecycle.advance(BootstrapState::Starting)?;

        let mut builder = ContainerBuilder::new(&config.image)
            .with_exposed_ports(config.exposed_ports.iter().copied())
            .with_startup_timeout(config.readiness.deadline);
        if config.bind_ports_identically {
            builder = builder.bind_exposed_ports();
        }
        for (key, value) in config.container_env() {
            builder = builder.with_env(key, value);
        }

        let handle = match builder.build().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(image = %config.image, error = %e, "Container launch failed");
                return Err(e.into());
            }
        };

        Self::with_lifecycle(config, Box::new(handle), lifecycle).await
    }

    /// Wrap an already running container.
    pub async fn attach(
        config: ProvisioningConfig,
        handle: impl ContainerHandle + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let mut lifecycle = Lifecycle::new();
        lifecycle.advance(BootstrapState::Starting)?;
        Self::with_lifecycle(config, Box::new(handle), lifecycle).await
    }

    async fn with_lifecycle(
        config: ProvisioningConfig,
        handle: Box<dyn ContainerHandle>,
        lifecycle: Lifecycle,
    ) -> Result<Self> {
        let host = handle.host().await?;
        let port = handle.mapped_port(config.management_port).await?;
        let management = ManagementClient::new(
            format!("http://{host}:{port}"),
            Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            },
            config.readiness.request_timeout,
        )?;

        tracing::info!(
            container = %handle.id(),
            management_url = %management.base_url(),
            bucket = %config.bucket,
            "Container attached"
        );

        Ok(Self {
            config,
            handle,
            management,
            lifecycle,
            host,
            launched_at: Utc::now(),
        })
    }

    /// Wait for readiness, then run the bootstrap sequence.
    ///
    /// # Errors
    /// Returns [`CoreError::ReadinessTimeout`] if the management endpoint
    /// never answers, or [`CoreError::ProvisioningFailed`] carrying the
    /// server's response body if a bootstrap call is rejected. Calling this
    /// again after either outcome is an [`CoreError::InvalidState`].
    pub async fn provision(&mut self) -> Result<()> {
        let start = std::time::Instant::now();
        self.lifecycle.advance(BootstrapState::AwaitingReadiness)?;

        let poller = ReadinessPoller::new(self.config.readiness.clone());
        if let Err(e) = poller.await_ready(self.handle.as_ref(), &self.management).await {
            return Err(self.lifecycle.fail(None, e));
        }

        BootstrapSequencer::new(&self.config, &self.management)
            .run(&mut self.lifecycle)
            .await?;

        tracing::info!(
            container = %self.handle.id(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Container provisioned"
        );
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &BootstrapState {
        self.lifecycle.state()
    }

    /// Every lifecycle state visited so far.
    pub fn history(&self) -> &[BootstrapState] {
        self.lifecycle.history()
    }

    /// Configuration used for this container.
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Underlying container handle.
    pub fn handle(&self) -> &dyn ContainerHandle {
        self.handle.as_ref()
    }

    /// When the container was started or attached.
    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    /// Advertised connection URL (`couchbases://<host>`).
    pub fn connection_url(&self) -> String {
        format!("{SECURE_SCHEME}://{}", self.host)
    }

    /// Base URL of the management REST API.
    pub fn management_url(&self) -> &str {
        self.management.base_url()
    }

    /// Build a client handle and wait until the cluster reports ready.
    ///
    /// Every call returns a fresh, independent handle.
    pub async fn client(&self) -> Result<Cluster> {
        self.lifecycle.ensure(&BootstrapState::Ready)?;

        let port = self
            .handle
            .mapped_port(self.config.secure_management_port)
            .await?;
        let cluster = Cluster::connect(
            &self.host,
            port,
            PasswordAuthenticator::new(&self.config.username, &self.config.password),
            self.config.client.clone(),
        )?;
        cluster
            .wait_until_ready(self.config.client.ready_timeout)
            .await?;
        Ok(cluster)
    }

    /// List buckets on the server.
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.management.list_buckets().await
    }

    /// Scope/collection manifest of the configured bucket.
    pub async fn list_scopes(&self) -> Result<ScopeManifest> {
        self.management.list_scopes(&self.config.bucket).await
    }

    /// Stop the container.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!(container = %self.handle.id(), state = %self.lifecycle.state(), "Stopping Couchbase container");
        self.handle.stop().await.map_err(CoreError::from)
    }
}

impl fmt::Debug for CouchbaseContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchbaseContainer")
            .field("id", &self.handle.id())
            .field("state", self.lifecycle.state())
            .field("management_url", &self.management.base_url())
            .field("launched_at", &self.launched_at)
            .finish()
    }
}

/// Failure of [`CouchbaseContainer::start`].
///
/// The container, if it was launched, is still running. It is removed when
/// this value, or the container taken out of it, is dropped. Converting into
/// [`CoreError`] keeps only the cause.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct StartError {
    #[source]
    error: CoreError,
    container: Option<Box<CouchbaseContainer>>,
}

impl StartError {
    /// The underlying failure.
    pub fn error(&self) -> &CoreError {
        &self.error
    }

    /// The half-provisioned container, if it was launched.
    pub fn container(&self) -> Option<&CouchbaseContainer> {
        self.container.as_deref()
    }

    /// Split into the cause and the container.
    pub fn into_parts(self) -> (CoreError, Option<CouchbaseContainer>) {
        (self.error, self.container.map(|c| *c))
    }
}

impl From<StartError> for CoreError {
    fn from(err: StartError) -> Self {
        err.error
    }
}
