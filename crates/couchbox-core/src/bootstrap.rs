//! Bootstrap lifecycle and the provisioning sequence.
//!
//! ```text
//! Created → Starting → AwaitingReadiness → SettingCredentials
//!         → CreatingBucket → CreatingScope → CreatingCollection → Ready
//! ```
//!
//! Any failure lands in `Failed`, which is terminal. There is no rollback:
//! resources created before the failure stay on the server.

use crate::config::ProvisioningConfig;
use crate::error::{CoreError, Result};
use crate::management::ManagementClient;
use std::fmt;

/// One provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapStep {
    /// `POST /settings/web` without auth.
    SetAdminCredentials,
    /// `POST /pools/default/buckets`.
    CreateBucket,
    /// `POST .../buckets/{bucket}/scopes`.
    CreateScope,
    /// `POST .../scopes/{scope}/collections`.
    CreateCollection,
}

impl BootstrapStep {
    /// All steps in execution order.
    pub const ORDER: [BootstrapStep; 4] = [
        BootstrapStep::SetAdminCredentials,
        BootstrapStep::CreateBucket,
        BootstrapStep::CreateScope,
        BootstrapStep::CreateCollection,
    ];

    /// Lifecycle state while this step runs.
    pub fn state(self) -> BootstrapState {
        match self {
            Self::SetAdminCredentials => BootstrapState::SettingCredentials,
            Self::CreateBucket => BootstrapState::CreatingBucket,
            Self::CreateScope => BootstrapState::CreatingScope,
            Self::CreateCollection => BootstrapState::CreatingCollection,
        }
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetAdminCredentials => write!(f, "set_admin_credentials"),
            Self::CreateBucket => write!(f, "create_bucket"),
            Self::CreateScope => write!(f, "create_scope"),
            Self::CreateCollection => write!(f, "create_collection"),
        }
    }
}

/// Lifecycle state of a provisioned container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing started yet.
    Created,
    /// Container is being launched.
    Starting,
    /// Waiting for the management endpoint.
    AwaitingReadiness,
    /// Setting admin credentials.
    SettingCredentials,
    /// Creating the bucket.
    CreatingBucket,
    /// Creating the scope.
    CreatingScope,
    /// Creating the collection.
    CreatingCollection,
    /// Fully provisioned.
    Ready,
    /// Terminal. `step` is `None` when readiness never completed.
    Failed {
        /// Step that was rejected
        step: Option<BootstrapStep>,
        /// Server response body, or the error text
        detail: String,
    },
}

impl BootstrapState {
    /// Position in the happy path, `None` for `Failed`.
    fn rank(&self) -> Option<u8> {
        Some(match self {
            Self::Created => 0,
            Self::Starting => 1,
            Self::AwaitingReadiness => 2,
            Self::SettingCredentials => 3,
            Self::CreatingBucket => 4,
            Self::CreatingScope => 5,
            Self::CreatingCollection => 6,
            Self::Ready => 7,
            Self::Failed { .. } => return None,
        })
    }

    /// True for `Ready` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed { .. })
    }

    /// True if the state is `Failed`.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Starting => write!(f, "Starting"),
            Self::AwaitingReadiness => write!(f, "AwaitingReadiness"),
            Self::SettingCredentials => write!(f, "SettingCredentials"),
            Self::CreatingBucket => write!(f, "CreatingBucket"),
            Self::CreatingScope => write!(f, "CreatingScope"),
            Self::CreatingCollection => write!(f, "CreatingCollection"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed { step: Some(step), .. } => write!(f, "Failed({step})"),
            Self::Failed { step: None, .. } => write!(f, "Failed"),
        }
    }
}

/// State machine guarding the bootstrap order.
///
/// Only single forward steps are accepted; `Failed` is reachable from any
/// non-terminal state and nothing leaves a terminal state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: BootstrapState,
    history: Vec<BootstrapState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start in `Created`.
    pub fn new() -> Self {
        Self {
            state: BootstrapState::Created,
            history: vec![BootstrapState::Created],
        }
    }

    /// Current state.
    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    /// Every state visited, in order, current state last.
    pub fn history(&self) -> &[BootstrapState] {
        &self.history
    }

    /// Move to the next state.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidState`] for anything but a single step
    /// forward, or a failure from a non-terminal state.
    pub fn advance(&mut self, next: BootstrapState) -> Result<()> {
        let allowed = match (self.state.rank(), next.rank()) {
            (Some(_), None) => !self.state.is_terminal(),
            (Some(from), Some(to)) => to == from + 1,
            (None, _) => false,
        };
        if !allowed {
            return Err(CoreError::InvalidState {
                expected: format!("successor of {}", self.state),
                actual: next.to_string(),
            });
        }
        tracing::trace!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next.clone();
        self.history.push(next);
        Ok(())
    }

    /// Record `error` as the terminal failure and hand it back.
    pub fn fail(&mut self, step: Option<BootstrapStep>, error: CoreError) -> CoreError {
        let detail = match &error {
            CoreError::ProvisioningFailed { body, .. } => body.clone(),
            other => other.to_string(),
        };
        if self
            .advance(BootstrapState::Failed { step, detail })
            .is_err()
        {
            tracing::warn!(state = %self.state, "Failure reported in terminal state");
        }
        error
    }

    /// Ensure the lifecycle sits in `expected`.
    pub fn ensure(&self, expected: &BootstrapState) -> Result<()> {
        if &self.state != expected {
            return Err(CoreError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }
}

/// Issues the ordered provisioning calls.
///
/// Admin credentials, then bucket, scope and collection, each only after
/// the previous one succeeded. No retries at this layer.
pub struct BootstrapSequencer<'a> {
    config: &'a ProvisioningConfig,
    management: &'a ManagementClient,
}

impl<'a> BootstrapSequencer<'a> {
    /// Create a sequencer for one provisioning run.
    pub fn new(config: &'a ProvisioningConfig, management: &'a ManagementClient) -> Self {
        Self { config, management }
    }

    /// Run every step, starting from `AwaitingReadiness`.
    ///
    /// On success the lifecycle ends in `Ready`. On the first failure it
    /// ends in `Failed { step, detail }` and the error is returned; later
    /// steps are never issued.
    pub async fn run(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        lifecycle.ensure(&BootstrapState::AwaitingReadiness)?;
        let start = std::time::Instant::now();

        for step in BootstrapStep::ORDER {
            lifecycle.advance(step.state())?;
            if let Err(e) = self.execute(step).await {
                tracing::error!(
                    %step,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "Bootstrap aborted"
                );
                return Err(lifecycle.fail(Some(step), e));
            }
        }

        lifecycle.advance(BootstrapState::Ready)?;
        tracing::info!(
            bucket = %self.config.bucket,
            scope = %self.config.scope,
            collection = %self.config.collection,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Bootstrap complete"
        );
        Ok(())
    }

    async fn execute(&self, step: BootstrapStep) -> Result<()> {
        let config = self.config;
        match step {
            BootstrapStep::SetAdminCredentials => self.management.set_admin_credentials().await,
            BootstrapStep::CreateBucket => {
                self.management
                    .create_bucket(&config.bucket, &config.bucket_type, config.bucket_ram_quota_mb)
                    .await
            }
            BootstrapStep::CreateScope => {
                self.management
                    .create_scope(&config.bucket, &config.scope)
                    .await
            }
            BootstrapStep::CreateCollection => {
                self.management
                    .create_collection(
                        &config.bucket,
                        &config.scope,
                        &config.collection,
                        config.collection_max_ttl,
                        config.collection_history,
                    )
                    .await
            }
        }
    }
}
