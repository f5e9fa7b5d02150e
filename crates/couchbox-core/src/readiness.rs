//! Readiness polling for the management endpoint.
//!
//! Readiness is two-phase: the server's startup banner on the container log,
//! then a 2xx from `GET /settings/web`. Both phases share one deadline.

use crate::error::{CoreError, Result};
use crate::management::ManagementClient;
use couchbox_container::ContainerHandle;
use std::time::{Duration, Instant};

/// Log line fragment printed once the server process is up.
pub const STARTUP_LOG_MARKER: &str = "and logs available in";

/// Bounds for readiness polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Log fragment to wait for before probing.
    pub log_marker: String,
    /// Pause between readiness checks (default: 1 second).
    pub interval: Duration,
    /// Overall bound for log wait plus probing (default: 120 seconds).
    pub deadline: Duration,
    /// Optional cap on readiness attempts.
    pub max_attempts: Option<u32>,
    /// Timeout for a single readiness request (default: 5 seconds).
    pub request_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            log_marker: STARTUP_LOG_MARKER.to_string(),
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(120),
            max_attempts: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ReadinessPolicy {
    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if self.deadline.is_zero() {
            return Err(CoreError::Config("readiness deadline must be > 0".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(CoreError::Config(
                "readiness request_timeout must be > 0".into(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(CoreError::Config(
                "readiness max_attempts must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Blocks until the management endpoint answers with 2xx.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    policy: ReadinessPolicy,
}

impl ReadinessPoller {
    /// Create a poller with the given bounds.
    pub fn new(policy: ReadinessPolicy) -> Self {
        Self { policy }
    }

    /// The bounds this poller enforces.
    pub fn policy(&self) -> &ReadinessPolicy {
        &self.policy
    }

    /// Wait for the startup log marker, then poll until a 2xx response.
    ///
    /// Connection errors and non-2xx responses are retried every
    /// `interval`. Hitting the deadline or the attempt cap returns
    /// [`CoreError::ReadinessTimeout`].
    pub async fn await_ready(
        &self,
        handle: &dyn ContainerHandle,
        management: &ManagementClient,
    ) -> Result<()> {
        let start = Instant::now();
        tracing::debug!(
            container = %handle.id(),
            marker = %self.policy.log_marker,
            deadline_ms = self.policy.deadline.as_millis() as u64,
            "Waiting for startup log marker"
        );

        match handle
            .wait_for_log(&self.policy.log_marker, self.policy.deadline)
            .await
        {
            Ok(()) => {}
            Err(couchbox_container::ContainerError::LogTimeout { .. }) => {
                tracing::warn!(container = %handle.id(), "Startup log marker never seen");
                return Err(CoreError::ReadinessTimeout {
                    attempts: 0,
                    elapsed: start.elapsed(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.poll(management, start).await
    }

    /// Poll the settings endpoint until it answers 2xx.
    ///
    /// `start` is the instant the deadline is measured from. A request never
    /// outlives the deadline, whatever the per-request timeout.
    pub async fn poll(&self, management: &ManagementClient, start: Instant) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let remaining = self.policy.deadline.saturating_sub(start.elapsed());
            match tokio::time::timeout(remaining, management.check_settings()).await {
                Err(_) => {
                    tracing::trace!(
                        attempt = attempts,
                        ?remaining,
                        "Readiness request cut off at deadline"
                    );
                }
                Ok(Ok(status)) if status.is_success() => {
                    tracing::info!(
                        url = %management.base_url(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        attempts,
                        "Management endpoint ready"
                    );
                    return Ok(());
                }
                Ok(Ok(status)) => {
                    tracing::trace!(status = status.as_u16(), attempt = attempts, "Not ready yet");
                }
                Ok(Err(e)) => {
                    tracing::trace!(
                        error = %e,
                        attempt = attempts,
                        "Readiness check failed, retrying..."
                    );
                }
            }

            let exhausted = self.policy.max_attempts.is_some_and(|max| attempts >= max);
            if exhausted || start.elapsed() + self.policy.interval > self.policy.deadline {
                tracing::warn!(
                    url = %management.base_url(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    attempts,
                    "Readiness timeout"
                );
                return Err(CoreError::ReadinessTimeout {
                    attempts,
                    elapsed: start.elapsed(),
                });
            }
            tokio::time::sleep(self.policy.interval).await;
        }
    }
}
