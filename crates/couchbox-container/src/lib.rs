//! # couchbox-container
//!
//! Container runtime layer for couchbox.
//! Provides a small abstraction over testcontainers/Docker.
//!
//! ## Quick Start
//!
//! ```no_run
//! use couchbox_container::{ContainerBuilder, ContainerHandle};
//! use std::time::Duration;
//!
//! # async fn example() -> couchbox_container::Result<()> {
//! // Start a container using the builder pattern
//! let mut container = ContainerBuilder::new("couchbase:latest")
//!     .with_exposed_port(8091)
//!     .with_bound_port(8091, 8091)
//!     .with_env("COUCHBASE_USERNAME", "Administrator")
//!     .build()
//!     .await?;
//!
//! // Block until the server announces itself
//! container
//!     .wait_for_log("and logs available in", Duration::from_secs(60))
//!     .await?;
//!
//! let port = container.mapped_port(8091).await?;
//! println!("management API on {}:{}", container.host().await?, port);
//!
//! // Cleanup
//! container.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Lifecycle Management**: Start and stop containers
//! - **Port Mapping**: Exposed ports, optionally bound to fixed host ports
//! - **Log Waiting**: Block until a marker line shows up on stdout
//! - **Runtime Seam**: [`ContainerHandle`] lets callers swap in a fake runtime

mod builder;
mod config;
mod docker;
mod error;
mod handle;

pub use builder::ContainerBuilder;
pub use config::ContainerSpec;
pub use docker::{ContainerState, DockerContainer};
pub use error::{ContainerError, Result};
pub use handle::ContainerHandle;
