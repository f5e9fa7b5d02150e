//! # couchbox-core
//!
//! Ephemeral Couchbase Server containers for integration tests.
//!
//! This crate starts a container, waits until the management API answers,
//! bootstraps admin credentials, creates a bucket/scope/collection and
//! hands back a ready client handle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      couchbox-core                       │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌────────────────────┐    ┌──────────────────────────┐  │
//! │  │ CouchbaseContainer │───▶│ ContainerHandle          │  │
//! │  │  - start()         │    │ (from couchbox-container)│  │
//! │  │  - client()        │    └──────────────────────────┘  │
//! │  │  - list_buckets()  │                                  │
//! │  └────────────────────┘                                  │
//! │     │            │                                       │
//! │     ▼            ▼                                       │
//! │  ┌──────────────────┐  ┌──────────────────────┐          │
//! │  │ ReadinessPoller  │─▶│ BootstrapSequencer   │          │
//! │  │ GET /settings/web│  │ creds→bucket→scope→  │          │
//! │  └──────────────────┘  │ collection           │          │
//! │           │            └──────────────────────┘          │
//! │           ▼                       │                      │
//! │  ┌──────────────────────────────────────────┐            │
//! │  │ ManagementClient (HTTP :8091)            │            │
//! │  └──────────────────────────────────────────┘            │
//! │                                                          │
//! │  ┌──────────────────────────────────────────┐            │
//! │  │ Cluster → Bucket → Scope → Collection    │ HTTPS      │
//! │  │ upsert / get / remove                    │ :18091     │
//! │  └──────────────────────────────────────────┘            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use couchbox_core::{CouchbaseContainer, ProvisioningConfig};
//!
//! # async fn example() -> couchbox_core::Result<()> {
//! let config = ProvisioningConfig::builder()
//!     .username("administrator")
//!     .password("password")
//!     .insecure_skip_tls_verify(true)
//!     .build()?;
//!
//! let container = CouchbaseContainer::start(config).await?;
//! assert!(container.connection_url().starts_with("couchbases://"));
//!
//! let cluster = container.client().await?;
//! let collection = cluster.bucket("default").scope("default").collection("default");
//! collection.upsert("k1", &serde_json::json!({"hello": "world"})).await?;
//!
//! let doc: serde_json::Value = collection.get("k1").await?.content_as()?;
//! assert_eq!(doc["hello"], "world");
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Bounded Readiness**: Log marker plus endpoint polling under one deadline
//! - **Ordered Bootstrap**: Explicit state machine, stops at the first rejected call
//! - **Env Fallbacks**: `COUCHBASE_*` variables fill in unset credentials and names
//! - **Inspection**: Bucket and scope listings for test assertions

mod bootstrap;
mod client;
mod config;
mod container;
mod error;
mod management;
mod readiness;

pub use bootstrap::{BootstrapSequencer, BootstrapState, BootstrapStep, Lifecycle};
pub use client::{
    Bucket, Cluster, ClusterOptions, Collection, DocumentMeta, EndpointScheme, GetResult,
    PasswordAuthenticator, Scope, SECURE_SCHEME,
};
pub use config::{
    ProvisioningConfig, ProvisioningConfigBuilder, DEFAULT_IMAGE, DEFAULT_PORTS, ENV_BUCKET,
    ENV_COLLECTION, ENV_PASSWORD, ENV_SCOPE, ENV_USERNAME, MANAGEMENT_PORT,
    SECURE_MANAGEMENT_PORT,
};
pub use container::{CouchbaseContainer, StartError};
pub use error::{CoreError, Result};
pub use management::{
    BucketInfo, CollectionInfo, Credentials, ManagementClient, ScopeInfo, ScopeManifest,
};
pub use readiness::{ReadinessPolicy, ReadinessPoller, STARTUP_LOG_MARKER};
