//! couchbox entry point.
//!
//! Starts a provisioned Couchbase Server container, prints its connection
//! details on stdout and holds it until Ctrl-C.

mod config;

use config::CliConfig;
use couchbox_core::CouchbaseContainer;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the connection details
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("couchbox=info".parse()?)
                .add_directive("couchbox_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = CliConfig::from_env();
    tracing::info!(?cli, "Configuration loaded");

    let config = cli.provisioning()?;
    let mut container = match CouchbaseContainer::start(config).await {
        Ok(container) => container,
        Err(err) => {
            let (cause, container) = err.into_parts();
            if let Some(container) = container.filter(|_| cli.keep_running) {
                // Keep the half-provisioned server up for inspection
                tracing::error!(error = %cause, state = %container.state(), "Provisioning failed");
                println!("management_url={}", container.management_url());
                println!("state={}", container.state());
                signal::ctrl_c().await?;
            }
            return Err(cause.into());
        }
    };

    let buckets = container.list_buckets().await?;
    let config = container.config();
    println!("connection_url={}", container.connection_url());
    println!("management_url={}", container.management_url());
    println!("username={}", config.username);
    println!("bucket={}", config.bucket);
    println!("scope={}", config.scope);
    println!("collection={}", config.collection);
    println!(
        "buckets={}",
        buckets
            .iter()
            .map(|b| b.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    if cli.keep_running {
        tracing::info!(container = %container.handle().id(), "Container ready, press Ctrl-C to stop");
        signal::ctrl_c().await?;
        tracing::info!("Received shutdown signal, cleaning up...");
    }

    container.stop().await?;
    tracing::info!("Container stopped");
    Ok(())
}
