//! # Kubernetes Bootstrap Token Manager
//!
//! Keeps exactly one current bootstrap token in sync between the cluster and
//! a cloud-hosted secret store (Azure Key Vault), rotating it before expiry.
//!
//! One sync cycle fetches the current cloud token, decides rotation against
//! the recreate-before window, mints and pushes a replacement when needed and
//! mirrors the token into a `v1/Secret` in the configured namespace.

use anyhow::Result;
use clap::Parser;
use tracing::error;

use kube_bootstrap_token_manager::config::Opts;
use kube_bootstrap_token_manager::runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    let (manager, registry) = runtime::initialization::initialize(&opts).await?;

    // HTTP server for metrics and probes runs alongside the sync loop
    let bind = opts.server_bind.clone();
    tokio::spawn(async move {
        if let Err(err) = runtime::server::start_server(&bind, registry).await {
            error!("http server error: {err:#}");
            std::process::exit(1);
        }
    });

    manager.run().await
}
