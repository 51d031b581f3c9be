//! # Initialization
//!
//! Startup wiring: rustls setup, tracing, metrics registry, Kubernetes
//! client, cloud provider selection and the token manager itself.
//!
//! Everything here is fatal on failure; the process exits non-zero before
//! the sync loop starts.

use anyhow::{Context, Result};
use prometheus::Registry;
use std::sync::Arc;
use tracing::info;

use crate::cluster::KubeSecretStore;
use crate::config::Opts;
use crate::manager::TokenManager;
use crate::observability::metrics::SyncMetrics;
use crate::provider::create_cloud_provider;

/// Initialize the process and build the token manager
///
/// Returns the manager together with the metrics registry backing the
/// `/metrics` endpoint.
pub async fn initialize(opts: &Opts) -> Result<(TokenManager, Registry)> {
    // Configure rustls crypto provider first, before any other operations.
    // Required for rustls 0.23+ when no default provider is set via features.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    init_tracing(opts);

    info!(
        "starting kube-bootstrap-token-manager v{} (build {}, git {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    opts.validate().context("invalid configuration")?;

    let registry = Registry::new();
    let metrics = SyncMetrics::new(&registry).context("failed to register metrics")?;

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let cluster_store = Arc::new(KubeSecretStore::new(client, &opts.namespace));

    let cloud_provider = create_cloud_provider(opts)
        .await
        .context("failed to initialize cloud provider")?;

    let manager = TokenManager::new(opts.clone(), cloud_provider, cluster_store, metrics);
    Ok((manager, registry))
}

fn init_tracing(opts: &Opts) {
    let default_filter = if opts.debug {
        "debug"
    } else {
        "kube_bootstrap_token_manager=info,info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if opts.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}
