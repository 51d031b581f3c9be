//! # Token Manager
//!
//! Orchestrates the reconciliation of the bootstrap token between the cloud
//! secret store and the cluster.
//!
//! Cycles are strictly sequential: a new cycle begins only after the previous
//! one (including its upsert retry sub-loop) has fully completed. An optional
//! one-shot full-sync pass runs before the timer loop starts.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info};

use crate::cluster::ClusterStore;
use crate::config::Opts;
use crate::observability::metrics::SyncMetrics;
use crate::provider::CloudProvider;

mod reconcile;

pub use reconcile::expand_name_template;

/// The bootstrap token manager
pub struct TokenManager {
    opts: Opts,
    cloud_provider: Arc<dyn CloudProvider>,
    cluster_store: Arc<dyn ClusterStore>,
    metrics: SyncMetrics,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("namespace", &self.opts.namespace)
            .field("dry_run", &self.opts.dry_run)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(
        opts: Opts,
        cloud_provider: Arc<dyn CloudProvider>,
        cluster_store: Arc<dyn ClusterStore>,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            opts,
            cloud_provider,
            cluster_store,
            metrics,
        }
    }

    /// Run the sync loop forever
    ///
    /// A failed cycle is logged and reflected in the sync status metric;
    /// execution resumes after the sleep interval.
    pub async fn run(&self) -> ! {
        if self.opts.sync_full {
            info!("starting full sync run");
            if let Err(err) = self.sync_run_full().await {
                error!("full sync run failed: {err:#}");
                self.metrics.record_sync_failure();
            }
        }

        loop {
            info!("starting sync run");
            match self.sync_run().await {
                Ok(()) => self.metrics.record_sync_success(),
                Err(err) => {
                    error!("sync run failed: {err:#}");
                    self.metrics.record_sync_failure();
                }
            }
            sleep(self.opts.sync_interval()).await;
        }
    }
}
