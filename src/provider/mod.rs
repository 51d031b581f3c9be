//! # Cloud Provider
//!
//! Contract for the durable cloud-side store of the authoritative token
//! history, plus the startup factory selecting the configured backend.
//!
//! Providers translate their own error signals into [`ProviderError`] before
//! returning; the manager never inspects provider-specific error shapes.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::Opts;
use crate::token::BootstrapToken;

pub mod azure;

/// Maximum number of historical token versions considered during a full sync
pub const SECRET_SYNC_COUNT_MAX: usize = 15;

/// Cloud provider error taxonomy
///
/// "Not found" and "disabled" are not errors; `fetch_token` reports them as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authorization/forbidden response from the secret store. Hard failure,
    /// must not be confused with "no token yet".
    #[error("access to the cloud secret store denied: {0}")]
    PolicyDenied(String),

    /// Any other provider failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Durable store of the authoritative token history
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Fetch the single most current valid token, `None` when absent or disabled
    async fn fetch_token(&self) -> Result<Option<BootstrapToken>, ProviderError>;

    /// Fetch historically valid tokens: enabled, activation time reached, not
    /// expired; newest creation time first; at most [`SECRET_SYNC_COUNT_MAX`]
    async fn fetch_tokens(&self) -> Result<Vec<BootstrapToken>, ProviderError>;

    /// Persist the authoritative current token with its creation and
    /// expiration metadata
    async fn store_token(&self, token: &BootstrapToken) -> Result<(), ProviderError>;
}

/// Construct the configured cloud provider backend
///
/// An unknown provider name is a startup-time configuration error.
pub async fn create_cloud_provider(opts: &Opts) -> Result<Arc<dyn CloudProvider>> {
    info!("using cloud provider \"{}\"", opts.cloud_provider);
    match opts.cloud_provider.to_lowercase().as_str() {
        "azure" => Ok(Arc::new(azure::key_vault::AzureKeyVault::new(opts).await?)),
        other => bail!("cloud provider \"{other}\" not available"),
    }
}
