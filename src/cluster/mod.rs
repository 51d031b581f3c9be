//! # Cluster Store
//!
//! Contract for the cluster-local representation of the bootstrap token: a
//! `v1/Secret` in the configured namespace.
//!
//! The kube-backed implementation translates Kubernetes API errors into the
//! [`ClusterError`] taxonomy so the manager only ever matches on error
//! classes, never on transport-specific shapes.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;

mod kube_store;

pub use kube_store::KubeSecretStore;

/// Cluster store error taxonomy
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The resource does not exist; upsert reacts by creating it
    #[error("secret \"{0}\" not found")]
    NotFound(String),

    /// Conflict, timeout or server-busy failure; the upsert protocol retries
    /// these up to its attempt budget
    #[error("retryable cluster API failure: {0}")]
    Retryable(#[source] kube::Error),

    /// Any other cluster API failure; aborts the cycle
    #[error(transparent)]
    Other(#[from] kube::Error),
}

impl ClusterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClusterError::Retryable(_))
    }
}

/// The cluster-side secret store consumers read
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Secret, ClusterError>;
    async fn create(&self, resource: &Secret) -> Result<Secret, ClusterError>;
    async fn update(&self, resource: &Secret) -> Result<Secret, ClusterError>;
}
