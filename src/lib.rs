//! Kubernetes bootstrap token manager library.
//!
//! Keeps exactly one current bootstrap token in sync between the cluster and
//! a cloud-hosted secret store, rotating it before expiry.

pub mod cluster;
pub mod config;
pub mod constants;
pub mod manager;
pub mod observability;
pub mod provider;
pub mod runtime;
pub mod token;
