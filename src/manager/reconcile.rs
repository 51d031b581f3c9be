//! # Reconciliation Cycle
//!
//! One cycle: fetch the current cloud token, decide rotation, mint or keep,
//! upsert the cluster secret (bounded retry), push to the cloud store when a
//! new token was minted, report the outcome.
//!
//! There is no partial commit: when the cluster upsert fails, the cloud push
//! never happens.

use anyhow::{Context, Result};
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::TokenManager;
use crate::cluster::ClusterError;
use crate::constants::UPSERT_RETRY_ATTEMPTS;
use crate::token::renewal::should_renew;
use crate::token::{generator, BootstrapToken};

/// Expand the cluster resource name template; `{id}` is the token id
pub fn expand_name_template(template: &str, token_id: &str) -> String {
    template.replace("{id}", token_id)
}

impl TokenManager {
    /// One incremental sync cycle
    pub async fn sync_run(&self) -> Result<()> {
        match self.cloud_provider.fetch_token().await? {
            Some(token) => {
                info!(
                    "found cloud token with id \"{}\" and expiration {}",
                    token.id(),
                    token.expiration_string()
                );
                if should_renew(
                    Some(&token),
                    Utc::now(),
                    self.opts.recreate_before(),
                    self.opts.token_expiration().is_some(),
                ) {
                    info!("token is not valid or going to expire, starting renewal of token");
                    self.create_new_token().await
                } else {
                    info!("valid cloud token, syncing to cluster");
                    self.create_or_update_token(&token, false).await
                }
            }
            None => {
                info!("no cloud token found, creating new one");
                self.create_new_token().await
            }
        }
    }

    /// One-shot full sync: mirror historically valid cloud tokens into the
    /// cluster; never push back to the cloud
    pub async fn sync_run_full(&self) -> Result<()> {
        for token in self.cloud_provider.fetch_tokens().await? {
            info!(
                "found cloud token with id \"{}\" and expiration {}",
                token.id(),
                token.expiration_string()
            );
            if should_renew(
                Some(&token),
                Utc::now(),
                self.opts.recreate_before(),
                self.opts.token_expiration().is_some(),
            ) {
                // a newer cycle will mint the replacement
                debug!("token \"{}\" fails the renewal check, skipping", token.id());
                continue;
            }
            info!("valid cloud token, syncing to cluster");
            self.create_or_update_token(&token, false).await?;
        }
        Ok(())
    }

    /// Mint a new token, upsert it into the cluster, push it to the cloud
    async fn create_new_token(&self) -> Result<()> {
        let now = Utc::now();
        let id = generator::expand_id_template(&self.opts.token_id_template, now)?;
        let secret = generator::generate_secret(self.opts.token_length, &self.opts.token_alphabet)?;

        let mut token = BootstrapToken::new(id, secret);
        token.set_creation_time(now);
        if let Some(expiration) = self.opts.token_expiration() {
            token.set_expiration_time(now + expiration);
        }

        self.create_or_update_token(&token, true).await
    }

    /// Idempotent upsert of the cluster secret, optionally followed by the
    /// cloud push
    ///
    /// Retryable cluster failures (conflict, timeout, server-busy) retry the
    /// whole read-populate-write sequence up to the attempt budget; the cloud
    /// push is not retried here.
    pub(super) async fn create_or_update_token(
        &self,
        token: &BootstrapToken,
        sync_to_cloud: bool,
    ) -> Result<()> {
        let resource_name = expand_name_template(&self.opts.token_name_template, token.id());

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_upsert(&resource_name, token).await {
                Ok(()) => break,
                Err(err) if err.is_retryable() && attempt < UPSERT_RETRY_ATTEMPTS => {
                    warn!(
                        "upsert of \"{}\" failed (attempt {}/{}): {}",
                        resource_name, attempt, UPSERT_RETRY_ATTEMPTS, err
                    );
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to upsert bootstrap token secret \"{resource_name}\"")
                    });
                }
            }
        }

        if sync_to_cloud {
            if self.opts.dry_run {
                info!("dry-run: not storing token \"{}\" to cloud", token.id());
            } else {
                self.cloud_provider.store_token(token).await?;
            }
        } else {
            debug!("not syncing token to cloud, not needed");
        }

        self.metrics.record_token(token);
        Ok(())
    }

    /// One read-populate-write pass of the upsert protocol
    async fn try_upsert(&self, resource_name: &str, token: &BootstrapToken) -> Result<(), ClusterError> {
        match self.cluster_store.get(resource_name).await {
            Ok(mut resource) => {
                info!(
                    "updating existing bootstrap token \"{}\" with expiration {}",
                    resource_name,
                    token.expiration_string()
                );
                self.populate_token_data(&mut resource, token);
                if self.opts.dry_run {
                    info!("dry-run: not updating secret \"{}\"", resource_name);
                } else {
                    self.cluster_store.update(&resource).await?;
                }
                Ok(())
            }
            Err(ClusterError::NotFound(_)) => {
                info!(
                    "creating new bootstrap token \"{}\" with expiration {}",
                    resource_name,
                    token.expiration_string()
                );
                let mut resource = Secret::default();
                resource.metadata.name = Some(resource_name.to_string());
                resource.metadata.namespace = Some(self.opts.namespace.clone());
                self.populate_token_data(&mut resource, token);
                if self.opts.dry_run {
                    info!("dry-run: not creating secret \"{}\"", resource_name);
                } else {
                    self.cluster_store.create(&resource).await?;
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Populate the bootstrap token fields on the cluster secret
    fn populate_token_data(&self, resource: &mut Secret, token: &BootstrapToken) {
        resource.type_ = Some(self.opts.token_type.clone());

        resource
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(self.opts.token_label.clone(), "true".to_string());

        let data = resource.string_data.get_or_insert_with(BTreeMap::new);
        data.insert(
            "description".to_string(),
            format!(
                "Token maintained by kube-bootstrap-token-manager/{}",
                env!("CARGO_PKG_VERSION")
            ),
        );
        data.insert("token-id".to_string(), token.id().to_string());
        data.insert("token-secret".to_string(), token.secret().to_string());
        match token.expiration_time() {
            Some(expiration) => {
                data.insert(
                    "expiration".to_string(),
                    expiration.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                );
            }
            // absent expiration means the field is absent, not zeroed
            None => {
                data.remove("expiration");
            }
        }
        data.insert(
            "usage-bootstrap-authentication".to_string(),
            self.opts.usage_bootstrap_authentication.clone(),
        );
        data.insert(
            "usage-bootstrap-signing".to_string(),
            self.opts.usage_bootstrap_signing.clone(),
        );
        data.insert(
            "auth-extra-groups".to_string(),
            self.opts.auth_extra_groups.clone(),
        );
    }
}
