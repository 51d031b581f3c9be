//! # Configuration
//!
//! Runtime options loaded from command line flags and environment variables.
//! Every option carries a sensible default; durations are given in seconds.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;

use crate::constants::DEFAULT_SERVER_BIND;
use crate::token::{generator, TOKEN_SEPARATOR};

/// Kubernetes bootstrap token manager options
#[derive(Debug, Clone, Parser)]
#[command(name = "kube-bootstrap-token-manager", version, about)]
pub struct Opts {
    /// Debug logging
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Switch log output to json format
    #[arg(long = "log.json", env = "LOG_JSON")]
    pub log_json: bool,

    /// Template for the token id; supports the `{Date}` variable
    #[arg(
        long = "bootstraptoken.id-template",
        env = "BOOTSTRAPTOKEN_ID_TEMPLATE",
        default_value = "{Date}"
    )]
    pub token_id_template: String,

    /// Template for the cluster resource name; `{id}` expands to the token id
    #[arg(
        long = "bootstraptoken.name-template",
        env = "BOOTSTRAPTOKEN_NAME_TEMPLATE",
        default_value = "bootstrap-token-{id}"
    )]
    pub token_name_template: String,

    /// Managed-by label key set on the cluster resource
    #[arg(
        long = "bootstraptoken.label",
        env = "BOOTSTRAPTOKEN_LABEL",
        default_value = "kubernetes.io/bootstraptoken-managed"
    )]
    pub token_label: String,

    /// Namespace for bootstrap token secrets
    #[arg(
        long = "bootstraptoken.namespace",
        env = "BOOTSTRAPTOKEN_NAMESPACE",
        default_value = "kube-system"
    )]
    pub namespace: String,

    /// Resource type for bootstrap token secrets
    #[arg(
        long = "bootstraptoken.type",
        env = "BOOTSTRAPTOKEN_TYPE",
        default_value = "bootstrap.kubernetes.io/token"
    )]
    pub token_type: String,

    /// usage-bootstrap-authentication flag written into the secret
    #[arg(
        long = "bootstraptoken.usage-bootstrap-authentication",
        env = "BOOTSTRAPTOKEN_USAGE_BOOTSTRAP_AUTHENTICATION",
        default_value = "true"
    )]
    pub usage_bootstrap_authentication: String,

    /// usage-bootstrap-signing flag written into the secret
    #[arg(
        long = "bootstraptoken.usage-bootstrap-signing",
        env = "BOOTSTRAPTOKEN_USAGE_BOOTSTRAP_SIGNING",
        default_value = "true"
    )]
    pub usage_bootstrap_signing: String,

    /// auth-extra-groups written into the secret
    #[arg(
        long = "bootstraptoken.auth-extra-groups",
        env = "BOOTSTRAPTOKEN_AUTH_EXTRA_GROUPS",
        default_value = "system:bootstrappers:worker,system:bootstrappers:ingress"
    )]
    pub auth_extra_groups: String,

    /// Token lifetime in seconds; 0 disables expiration enforcement
    #[arg(
        long = "bootstraptoken.expiration-secs",
        env = "BOOTSTRAPTOKEN_EXPIRATION_SECS",
        default_value_t = 8760 * 3600
    )]
    pub token_expiration_secs: u64,

    /// Length of the random token secret
    #[arg(
        long = "bootstraptoken.token-length",
        env = "BOOTSTRAPTOKEN_TOKEN_LENGTH",
        default_value_t = 16
    )]
    pub token_length: usize,

    /// Alphabet the random token secret is drawn from
    #[arg(
        long = "bootstraptoken.token-alphabet",
        env = "BOOTSTRAPTOKEN_TOKEN_ALPHABET",
        default_value = "abcdefghijklmnopqrstuvwxyz0123456789"
    )]
    pub token_alphabet: String,

    /// Interval between sync cycles in seconds
    #[arg(long = "sync.interval-secs", env = "SYNC_INTERVAL_SECS", default_value_t = 3600)]
    pub sync_interval_secs: u64,

    /// Lead time in seconds before expiration at which the token is rotated
    #[arg(
        long = "sync.recreate-before-secs",
        env = "SYNC_RECREATE_BEFORE_SECS",
        default_value_t = 2190 * 3600
    )]
    pub recreate_before_secs: u64,

    /// Also mirror previous valid tokens once at startup (full sync)
    #[arg(long = "sync.full", env = "SYNC_FULL")]
    pub sync_full: bool,

    /// Cloud provider backend
    #[arg(long = "cloud-provider", env = "CLOUD_PROVIDER", value_parser = ["azure"], default_value = "azure")]
    pub cloud_provider: String,

    /// Azure Key Vault URL (https://{vault-name}.vault.azure.net)
    #[arg(long = "azure.keyvault-url", env = "AZURE_KEYVAULT_URL")]
    pub azure_keyvault_url: Option<String>,

    /// Name of the Key Vault secret holding the token
    #[arg(
        long = "azure.keyvault-secret-name",
        env = "AZURE_KEYVAULT_SECRET_NAME",
        default_value = "kube-bootstrap-token"
    )]
    pub azure_keyvault_secret_name: String,

    /// Azure Workload Identity client id; Managed Identity is used when unset
    #[arg(long = "azure.client-id", env = "AZURE_CLIENT_ID")]
    pub azure_client_id: Option<String>,

    /// Suppress all mutating calls
    #[arg(long = "dry-run", env = "DRY_RUN")]
    pub dry_run: bool,

    /// Bind address of the health/metrics HTTP server
    #[arg(long = "bind", env = "SERVER_BIND", default_value = DEFAULT_SERVER_BIND)]
    pub server_bind: String,
}

impl Opts {
    /// Enforced token lifetime, `None` when expiration enforcement is disabled
    pub fn token_expiration(&self) -> Option<chrono::Duration> {
        (self.token_expiration_secs > 0)
            .then(|| chrono::Duration::seconds(self.token_expiration_secs as i64))
    }

    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync_interval_secs)
    }

    pub fn recreate_before(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.recreate_before_secs as i64)
    }

    /// Validate configuration that must hold before the sync loop starts
    ///
    /// Rejecting these at startup turns broken templates and alphabets into a
    /// clean process exit instead of a runtime failure during rotation.
    pub fn validate(&self) -> Result<()> {
        generator::expand_id_template(&self.token_id_template, Utc::now())
            .context("invalid bootstrap token id template")?;

        if self.token_alphabet.is_empty() {
            bail!("bootstrap token alphabet must not be empty");
        }
        if self.token_alphabet.contains(TOKEN_SEPARATOR) {
            bail!(
                "bootstrap token alphabet must not contain the separator \"{TOKEN_SEPARATOR}\""
            );
        }
        if self.token_length == 0 {
            bail!("bootstrap token length must be greater than zero");
        }
        if !self.token_name_template.contains("{id}") {
            bail!("bootstrap token name template must contain \"{{id}}\"");
        }

        if self.cloud_provider.eq_ignore_ascii_case("azure")
            && self
                .azure_keyvault_url
                .as_deref()
                .is_none_or(|url| url.is_empty())
        {
            bail!("no Azure KeyVault URL specified");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opts {
        let mut argv = vec!["kube-bootstrap-token-manager"];
        argv.extend_from_slice(args);
        Opts::try_parse_from(argv).expect("options should parse")
    }

    fn valid_opts() -> Opts {
        parse(&["--azure.keyvault-url", "https://vault.example"])
    }

    #[test]
    fn test_defaults() {
        let opts = valid_opts();
        assert_eq!(opts.token_id_template, "{Date}");
        assert_eq!(opts.token_name_template, "bootstrap-token-{id}");
        assert_eq!(opts.namespace, "kube-system");
        assert_eq!(opts.token_type, "bootstrap.kubernetes.io/token");
        assert_eq!(opts.token_length, 16);
        assert_eq!(opts.sync_interval(), std::time::Duration::from_secs(3600));
        assert_eq!(opts.recreate_before(), chrono::Duration::hours(2190));
        assert_eq!(opts.token_expiration(), Some(chrono::Duration::hours(8760)));
        assert!(!opts.sync_full);
        assert!(!opts.dry_run);
        opts.validate().expect("defaults should validate");
    }

    #[test]
    fn test_zero_expiration_disables_enforcement() {
        let opts = parse(&[
            "--azure.keyvault-url",
            "https://vault.example",
            "--bootstraptoken.expiration-secs",
            "0",
        ]);
        assert_eq!(opts.token_expiration(), None);
    }

    #[test]
    fn test_missing_vault_url_fails_validation() {
        let opts = parse(&[]);
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_bad_id_template_fails_validation() {
        let mut opts = valid_opts();
        opts.token_id_template = "{Nope}".to_string();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_alphabet_with_separator_fails_validation() {
        let mut opts = valid_opts();
        opts.token_alphabet = "abc.def".to_string();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_name_template_without_id_fails_validation() {
        let mut opts = valid_opts();
        opts.token_name_template = "bootstrap-token".to_string();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_is_rejected_by_parser() {
        let result = Opts::try_parse_from([
            "kube-bootstrap-token-manager",
            "--cloud-provider",
            "gcp",
        ]);
        assert!(result.is_err());
    }
}
