//! # Azure Key Vault Provider
//!
//! Stores the bootstrap token history as versions of a single Key Vault
//! secret, talking to the Key Vault data-plane REST API with a bearer token
//! from `azure_identity`.
//!
//! Supports Workload Identity (explicit client id) and Managed Identity
//! authentication.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use azure_core::credentials::{TokenCredential, TokenRequestOptions};
use azure_identity::{ManagedIdentityCredential, WorkloadIdentityCredential};
use chrono::{DateTime, Utc};
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Opts;
use crate::provider::{CloudProvider, ProviderError, SECRET_SYNC_COUNT_MAX};
use crate::token::BootstrapToken;

const API_VERSION: &str = "7.4";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

const ANNOTATION_PROVIDER: &str = "bootstraptoken.kubernetes.io/provider";
const ANNOTATION_KEYVAULT: &str = "bootstraptoken.kubernetes.io/keyvault";
const ANNOTATION_SECRET: &str = "bootstraptoken.kubernetes.io/secret";
const ANNOTATION_SECRET_VERSION: &str = "bootstraptoken.kubernetes.io/secretVersion";
const ANNOTATION_CREATED: &str = "bootstraptoken.kubernetes.io/created";
const ANNOTATION_EXPIRES: &str = "bootstraptoken.kubernetes.io/expires";
const ANNOTATION_NOT_BEFORE: &str = "bootstraptoken.kubernetes.io/notBefore";

/// Secret attributes as returned by the Key Vault REST API (Unix seconds)
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SecretAttributes {
    pub enabled: Option<bool>,
    pub created: Option<i64>,
    #[serde(rename = "exp")]
    pub expires: Option<i64>,
    #[serde(rename = "nbf")]
    pub not_before: Option<i64>,
}

/// A full secret bundle: `GET /secrets/{name}[/{version}]`
#[derive(Debug, Deserialize)]
struct SecretBundle {
    id: Option<String>,
    value: Option<String>,
    #[serde(default)]
    attributes: SecretAttributes,
}

/// A secret version listing item: `GET /secrets/{name}/versions`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SecretVersionItem {
    pub id: String,
    #[serde(default)]
    pub attributes: SecretAttributes,
}

#[derive(Debug, Deserialize)]
struct SecretVersionsPage {
    #[serde(default)]
    value: Vec<SecretVersionItem>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyVaultErrorBody {
    error: Option<KeyVaultErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct KeyVaultErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// Classified Key Vault failure, translated from provider-specific signals
#[derive(Debug, PartialEq, Eq)]
enum VaultFailure {
    /// Secret absent or disabled: a normal empty result, not an error
    Absent,
    /// Access forbidden: hard failure
    Forbidden(String),
    Other(String),
}

impl From<VaultFailure> for ProviderError {
    fn from(failure: VaultFailure) -> Self {
        match failure {
            VaultFailure::Forbidden(message) => ProviderError::PolicyDenied(message),
            // callers handle Absent before converting; keep a sane fallback
            VaultFailure::Absent => ProviderError::Other(anyhow!("secret not found")),
            VaultFailure::Other(message) => ProviderError::Other(anyhow!(message)),
        }
    }
}

/// Azure Key Vault provider implementation
pub struct AzureKeyVault {
    http_client: ReqwestClient,
    credential: Arc<dyn TokenCredential>,
    vault_url: String,
    secret_name: String,
}

impl std::fmt::Debug for AzureKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureKeyVault")
            .field("vault_url", &self.vault_url)
            .field("secret_name", &self.secret_name)
            .finish_non_exhaustive()
    }
}

impl AzureKeyVault {
    /// Create a new Azure Key Vault provider
    ///
    /// Supports both Workload Identity and Managed Identity.
    pub async fn new(opts: &Opts) -> Result<Self> {
        let vault_url = opts
            .azure_keyvault_url
            .as_deref()
            .context("no Azure KeyVault URL specified")?
            .trim_end_matches('/')
            .to_string();
        let secret_name = opts.azure_keyvault_secret_name.clone();

        let credential: Arc<dyn TokenCredential> = match &opts.azure_client_id {
            Some(client_id) => {
                info!(
                    "using Azure Workload Identity authentication with client id {}",
                    client_id
                );
                let options = azure_identity::WorkloadIdentityCredentialOptions {
                    client_id: Some(client_id.clone()),
                    ..Default::default()
                };
                WorkloadIdentityCredential::new(Some(options))
                    .context("failed to create WorkloadIdentityCredential")?
            }
            None => {
                // Works automatically in Azure environments (AKS, App Service, ...)
                info!("no Azure client id specified, using Managed Identity");
                ManagedIdentityCredential::new(None)
                    .context("failed to create ManagedIdentityCredential")?
            }
        };

        let http_client = ReqwestClient::builder()
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            http_client,
            credential,
            vault_url,
            secret_name,
        })
    }

    async fn bearer_token(&self) -> Result<String> {
        let scope = &[VAULT_SCOPE];
        let options = Some(TokenRequestOptions::default());
        let token_response = self
            .credential
            .get_token(scope, options)
            .await
            .context("failed to get Azure Key Vault access token")?;
        Ok(token_response.token.secret().to_string())
    }

    /// GET a Key Vault URL, translating HTTP failures into [`VaultFailure`]
    async fn vault_get(&self, url: &str) -> Result<Result<serde_json::Value, VaultFailure>> {
        let token = self.bearer_token().await?;
        let response = self
            .http_client
            .get(url)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .context("Key Vault request failed")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            let value =
                serde_json::from_str(&body).context("failed to deserialize Key Vault response")?;
            return Ok(Ok(value));
        }
        Ok(Err(classify_failure(status.as_u16(), &body)))
    }

    fn secret_url(&self, version: Option<&str>) -> String {
        match version {
            Some(version) => format!(
                "{}/secrets/{}/{}?api-version={}",
                self.vault_url, self.secret_name, version, API_VERSION
            ),
            None => format!(
                "{}/secrets/{}?api-version={}",
                self.vault_url, self.secret_name, API_VERSION
            ),
        }
    }

    /// Turn a secret bundle into a bootstrap token with provenance annotations
    fn token_from_bundle(&self, bundle: &SecretBundle) -> Option<BootstrapToken> {
        let value = bundle.value.as_deref()?;
        let Some(mut token) = BootstrapToken::parse(value) else {
            // Malformed stored value: treated as absent, never crashes the cycle
            warn!(
                "stored Key Vault secret \"{}\" does not parse as a bootstrap token, ignoring",
                self.secret_name
            );
            return None;
        };

        if let Some(created) = bundle.attributes.created.and_then(timestamp) {
            token.set_creation_time(created);
            token.set_annotation(ANNOTATION_CREATED, created.to_rfc3339());
        }
        if let Some(expires) = bundle.attributes.expires.and_then(timestamp) {
            token.set_expiration_time(expires);
            token.set_annotation(ANNOTATION_EXPIRES, expires.to_rfc3339());
        }
        if let Some(not_before) = bundle.attributes.not_before.and_then(timestamp) {
            token.set_annotation(ANNOTATION_NOT_BEFORE, not_before.to_rfc3339());
        }

        token.set_annotation(ANNOTATION_PROVIDER, "azure");
        token.set_annotation(ANNOTATION_KEYVAULT, &self.vault_url);
        token.set_annotation(ANNOTATION_SECRET, &self.secret_name);
        if let Some(version) = bundle.id.as_deref().and_then(version_from_id) {
            token.set_annotation(ANNOTATION_SECRET_VERSION, version);
        }

        Some(token)
    }

    /// List every secret version, following pagination
    async fn list_versions(&self) -> Result<Vec<SecretVersionItem>, ProviderError> {
        let mut items = Vec::new();
        let mut url = format!(
            "{}/secrets/{}/versions?api-version={}",
            self.vault_url, self.secret_name, API_VERSION
        );
        loop {
            let page = match self.vault_get(&url).await? {
                Ok(value) => serde_json::from_value::<SecretVersionsPage>(value)
                    .context("failed to deserialize Key Vault versions page")?,
                Err(VaultFailure::Absent) => break,
                Err(failure) => return Err(failure.into()),
            };
            items.extend(page.value);
            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl CloudProvider for AzureKeyVault {
    async fn fetch_token(&self) -> Result<Option<BootstrapToken>, ProviderError> {
        info!(
            "fetching current token from Azure KeyVault \"{}\" secret \"{}\"",
            self.vault_url, self.secret_name
        );

        let bundle = match self.vault_get(&self.secret_url(None)).await? {
            Ok(value) => serde_json::from_value::<SecretBundle>(value)
                .context("failed to deserialize Key Vault secret")?,
            Err(VaultFailure::Absent) => {
                warn!("no usable secret found, assuming non existing token");
                return Ok(None);
            }
            Err(failure) => return Err(failure.into()),
        };

        Ok(self.token_from_bundle(&bundle))
    }

    async fn fetch_tokens(&self) -> Result<Vec<BootstrapToken>, ProviderError> {
        info!(
            "fetching all tokens from Azure KeyVault \"{}\" secret \"{}\"",
            self.vault_url, self.secret_name
        );

        let versions = self.list_versions().await?;
        let candidates = select_sync_candidates(versions, Utc::now());

        let mut tokens = Vec::new();
        for item in candidates {
            let Some(version) = version_from_id(&item.id) else {
                continue;
            };
            let bundle = match self.vault_get(&self.secret_url(Some(version))).await? {
                Ok(value) => serde_json::from_value::<SecretBundle>(value)
                    .context("failed to deserialize Key Vault secret version")?,
                Err(failure) => {
                    warn!(
                        "unable to fetch secret \"{}\" version \"{}\": {:?}",
                        self.secret_name, version, failure
                    );
                    continue;
                }
            };
            if let Some(token) = self.token_from_bundle(&bundle) {
                debug!("found valid secret version \"{}\"", version);
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    async fn store_token(&self, token: &BootstrapToken) -> Result<(), ProviderError> {
        info!(
            "storing token \"{}\" to Azure KeyVault \"{}\" secret \"{}\" with expiration {}",
            token.id(),
            self.vault_url,
            self.secret_name,
            token.expiration_string()
        );

        let body = serde_json::json!({
            "value": token.full_token(),
            "tags": {
                "managed-by": "kube-bootstrap-token-manager",
                "token": token.id(),
            },
            "contentType": "kube-bootstrap-token",
            "attributes": {
                "nbf": token.creation_time().map(|t| t.timestamp()),
                "exp": token.expiration_time().map(|t| t.timestamp()),
            },
        });

        let bearer = self.bearer_token().await?;
        let response = self
            .http_client
            .put(self.secret_url(None))
            .header("Authorization", format!("Bearer {bearer}"))
            .json(&body)
            .send()
            .await
            .context("Key Vault set-secret request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body).into());
        }
        Ok(())
    }
}

/// Filter, order and bound the secret versions considered for a full sync
///
/// Keeps enabled versions whose activation time has been reached and that are
/// not expired, newest creation time first, at most [`SECRET_SYNC_COUNT_MAX`].
pub(crate) fn select_sync_candidates(
    mut items: Vec<SecretVersionItem>,
    now: DateTime<Utc>,
) -> Vec<SecretVersionItem> {
    items.retain(|item| {
        if !item.attributes.enabled.unwrap_or(false) {
            return false;
        }
        if let Some(not_before) = item.attributes.not_before.and_then(timestamp) {
            if now < not_before {
                return false;
            }
        }
        if let Some(expires) = item.attributes.expires.and_then(timestamp) {
            if now > expires {
                return false;
            }
        }
        true
    });
    items.sort_by_key(|item| std::cmp::Reverse(item.attributes.created));
    items.truncate(SECRET_SYNC_COUNT_MAX);
    items
}

/// Translate a Key Vault HTTP failure into [`VaultFailure`]
fn classify_failure(status: u16, body: &str) -> VaultFailure {
    let detail = serde_json::from_str::<KeyVaultErrorBody>(body)
        .ok()
        .and_then(|b| b.error);
    let code = detail.as_ref().and_then(|e| e.code.clone());
    let message = detail
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("HTTP {status}"));

    match code.as_deref() {
        Some("SecretNotFound" | "SecretDisabled") => VaultFailure::Absent,
        Some("ForbiddenByPolicy") => VaultFailure::Forbidden(message),
        _ if status == 404 => VaultFailure::Absent,
        _ if status == 403 => VaultFailure::Forbidden(message),
        _ => VaultFailure::Other(format!("HTTP {status}: {message}")),
    }
}

/// Extract the version segment from a Key Vault secret id URL
/// (`https://{vault}/secrets/{name}/{version}`)
fn version_from_id(id: &str) -> Option<&str> {
    let mut segments = id.trim_end_matches('/').rsplit('/');
    let version = segments.next()?;
    // the id of an unversioned bundle ends with the secret name
    if segments.next().is_some_and(|s| s == "secrets") {
        return None;
    }
    Some(version)
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
