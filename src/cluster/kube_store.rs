//! Kubernetes-backed cluster store over `kube::Api<Secret>`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::Client;

use super::{ClusterError, ClusterStore};

/// Cluster store reading and writing `v1/Secret` resources in one namespace
#[derive(Debug, Clone)]
pub struct KubeSecretStore {
    api: Api<Secret>,
}

impl KubeSecretStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ClusterStore for KubeSecretStore {
    async fn get(&self, name: &str) -> Result<Secret, ClusterError> {
        self.api
            .get(name)
            .await
            .map_err(|err| translate(err, name))
    }

    async fn create(&self, resource: &Secret) -> Result<Secret, ClusterError> {
        let name = resource.metadata.name.as_deref().unwrap_or_default();
        self.api
            .create(&PostParams::default(), resource)
            .await
            .map_err(|err| translate(err, name))
    }

    async fn update(&self, resource: &Secret) -> Result<Secret, ClusterError> {
        let name = resource.metadata.name.as_deref().unwrap_or_default();
        self.api
            .replace(name, &PostParams::default(), resource)
            .await
            .map_err(|err| translate(err, name))
    }
}

/// Map a Kubernetes API error into the cluster error taxonomy
///
/// Conflict (409), server-busy (429/500/503) and gateway timeout (504) are
/// the retryable classes; 404 is "not found"; everything else aborts.
fn translate(err: kube::Error, name: &str) -> ClusterError {
    match &err {
        kube::Error::Api(response) => match response.code {
            404 => ClusterError::NotFound(name.to_string()),
            409 | 429 | 500 | 503 | 504 => ClusterError::Retryable(err),
            _ => ClusterError::Other(err),
        },
        _ => ClusterError::Other(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} ({code})"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_not_found_is_classified() {
        let err = translate(api_error(404, "NotFound"), "bootstrap-token-250812");
        assert!(matches!(err, ClusterError::NotFound(name) if name == "bootstrap-token-250812"));
    }

    #[test]
    fn test_conflict_timeout_and_busy_are_retryable() {
        for (code, reason) in [
            (409, "Conflict"),
            (429, "TooManyRequests"),
            (500, "ServerTimeout"),
            (503, "ServiceUnavailable"),
            (504, "Timeout"),
        ] {
            let err = translate(api_error(code, reason), "token");
            assert!(err.is_retryable(), "code {code} should be retryable");
        }
    }

    #[test]
    fn test_forbidden_is_not_retryable() {
        let err = translate(api_error(403, "Forbidden"), "token");
        assert!(!err.is_retryable());
        assert!(matches!(err, ClusterError::Other(_)));
    }
}
