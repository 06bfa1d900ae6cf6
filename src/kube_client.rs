use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{self, Method, Request, Uri, header};
use kube::Resource;
use kube::api::{Api, ApiResource, DynamicObject, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::TypeMeta;
use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::identity::CallerIdentity;
use crate::resource::ServedResource;
use crate::upstream::{
    ClientError, ClientFactory, ResourceClient, UpstreamError, UpstreamReason,
};

/// One way of obtaining cluster credentials for a request.
///
/// Returns `Ok(None)` when this source does not apply, so the next one
/// in the chain is tried.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, caller: &CallerIdentity) -> Result<Option<kube::Config>, ClientError>;
}

/// Uses the caller's own bearer token, so the API server applies the
/// caller's RBAC.
pub struct BearerTokenProvider {
    api_server: String,
    root_cert: Option<Vec<Vec<u8>>>,
    accept_invalid_certs: bool,
}

impl BearerTokenProvider {
    pub fn new(api_server: String, accept_invalid_certs: bool) -> Self {
        Self {
            api_server,
            root_cert: None,
            accept_invalid_certs,
        }
    }

    /// Trust these DER certificates in addition to the system roots.
    pub fn with_root_cert(mut self, root_cert: Option<Vec<Vec<u8>>>) -> Self {
        self.root_cert = root_cert;
        self
    }
}

#[async_trait]
impl CredentialProvider for BearerTokenProvider {
    fn name(&self) -> &'static str {
        "bearer-token"
    }

    async fn resolve(&self, caller: &CallerIdentity) -> Result<Option<kube::Config>, ClientError> {
        let Some(token) = &caller.bearer_token else {
            return Ok(None);
        };

        let cluster_url =
            self.api_server
                .parse::<Uri>()
                .map_err(|source| ClientError::InvalidApiServer {
                    address: self.api_server.clone(),
                    source,
                })?;

        let mut config = kube::Config::new(cluster_url);
        config.root_cert = self.root_cert.clone();
        config.accept_invalid_certs = self.accept_invalid_certs;
        config.auth_info.token = Some(token.clone().into());
        Ok(Some(config))
    }
}

/// The pod's service account.
pub struct InClusterProvider;

#[async_trait]
impl CredentialProvider for InClusterProvider {
    fn name(&self) -> &'static str {
        "in-cluster"
    }

    async fn resolve(&self, _caller: &CallerIdentity) -> Result<Option<kube::Config>, ClientError> {
        match kube::Config::incluster() {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::debug!("In-cluster config unavailable: {}", err);
                Ok(None)
            }
        }
    }
}

/// A kubeconfig file on disk, using its current context.
pub struct KubeconfigProvider {
    path: PathBuf,
}

impl KubeconfigProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CredentialProvider for KubeconfigProvider {
    fn name(&self) -> &'static str {
        "kubeconfig"
    }

    async fn resolve(&self, _caller: &CallerIdentity) -> Result<Option<kube::Config>, ClientError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            tracing::debug!("No kubeconfig at {}", self.path.display());
            return Ok(None);
        }

        let kubeconfig = Kubeconfig::read_from(&self.path)?;
        let config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        Ok(Some(config))
    }
}

/// Builds a fresh client per request from the first credential provider
/// that applies.
pub struct KubeClientFactory {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl KubeClientFactory {
    /// Bearer token, then in-cluster service account, then kubeconfig.
    pub fn from_config(config: &Config) -> Self {
        // The in-cluster CA only makes sense when talking to this cluster.
        let root_cert = match config.api_server_override {
            Some(_) => None,
            None => kube::Config::incluster().ok().and_then(|c| c.root_cert),
        };

        Self::with_providers(vec![
            Box::new(
                BearerTokenProvider::new(config.api_server(), config.insecure_skip_tls_verify)
                    .with_root_cert(root_cert),
            ),
            Box::new(InClusterProvider),
            Box::new(KubeconfigProvider::new(config.kubeconfig_path.clone())),
        ])
    }

    pub fn with_providers(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    pub async fn resolve_config(&self, caller: &CallerIdentity) -> Result<kube::Config, ClientError> {
        for provider in &self.providers {
            if let Some(config) = provider.resolve(caller).await? {
                tracing::debug!(
                    provider = provider.name(),
                    cluster_url = %config.cluster_url,
                    "Resolved cluster credentials"
                );
                return Ok(config);
            }
        }
        Err(ClientError::NoCredentials)
    }
}

#[async_trait]
impl ClientFactory for KubeClientFactory {
    async fn client_for(
        &self,
        caller: &CallerIdentity,
        resource: &ServedResource,
    ) -> Result<Box<dyn ResourceClient>, ClientError> {
        let config = self.resolve_config(caller).await?;
        let client = kube::Client::try_from(config)?;
        Ok(Box::new(KubeResourceClient::new(client, resource)))
    }
}

/// Dynamic client for a single resource type.
pub struct KubeResourceClient {
    client: kube::Client,
    api_resource: ApiResource,
}

impl KubeResourceClient {
    pub fn new(client: kube::Client, resource: &ServedResource) -> Self {
        Self {
            client,
            api_resource: resource.api_resource(),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.api_resource)
    }

    /// Fills in `apiVersion`/`kind` from the served resource when the
    /// body leaves them out.
    fn to_object(&self, object: JsonValue) -> Result<DynamicObject, UpstreamError> {
        let mut object: DynamicObject = serde_json::from_value(object).map_err(|err| {
            UpstreamError::new(UpstreamReason::Internal, format!("invalid object: {}", err))
        })?;
        if object.types.is_none() {
            object.types = Some(TypeMeta {
                api_version: self.api_resource.api_version.clone(),
                kind: self.api_resource.kind.clone(),
            });
        }
        Ok(object)
    }
}

const MERGE_PATCH: &str = "application/merge-patch+json";

/// Builds a merge-patch request whose body is exactly `patch`.
///
/// `Api::patch` re-serializes its argument, so the request is built here
/// and sent with `Client::request` instead.
fn merge_patch_request(
    api_resource: &ApiResource,
    namespace: &str,
    name: &str,
    patch: Bytes,
) -> Result<Request<Vec<u8>>, http::Error> {
    let url = format!(
        "{}/{}",
        DynamicObject::url_path(api_resource, Some(namespace)),
        name
    );
    Request::builder()
        .method(Method::PATCH)
        .uri(url)
        .header(header::CONTENT_TYPE, MERGE_PATCH)
        .header(header::ACCEPT, "application/json")
        .body(patch.to_vec())
}

fn to_json(object: DynamicObject) -> Result<JsonValue, UpstreamError> {
    serde_json::to_value(object).map_err(|err| {
        UpstreamError::new(
            UpstreamReason::Internal,
            format!("failed to encode object: {}", err),
        )
    })
}

impl From<kube::Error> for UpstreamError {
    fn from(err: kube::Error) -> Self {
        let code = match &err {
            kube::Error::Api(response) => Some(response.code),
            _ => None,
        };
        UpstreamError::from_status(code, err.to_string())
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<JsonValue, UpstreamError> {
        let object = self.api(namespace).get(name).await?;
        to_json(object)
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        object: JsonValue,
    ) -> Result<JsonValue, UpstreamError> {
        let object = self.to_object(object)?;
        let updated = self
            .api(namespace)
            .replace(name, &PostParams::default(), &object)
            .await?;
        to_json(updated)
    }

    async fn merge_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: Bytes,
    ) -> Result<JsonValue, UpstreamError> {
        let request = merge_patch_request(&self.api_resource, namespace, name, patch)
            .map_err(|err| {
                UpstreamError::new(
                    UpstreamReason::Internal,
                    format!("failed to build patch request: {}", err),
                )
            })?;
        let patched: DynamicObject = self.client.request(request).await?;
        to_json(patched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller_with_token(token: &str) -> CallerIdentity {
        CallerIdentity {
            bearer_token: Some(token.to_string()),
            ..Default::default()
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("kube-route-proxy-{}-{}", uuid::Uuid::new_v4(), name))
    }

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: dev
  cluster:
    server: https://dev.example.com:6443
users:
- name: dev
  user:
    token: kubeconfig-token
contexts:
- name: dev
  context:
    cluster: dev
    user: dev
current-context: dev
"#;

    #[tokio::test]
    async fn test_bearer_provider_skips_anonymous_callers() {
        let provider = BearerTokenProvider::new("https://10.0.0.1:443".to_string(), false);
        let config = provider.resolve(&CallerIdentity::default()).await.unwrap();
        assert!(config.is_none());
    }

    #[tokio::test]
    async fn test_bearer_provider_builds_token_config() {
        let provider = BearerTokenProvider::new("https://10.0.0.1:443".to_string(), true);
        let config = provider
            .resolve(&caller_with_token("caller-token"))
            .await
            .unwrap()
            .expect("token caller should resolve");

        assert_eq!(config.cluster_url.host(), Some("10.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(443));
        assert!(config.accept_invalid_certs);
        assert!(config.auth_info.token.is_some());
    }

    #[tokio::test]
    async fn test_bearer_provider_rejects_bad_address() {
        let provider = BearerTokenProvider::new("not a url".to_string(), false);
        let result = provider.resolve(&caller_with_token("t")).await;
        assert!(matches!(result, Err(ClientError::InvalidApiServer { .. })));
    }

    #[tokio::test]
    async fn test_kubeconfig_provider_missing_file() {
        let provider = KubeconfigProvider::new(temp_path("missing"));
        let config = provider.resolve(&CallerIdentity::default()).await.unwrap();
        assert!(config.is_none());
    }

    #[tokio::test]
    async fn test_kubeconfig_provider_reads_current_context() {
        let path = temp_path("kubeconfig");
        std::fs::write(&path, KUBECONFIG).unwrap();

        let provider = KubeconfigProvider::new(path.clone());
        let config = provider
            .resolve(&CallerIdentity::default())
            .await
            .unwrap()
            .expect("kubeconfig should resolve");

        assert_eq!(config.cluster_url.host(), Some("dev.example.com"));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_kubeconfig_provider_invalid_file() {
        let path = temp_path("garbage");
        std::fs::write(&path, "clusters: [this is: not valid").unwrap();

        let provider = KubeconfigProvider::new(path.clone());
        let result = provider.resolve(&CallerIdentity::default()).await;

        assert!(matches!(result, Err(ClientError::Kubeconfig(_))));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_chain_first_match_wins() {
        let path = temp_path("chain");
        std::fs::write(&path, KUBECONFIG).unwrap();

        let factory = KubeClientFactory::with_providers(vec![
            Box::new(BearerTokenProvider::new("https://10.0.0.1:443".to_string(), false)),
            Box::new(KubeconfigProvider::new(path.clone())),
        ]);

        let with_token = factory.resolve_config(&caller_with_token("t")).await.unwrap();
        assert_eq!(with_token.cluster_url.host(), Some("10.0.0.1"));

        let anonymous = factory.resolve_config(&CallerIdentity::default()).await.unwrap();
        assert_eq!(anonymous.cluster_url.host(), Some("dev.example.com"));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_chain_without_credentials() {
        let factory = KubeClientFactory::with_providers(vec![
            Box::new(BearerTokenProvider::new("https://10.0.0.1:443".to_string(), false)),
            Box::new(KubeconfigProvider::new(temp_path("absent"))),
        ]);

        let result = factory.resolve_config(&CallerIdentity::default()).await;
        assert!(matches!(result, Err(ClientError::NoCredentials)));
    }

    #[test]
    fn test_merge_patch_request_keeps_body_bytes() {
        let resource = ServedResource::http_route().api_resource();
        let body = " {\"spec\" : {\"hostnames\": [\"b.com\"]}, \"x\": 1.50 } \n";

        let request =
            merge_patch_request(&resource, "default", "my-route", Bytes::from(body)).unwrap();

        assert_eq!(request.method(), Method::PATCH);
        assert_eq!(
            request.uri().path(),
            "/apis/gateway.networking.k8s.io/v1/namespaces/default/httproutes/my-route"
        );
        assert_eq!(request.headers()[header::CONTENT_TYPE], MERGE_PATCH);
        assert_eq!(request.body().as_slice(), body.as_bytes());
    }

    #[test]
    fn test_api_errors_keep_status_reason() {
        let err = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: r#"httproutes.gateway.networking.k8s.io "web" not found"#.to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });
        assert_eq!(UpstreamError::from(err).reason, UpstreamReason::NotFound);

        let err = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "Operation cannot be fulfilled: the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        });
        assert_eq!(UpstreamError::from(err).reason, UpstreamReason::Conflict);

        let err = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: r#"httproutes.gateway.networking.k8s.io "web" is forbidden: User "bob" cannot update"#.to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        assert_eq!(UpstreamError::from(err).reason, UpstreamReason::Forbidden);
    }
}
