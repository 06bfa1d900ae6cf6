//! Seam between the HTTP handlers and the cluster.
//!
//! Handlers only see [`ResourceClient`] and [`ClientFactory`], so they can be
//! exercised against an in-memory cluster in tests. Failures come back as an
//! [`UpstreamError`] carrying a structured [`UpstreamReason`]; the HTTP status
//! is decided from that reason, not from error text.

use async_trait::async_trait;
use axum::body::Bytes;
use serde_json::Value as JsonValue;

use crate::identity::CallerIdentity;
use crate::resource::ServedResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamReason {
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

impl UpstreamReason {
    /// Any message mentioning `forbidden` is an RBAC denial, whatever the
    /// status code says. Otherwise the code decides.
    pub fn classify(code: Option<u16>, message: &str) -> Self {
        if message.contains("forbidden") {
            return UpstreamReason::Forbidden;
        }
        match code {
            Some(403) => UpstreamReason::Forbidden,
            Some(404) => UpstreamReason::NotFound,
            Some(409) => UpstreamReason::Conflict,
            _ => UpstreamReason::Internal,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub reason: UpstreamReason,
    pub message: String,
}

impl UpstreamError {
    pub fn new(reason: UpstreamReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// Classifies a failure from its status code (if the API server answered)
    /// and message text.
    pub fn from_status(code: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(UpstreamReason::classify(code, &message), message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid API server address '{address}': {source}")]
    InvalidApiServer {
        address: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
    #[error("failed to build client: {0}")]
    Client(#[from] kube::Error),
    #[error("no credentials available: no bearer token, not running in-cluster and no kubeconfig found")]
    NoCredentials,
}

/// Get/Update/Patch against one resource type, on behalf of one caller.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<JsonValue, UpstreamError>;

    /// Full update. `object` already carries the name, namespace and
    /// `resourceVersion` to submit.
    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        object: JsonValue,
    ) -> Result<JsonValue, UpstreamError>;

    /// JSON merge patch, forwarded exactly as received.
    async fn merge_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: Bytes,
    ) -> Result<JsonValue, UpstreamError>;
}

#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn client_for(
        &self,
        caller: &CallerIdentity,
        resource: &ServedResource,
    ) -> Result<Box<dyn ResourceClient>, ClientError>;
}
