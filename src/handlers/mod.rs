pub mod get;
pub mod health;
pub mod patch;
pub mod put;

pub use get::get_handler;
pub use health::health_handler;
pub use patch::patch_handler;
pub use put::put_handler;

use axum::{Json, http::Uri};
use serde_json::Value as JsonValue;
use tracing::Instrument;

use crate::error::ApiError;
use crate::identity::CallerIdentity;
use crate::resource::ServedResource;
use crate::routes::split_path;

/// `{namespace}/{name}` taken from `/{prefix}/{namespace}/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    pub namespace: String,
    pub name: String,
}

impl ResourcePath {
    pub fn parse(path: &str, resource: &ServedResource) -> Result<Self, ApiError> {
        match split_path(path).as_slice() {
            [_, namespace, name] => Ok(ResourcePath {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            _ => Err(ApiError::BadPath {
                prefix: resource.path_prefix.clone(),
                path: path.to_string(),
            }),
        }
    }
}

/// Runs one proxied operation inside a span naming the caller, and logs
/// its outcome before the response is written.
///
/// `claimed_subject_unverified` is whatever the bearer token says about
/// itself; it is never checked and never used for authorization.
pub(crate) async fn proxied<F>(
    method: &'static str,
    uri: &Uri,
    caller: &CallerIdentity,
    operation: F,
) -> Result<Json<JsonValue>, ApiError>
where
    F: Future<Output = Result<JsonValue, ApiError>>,
{
    let span = tracing::info_span!(
        "proxy",
        method,
        path = %uri.path(),
        user = caller.user_label(),
        claimed_subject_unverified = caller.claimed_subject_label(),
    );

    async move {
        let result = operation.await;
        match &result {
            Ok(_) => tracing::info!("{} {} successful", method, uri.path()),
            Err(err) => tracing::warn!(
                status = err.status().as_u16(),
                "{} {} failed: {}",
                method,
                uri.path(),
                err
            ),
        }
        result.map(Json)
    }
    .instrument(span)
    .await
}
