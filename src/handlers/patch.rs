use crate::error::{ApiError, ErrorResponse, Phase};
use crate::handlers::{ResourcePath, proxied};
use crate::identity::CallerIdentity;
use crate::routes;
use crate::state::AppState;
use axum::{Json, body::Bytes, extract::State, http::Uri};
use serde::de::IgnoredAny;
use serde_json::Value as JsonValue;

/// PATCH /{resource}/{namespace}/{name} handler - Apply a JSON merge patch
///
/// The request body is sent upstream byte for byte once it has been
/// checked to be JSON.
#[utoipa::path(
    patch,
    path = routes::RESOURCE_ITEM,
    params(
        ("resource" = String, Path, description = "Configured resource prefix, e.g. httproute"),
        ("namespace" = String, Path, description = "Namespace of the object"),
        ("name" = String, Path, description = "Name of the object"),
        ("Authorization" = Option<String>, Header, description = "Bearer token forwarded to the API server"),
        ("X-User" = Option<String>, Header, description = "Caller name for audit logs only")
    ),
    request_body(content = serde_json::Value, content_type = "application/merge-patch+json"),
    responses(
        (status = 200, description = "Patched object", body = serde_json::Value),
        (status = 400, description = "Malformed path or body", body = ErrorResponse),
        (status = 403, description = "Denied by cluster RBAC", body = ErrorResponse),
        (status = 500, description = "Client or patch failure", body = ErrorResponse)
    ),
    tag = "resources"
)]
pub async fn patch_handler(
    State(state): State<AppState>,
    caller: CallerIdentity,
    uri: Uri,
    body: Bytes,
) -> Result<Json<JsonValue>, ApiError> {
    proxied("PATCH", &uri, &caller, patch_object(&state, &caller, &uri, body)).await
}

async fn patch_object(
    state: &AppState,
    caller: &CallerIdentity,
    uri: &Uri,
    body: Bytes,
) -> Result<JsonValue, ApiError> {
    let target = ResourcePath::parse(uri.path(), &state.resource)?;
    serde_json::from_slice::<IgnoredAny>(&body)?;

    let client = state.clients.client_for(caller, &state.resource).await?;
    tracing::debug!("Patch body: {}", String::from_utf8_lossy(&body));

    client
        .merge_patch(&target.namespace, &target.name, body)
        .await
        .map_err(|err| ApiError::upstream(Phase::Patch, &state.resource.kind, err))
}
