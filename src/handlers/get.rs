use crate::error::{ApiError, ErrorResponse, Phase};
use crate::handlers::{ResourcePath, proxied};
use crate::identity::CallerIdentity;
use crate::routes;
use crate::state::AppState;
use axum::{Json, extract::State, http::Uri};
use serde_json::Value as JsonValue;

/// GET /{resource}/{namespace}/{name} handler - Fetch an object as JSON
#[utoipa::path(
    get,
    path = routes::RESOURCE_ITEM,
    params(
        ("resource" = String, Path, description = "Configured resource prefix, e.g. httproute"),
        ("namespace" = String, Path, description = "Namespace of the object"),
        ("name" = String, Path, description = "Name of the object"),
        ("Authorization" = Option<String>, Header, description = "Bearer token forwarded to the API server"),
        ("X-User" = Option<String>, Header, description = "Caller name for audit logs only")
    ),
    responses(
        (status = 200, description = "Object as returned by the API server", body = serde_json::Value),
        (status = 400, description = "Malformed path", body = ErrorResponse),
        (status = 403, description = "Denied by cluster RBAC", body = ErrorResponse),
        (status = 404, description = "Object not found", body = ErrorResponse),
        (status = 500, description = "Could not build a cluster client", body = ErrorResponse)
    ),
    tag = "resources"
)]
pub async fn get_handler(
    State(state): State<AppState>,
    caller: CallerIdentity,
    uri: Uri,
) -> Result<Json<JsonValue>, ApiError> {
    proxied("GET", &uri, &caller, get_object(&state, &caller, &uri)).await
}

async fn get_object(
    state: &AppState,
    caller: &CallerIdentity,
    uri: &Uri,
) -> Result<JsonValue, ApiError> {
    let target = ResourcePath::parse(uri.path(), &state.resource)?;
    let client = state.clients.client_for(caller, &state.resource).await?;

    client
        .get(&target.namespace, &target.name)
        .await
        .map_err(|err| ApiError::upstream(Phase::Read, &state.resource.kind, err))
}
