use crate::error::{ApiError, ErrorResponse, Phase};
use crate::handlers::{ResourcePath, proxied};
use crate::identity::CallerIdentity;
use crate::routes;
use crate::state::AppState;
use axum::{Json, body::Bytes, extract::State, http::Uri};
use serde_json::{Map, Value as JsonValue};

/// PUT /{resource}/{namespace}/{name} handler - Replace an object
///
/// The body is a full object. Its `metadata.name` and `metadata.namespace`
/// are overwritten from the path, and `metadata.resourceVersion` is taken
/// from a fresh read of the live object, so the update only succeeds if
/// nothing changed in between.
#[utoipa::path(
    put,
    path = routes::RESOURCE_ITEM,
    params(
        ("resource" = String, Path, description = "Configured resource prefix, e.g. httproute"),
        ("namespace" = String, Path, description = "Namespace of the object"),
        ("name" = String, Path, description = "Name of the object"),
        ("Authorization" = Option<String>, Header, description = "Bearer token forwarded to the API server"),
        ("X-User" = Option<String>, Header, description = "Caller name for audit logs only")
    ),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated object", body = serde_json::Value),
        (status = 400, description = "Malformed path or body", body = ErrorResponse),
        (status = 403, description = "Denied by cluster RBAC", body = ErrorResponse),
        (status = 404, description = "Object not found", body = ErrorResponse),
        (status = 409, description = "Object changed during the update", body = ErrorResponse),
        (status = 500, description = "Client or update failure", body = ErrorResponse)
    ),
    tag = "resources"
)]
pub async fn put_handler(
    State(state): State<AppState>,
    caller: CallerIdentity,
    uri: Uri,
    body: Bytes,
) -> Result<Json<JsonValue>, ApiError> {
    proxied("PUT", &uri, &caller, replace_object(&state, &caller, &uri, body)).await
}

async fn replace_object(
    state: &AppState,
    caller: &CallerIdentity,
    uri: &Uri,
    body: Bytes,
) -> Result<JsonValue, ApiError> {
    let target = ResourcePath::parse(uri.path(), &state.resource)?;

    let JsonValue::Object(mut object) = serde_json::from_slice::<JsonValue>(&body)? else {
        return Err(ApiError::InvalidBody("expected a JSON object".to_string()));
    };

    let client = state.clients.client_for(caller, &state.resource).await?;
    let kind = &state.resource.kind;

    let current = client
        .get(&target.namespace, &target.name)
        .await
        .map_err(|err| ApiError::upstream(Phase::Read, kind, err))?;
    let resource_version = current
        .pointer("/metadata/resourceVersion")
        .and_then(JsonValue::as_str);

    inject_metadata(&mut object, &target, resource_version);
    let object = JsonValue::Object(object);
    tracing::debug!("Updating {} with body: {}", kind, object);

    client
        .replace(&target.namespace, &target.name, object)
        .await
        .map_err(|err| ApiError::upstream(Phase::Update, kind, err))
}

/// Points the body at the target object and pins the version it was read at.
fn inject_metadata(
    object: &mut Map<String, JsonValue>,
    target: &ResourcePath,
    resource_version: Option<&str>,
) {
    let metadata = object
        .entry("metadata")
        .or_insert_with(|| JsonValue::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = JsonValue::Object(Map::new());
    }
    let Some(metadata) = metadata.as_object_mut() else {
        return;
    };

    metadata.insert("name".to_string(), JsonValue::from(target.name.as_str()));
    metadata.insert(
        "namespace".to_string(),
        JsonValue::from(target.namespace.as_str()),
    );
    match resource_version {
        Some(version) => {
            metadata.insert("resourceVersion".to_string(), JsonValue::from(version));
        }
        None => {
            metadata.remove("resourceVersion");
        }
    }
}
