// Route path constants and router assembly

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::Request,
    middleware,
    routing::{MethodRouter, get},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::api_doc::ApiDoc;
use crate::cors::cors;
use crate::handlers::{get_handler, health_handler, patch_handler, put_handler};
use crate::resource::ServedResource;
use crate::state::AppState;
use crate::upstream::ClientFactory;

pub const HEALTH: &str = "/health";
pub const RESOURCE_ITEM: &str = "/{resource}/{namespace}/{name}";
pub const SWAGGER_UI: &str = "/swagger-ui";
pub const OPENAPI_JSON: &str = "/api-docs/openapi.json";

/// Non-empty segments of a URL path, so repeated, leading and trailing
/// slashes collapse.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn resource_methods() -> MethodRouter<AppState> {
    get(get_handler).put(put_handler).patch(patch_handler)
}

/// Routes for one resource type. Everything under the prefix reaches the
/// handlers so that malformed paths get a 400 instead of a 404.
fn resource_router(resource: ServedResource, clients: Arc<dyn ClientFactory>) -> Router {
    let base = format!("/{}", resource.path_prefix);
    Router::new()
        .route(&base, resource_methods())
        .route(&format!("{base}/"), resource_methods())
        .route(&format!("{base}/{{*rest}}"), resource_methods())
        .with_state(AppState::new(resource, clients))
}

pub fn router(resources: &[ServedResource], clients: Arc<dyn ClientFactory>) -> Router {
    let mut app = Router::new().route(HEALTH, get(health_handler));

    for resource in resources {
        app = app.merge(resource_router(resource.clone(), clients.clone()));
    }

    app.merge(SwaggerUi::new(SWAGGER_UI).url(OPENAPI_JSON, ApiDoc::openapi()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(middleware::from_fn(cors))
}
