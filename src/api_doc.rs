use utoipa::OpenApi;

use crate::error::{ErrorResponse, HealthResponse};
use crate::handlers;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "kube-route-proxy API",
        version = "0.1.0",
        description = "Get, replace and merge-patch namespaced Kubernetes custom resources over plain HTTP"
    ),
    paths(
        handlers::health::health_handler,
        handlers::get::get_handler,
        handlers::put::put_handler,
        handlers::patch::patch_handler
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse
        )
    ),
    tags(
        (name = "health", description = "Health check operations"),
        (name = "resources", description = "Proxied custom resource operations")
    )
)]
pub struct ApiDoc;
