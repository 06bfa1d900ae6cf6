use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::upstream::{ClientError, UpstreamError, UpstreamReason};

/// Error response type
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response type for health check endpoint
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Which upstream call failed.
///
/// Unclassified failures while reading are reported as not found; on
/// update or patch they are internal errors. A patch never reports 404.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Read,
    Update,
    Patch,
}

/// Custom error type for the proxy endpoints
///
/// Maps each failure to an HTTP status code and a JSON error body.
#[derive(Debug)]
pub enum ApiError {
    /// Path is not `/{prefix}/{namespace}/{name}`
    BadPath { prefix: String, path: String },
    /// Request body could not be used
    InvalidBody(String),
    /// No usable cluster client for this caller
    ClientConstruction(ClientError),
    /// The API server call failed
    Upstream {
        phase: Phase,
        kind: String,
        source: UpstreamError,
    },
}

impl ApiError {
    pub fn upstream(phase: Phase, kind: &str, source: UpstreamError) -> Self {
        ApiError::Upstream {
            phase,
            kind: kind.to_string(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadPath { .. } | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::ClientConstruction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream { phase, source, .. } => match (source.reason, phase) {
                (UpstreamReason::Forbidden, _) => StatusCode::FORBIDDEN,
                (UpstreamReason::Conflict, _) => StatusCode::CONFLICT,
                (UpstreamReason::NotFound, Phase::Read | Phase::Update) => StatusCode::NOT_FOUND,
                (UpstreamReason::Internal, Phase::Read) => StatusCode::NOT_FOUND,
                (UpstreamReason::NotFound | UpstreamReason::Internal, _) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadPath { prefix, path } => write!(
                f,
                "Usage: /{}/{{namespace}}/{{name}}, got '{}'",
                prefix, path
            ),
            ApiError::InvalidBody(msg) => write!(f, "Invalid JSON body: {}", msg),
            ApiError::ClientConstruction(err) => write!(f, "Failed to create k8s client: {}", err),
            ApiError::Upstream {
                phase,
                kind,
                source,
            } => match (source.reason, phase) {
                // Upstream RBAC messages name users and groups; keep them out of the body.
                (UpstreamReason::Forbidden, _) => write!(f, "Forbidden: not authorized"),
                (UpstreamReason::Conflict, _) => write!(
                    f,
                    "Conflict updating {}: {}; re-read the object and retry",
                    kind, source
                ),
                (_, Phase::Read) => write!(f, "Failed to get {}: {}", kind, source),
                (_, Phase::Update) => write!(f, "Failed to update {}: {}", kind, source),
                (_, Phase::Patch) => write!(f, "Failed to patch {}: {}", kind, source),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (self.status(), body).into_response()
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        ApiError::ClientConstruction(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidBody(err.to_string())
    }
}
