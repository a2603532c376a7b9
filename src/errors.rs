use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::astrometry::AstrometryError;
use crate::immich::ImmichError;
use crate::services::sync::SyncError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    /// Immich or Astrometry.net failed or rejected the request
    #[error("Upstream error: {0}")]
    Upstream(String),
    /// A feature is switched off or not configured
    #[error("{0}")]
    Unavailable(String),
}

impl From<ImmichError> for ApiError {
    fn from(err: ImmichError) -> Self {
        match err {
            ImmichError::NotFound(_) => ApiError::NotFound("Immich asset"),
            other => ApiError::Upstream(format!("Immich: {}", other)),
        }
    }
}

impl From<AstrometryError> for ApiError {
    fn from(err: AstrometryError) -> Self {
        ApiError::Upstream(format!("Astrometry.net: {}", err))
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AlreadyRunning => ApiError::Conflict(err.to_string()),
            SyncError::Immich(ImmichError::NotConfigured) => {
                ApiError::Unavailable("Immich is not configured".to_string())
            }
            SyncError::Immich(e) => e.into(),
            SyncError::Internal(e) => ApiError::Database(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Database(err) => {
                error!("Internal error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
