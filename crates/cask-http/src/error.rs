//! Translates [`CaskError`]/[`ClusterError`] into HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cask_cluster::ClusterError;
use cask_core::CaskError;
use serde_json::json;

pub struct ApiError(pub CaskError);

impl From<CaskError> for ApiError {
    fn from(e: CaskError) -> Self {
        Self(e)
    }
}

impl From<ClusterError> for ApiError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::Core(inner) => Self(inner),
            other => Self(CaskError::Internal(other.to_string())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": self.0.to_string(), "code": self.0.code() }));
        (status, body).into_response()
    }
}
