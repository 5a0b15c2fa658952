//! HTTP error mapping.

use crate::error::AppError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use labres_core::LabError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Lab(LabError),
    BadRequest(String),
    Unauthorized,
    RateLimited,
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Lab(err) => lab_status(err),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Lab(err) => err.to_string(),
            Self::BadRequest(msg) | Self::Internal(msg) => msg.clone(),
            Self::Unauthorized => "missing or invalid api key".to_string(),
            Self::RateLimited => "too many requests".to_string(),
        }
    }
}

fn lab_status(err: &LabError) -> StatusCode {
    match err {
        LabError::NotFound { .. } => StatusCode::NOT_FOUND,
        LabError::AlreadyExists { .. }
        | LabError::ReturnAlreadyRequested(_)
        | LabError::InvalidTransition(_)
        | LabError::EquipmentUnavailable { .. } => StatusCode::CONFLICT,
        LabError::Storage(_) | LabError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl From<LabError> for ApiError {
    fn from(err: LabError) -> Self {
        Self::Lab(err)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Lab(e) => Self::Lab(e),
            AppError::Input(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.message(), "request failed");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
