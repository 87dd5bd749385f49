use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt::Display;

use crate::store::StoreError;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub fn internal_error(err: impl Display) -> AppError {
    tracing::error!(error = %err, "internal error");
    AppError::internal("Internal server error")
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "rejected request body");
        AppError::bad_request(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        map_store_error(err)
    }
}

pub fn map_store_error(err: StoreError) -> AppError {
    let status = match &err {
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::InvalidReference(_) => StatusCode::BAD_REQUEST,
        StoreError::Database(sqlx::Error::Database(db)) => match db.code().as_deref() {
            Some("23505") => StatusCode::CONFLICT,    // unique_violation
            Some("23503") => StatusCode::BAD_REQUEST, // foreign_key_violation
            Some("23502") => StatusCode::BAD_REQUEST, // not_null_violation
            Some("22P02") => StatusCode::BAD_REQUEST, // invalid_text_representation
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    tracing::error!(error = %err, status = %status, "store error");

    let message = match status {
        StatusCode::CONFLICT => match &err {
            StoreError::Conflict(message) => message.clone(),
            _ => "Resource already exists".to_string(),
        },
        StatusCode::BAD_REQUEST => match &err {
            StoreError::InvalidReference(message) => message.clone(),
            _ => "Invalid request".to_string(),
        },
        _ => format!("Database error: {err}"),
    };

    AppError::new(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failures_surface_the_store_message() {
        let err = map_store_error(StoreError::Backend("connection reset".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("connection reset"));
    }

    #[test]
    fn conflicts_keep_their_message() {
        let err = map_store_error(StoreError::Conflict("Campus already exists".to_string()));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "Campus already exists");
    }

    #[tokio::test]
    async fn error_body_is_json() {
        let response = AppError::not_found("Device not found.").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Device not found.");
    }
}
