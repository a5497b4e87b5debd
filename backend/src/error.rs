use crate::auth_provider::AuthError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Auth provider error: {0}")]
    AuthProvider(#[from] AuthError),

    #[error("Internal Server Error")]
    Anyhow(#[from] anyhow::Error),

    #[error("{error}")]
    Hinted { error: Box<AppError>, hint: String },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn insufficient_permissions() -> Self {
        Self::forbidden("Insufficient permissions")
    }

    /// Attach a client-facing hint, rendered next to `error` in the body.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        Self::Hinted {
            error: Box::new(self),
            hint: hint.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::AuthProvider(_) | AppError::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Hinted { error, .. } => error.status(),
        }
    }

    fn client_message(&self) -> String {
        match self {
            AppError::BadRequest(m)
            | AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m) => m.clone(),
            AppError::Database(_) | AppError::AuthProvider(_) | AppError::Anyhow(_) => {
                "Internal server error".to_string()
            }
            AppError::Hinted { error, .. } => error.client_message(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
            .with_hint("Send a JSON body with Content-Type: application/json")
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Database(e) => error!(error = ?e, "database error"),
            AppError::AuthProvider(e) => error!(error = ?e, "auth provider error"),
            AppError::Anyhow(e) => error!(error = ?e, "system error"),
            other => debug!(%status, error = %other, "request rejected"),
        }

        let mut body = json!({
            "error": self.client_message(),
        });
        if let AppError::Hinted { hint, .. } = &self {
            body["hint"] = json!(hint);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let (status, body) = body_json(AppError::not_found("Post not found")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Post not found" }));
    }

    #[tokio::test]
    async fn server_errors_hide_the_cause() {
        let (status, body) = body_json(AppError::Database(sqlx::Error::RowNotFound)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn hints_are_rendered_next_to_the_error() {
        let err = AppError::unauthorized("No token provided").with_hint("Add a bearer token");
        assert_eq!(err.to_string(), "No token provided");

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "No token provided");
        assert_eq!(body["hint"], "Add a bearer token");
    }
}
