use std::fmt::Debug;
use std::fmt::Display;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::baas::{account::AuthError, databases::DbError, storage::StorageError};
use crate::helpers::retry::Retryable;

/// Errors returned by every service operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("not signed in")]
    Unauthorized,
    #[error("not allowed: {0}")]
    Forbidden(String),
    #[error("{succeeded} operations succeeded, {failed} failed")]
    PartialFailure { succeeded: usize, failed: usize },
    #[error("backend call failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::PartialFailure { .. } => StatusCode::MULTI_STATUS,
            ServiceError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl Retryable for ServiceError {
    fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Backend(_))
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { ref collection, id } => {
                ServiceError::NotFound(format!("document {id} in {collection}"))
            }
            DbError::Conflict { .. } => ServiceError::Conflict(err.to_string()),
            DbError::Unavailable(_) => ServiceError::Backend(Box::new(err)),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ServiceError::NotFound(format!("file {id}")),
            StorageError::Empty => ServiceError::Validation(err.to_string()),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmailTaken(_) => ServiceError::Conflict(err.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidSession => ServiceError::Unauthorized,
            AuthError::NoAccount(id) => ServiceError::NotFound(format!("account {id}")),
            AuthError::Hashing => ServiceError::Backend(Box::new(err)),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

pub struct AppError {
    pub inner: anyhow::Error,
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self
            .inner
            .downcast_ref::<ServiceError>()
            .map(ServiceError::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = ?self.inner, "request failed");
        }

        (status, Json(json!({ "error": self.inner.to_string() }))).into_response()
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self { inner: err.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn db_errors_keep_their_meaning() {
        let id = Uuid::now_v7();
        let err: ServiceError = DbError::NotFound {
            collection: "posts".into(),
            id,
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), format!("document {id} in posts not found"));

        let err: ServiceError = DbError::Unavailable("posts".into()).into();
        assert!(err.is_retryable());
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn app_error_uses_service_status() {
        let res = AppError::from(ServiceError::Unauthorized).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = AppError::from(anyhow::anyhow!("boom")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
