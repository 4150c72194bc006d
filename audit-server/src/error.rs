//! Service-layer error type for the audit server
//!
//! `AuditError` covers the two error families the pipeline produces:
//!
//! - validation errors, returned synchronously from `record`
//! - store errors, raised inside a flush and recovered there (rollback + requeue)
//!
//! It converts into the shared `AppError` so HTTP handlers can use `?`.

use std::time::Duration;

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Category name outside the fixed set
    #[error("unknown audit category '{0}'")]
    UnknownCategory(String),

    /// Action not in the category's closed set
    #[error("action '{action}' is not valid for category '{category}'")]
    InvalidAction { category: String, action: String },

    /// System entries never carry actor identity
    #[error("system entries cannot carry an actor")]
    ActorNotAllowed,

    /// Datastore / driver failure
    #[error("audit store error: {0}")]
    Store(#[source] BoxError),

    /// A store step exceeded its bound
    #[error("audit store operation '{op}' timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

impl AuditError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownCategory(_) | Self::InvalidAction { .. } | Self::ActorNotAllowed
        )
    }
}

impl From<sqlx::Error> for AuditError {
    fn from(e: sqlx::Error) -> Self {
        AuditError::Store(e.into())
    }
}

impl From<AuditError> for AppError {
    fn from(e: AuditError) -> Self {
        match &e {
            AuditError::UnknownCategory(category) => {
                AppError::with_message(ErrorCode::InvalidAuditAction, e.to_string())
                    .with_detail("category", category.clone())
            }
            AuditError::InvalidAction { category, action } => {
                AppError::with_message(ErrorCode::InvalidAuditAction, e.to_string())
                    .with_detail("category", category.clone())
                    .with_detail("action", action.clone())
            }
            AuditError::ActorNotAllowed => AppError::new(ErrorCode::ActorNotAllowed),
            AuditError::Store(err) => {
                tracing::error!(error = %err, "Audit store error");
                AppError::new(ErrorCode::DatabaseError)
            }
            AuditError::Timeout { .. } => AppError::with_message(ErrorCode::Timeout, e.to_string()),
        }
    }
}

impl IntoResponse for AuditError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = AuditError::InvalidAction {
            category: "system".into(),
            action: "login".into(),
        };
        assert!(err.is_validation());
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::InvalidAuditAction);
        assert_eq!(app.http_status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_errors_are_not_validation() {
        let err = AuditError::Store("connection reset".into());
        assert!(!err.is_validation());
        let app: AppError = err.into();
        assert_eq!(app.code, ErrorCode::DatabaseError);
    }
}
