// Application error hierarchy. Every variant maps onto an HTTP status code
// and a stable machine-readable code so that any front end (CLI today, an
// HTTP API tomorrow) renders failures the same way.

use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed for `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited by upstream service")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("external service {service} failed: {message}")]
    ExternalService { service: String, message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        AppError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Unauthorized(_) => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict(_) => 409,
            AppError::RateLimited { .. } => 429,
            AppError::ExternalService { .. } => 502,
            AppError::Database(_) | AppError::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Operational errors are expected failures caused by input or by the
    /// outside world. Non-operational errors indicate a bug or a broken
    /// environment.
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Database(_) | AppError::Internal(_))
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                status: self.status_code(),
            },
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {e}"))
    }
}

/// JSON error envelope: `{ "error": { "code", "message", "status" } }`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub status: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_http_semantics() {
        let cases: Vec<(AppError, u16, &str)> = vec![
            (AppError::validation("name", "empty"), 400, "VALIDATION_ERROR"),
            (AppError::Unauthorized("no key".into()), 401, "UNAUTHORIZED"),
            (AppError::Forbidden("nope".into()), 403, "FORBIDDEN"),
            (AppError::not_found("ai_system", "x"), 404, "NOT_FOUND"),
            (AppError::Conflict("dup".into()), 409, "CONFLICT"),
            (AppError::RateLimited { retry_after_secs: Some(3) }, 429, "RATE_LIMITED"),
            (
                AppError::ExternalService {
                    service: "gemini".into(),
                    message: "boom".into(),
                },
                502,
                "EXTERNAL_SERVICE_ERROR",
            ),
            (AppError::Database("locked".into()), 500, "DATABASE_ERROR"),
            (AppError::Internal("bug".into()), 500, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn only_database_and_internal_are_non_operational() {
        assert!(AppError::not_found("ai_system", "1").is_operational());
        assert!(AppError::RateLimited { retry_after_secs: None }.is_operational());
        assert!(!AppError::Database("x".into()).is_operational());
        assert!(!AppError::Internal("x".into()).is_operational());
    }

    #[test]
    fn body_serializes_to_error_envelope() {
        let err = AppError::not_found("ai_system", "abc");
        let json = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["status"], 404);
        assert_eq!(json["error"]["message"], "ai_system not found: abc");
    }

    #[test]
    fn rusqlite_errors_become_database_errors() {
        let err: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}
