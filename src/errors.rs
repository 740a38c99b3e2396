use http::StatusCode;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

/// Error body handed to whatever transport sits in front of the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Conflict", "Bad Request")
    pub error: String,
    /// Machine-readable error code (e.g., "unit_unavailable")
    pub code: String,
    /// Human-readable reason, specific for domain errors
    pub message: String,
    /// RFC 3339 timestamp when the error was produced
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Unit unavailable: {0}")]
    UnitUnavailable(String),

    #[error("Invalid lead state: {0}")]
    InvalidLeadState(String),

    #[error("Invalid cart state: {0}")]
    InvalidCartState(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InvalidTransition(_)
            | Self::UnitUnavailable(_)
            | Self::InvalidLeadState(_)
            | Self::InvalidCartState(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::UnitUnavailable(_) => "unit_unavailable",
            Self::InvalidLeadState(_) => "invalid_lead_state",
            Self::InvalidCartState(_) => "invalid_cart_state",
            Self::Forbidden(_) => "forbidden",
            Self::SerializationError(_) => "serialization_error",
            Self::InternalError(_) => "internal_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for operators and shoppers.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::NotFound(msg)
            | Self::ValidationError(msg)
            | Self::InvalidTransition(msg)
            | Self::UnitUnavailable(msg)
            | Self::InvalidLeadState(msg)
            | Self::InvalidCartState(msg)
            | Self::Forbidden(msg) => msg.clone(),
        }
    }

    /// Whether the caller may reasonably retry the same request.
    ///
    /// Losing a race for a unit is retryable (with a different unit or after a refresh);
    /// state-machine violations are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UnitUnavailable(_) | Self::DatabaseError(_))
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        let status = self.status_code();
        ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::UnitUnavailable("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InvalidLeadState("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::db_error("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_keep_their_reason() {
        let err = ServiceError::UnitUnavailable("Unit already reserved".into());
        assert_eq!(err.response_message(), "Unit already reserved");
        assert_eq!(err.code(), "unit_unavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn internal_errors_are_masked() {
        let err = ServiceError::db_error("relation \"units\" does not exist");
        assert_eq!(err.response_message(), "Database error");

        let err = ServiceError::Other(anyhow::anyhow!("secret detail"));
        let body = err.to_error_response();
        assert_eq!(body.message, "Internal server error");
        assert_eq!(body.error, "Internal Server Error");
    }

    #[test]
    fn transition_errors_are_not_retryable() {
        assert!(!ServiceError::InvalidTransition("SOLD -> AVAILABLE".into()).is_retryable());
        assert!(!ServiceError::InvalidCartState("submitted".into()).is_retryable());
    }
}
