use sea_orm::error::DbErr;
use serde::Serialize;

/// Errors raised by the tax adapter.
///
/// The first five variants mirror the failure modes a caller has to tell
/// apart: missing credentials, an address the provider rejected, a
/// transport failure, a structured provider error, and a request that could
/// not be built at all because no destination address resolved.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Address missing: {0}")]
    AddressMissing(String),

    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Whether the failure is transient and an idempotent call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::TransportError(_))
    }

    /// Short machine-readable name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::ConfigurationError(_) => "configuration",
            ServiceError::ValidationError(_) => "validation",
            ServiceError::TransportError(_) => "transport",
            ServiceError::ProviderError(_) => "provider",
            ServiceError::AddressMissing(_) => "address_missing",
            ServiceError::DatabaseError(_) => "database",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::SerializationError(_) => "serialization",
            ServiceError::InternalError(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::TransportError(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ServiceError::TransportError(format!("unreadable response body: {}", err))
        } else {
            ServiceError::TransportError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<url::ParseError> for ServiceError {
    fn from(err: url::ParseError) -> Self {
        ServiceError::ConfigurationError(format!("invalid provider URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(ServiceError::TransportError("timeout".into()).is_retryable());
        assert!(!ServiceError::ProviderError("bad field".into()).is_retryable());
        assert!(!ServiceError::ConfigurationError("no key".into()).is_retryable());
    }

    #[test]
    fn display_includes_category() {
        let err = ServiceError::AddressMissing("no destination".into());
        assert_eq!(err.to_string(), "Address missing: no destination");
        assert_eq!(err.kind(), "address_missing");
    }
}
