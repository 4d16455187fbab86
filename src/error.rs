//! Error types for the governance gateway.
//!
//! This module defines all error types used throughout the crate. Audit-phase
//! failures keep their precise kind internally so callers can log meaningfully,
//! while [`Error::wire_code`] collapses them for untrusted callers.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Wire code shared by every audit rejection tied to a correlation identifier.
pub const WIRE_AUDIT_REJECTED: &str = "audit_rejected";

/// Main error type for the governance gateway.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (call report, pre-check request, rule document)
    #[error("Validation error: {message}")]
    Validation {
        /// Detailed error message
        message: String,
        /// Field that caused the error, if applicable
        field: Option<String>,
    },

    /// Error while parsing a rule document or enum value
    #[error("Parse error: {message}")]
    Parse {
        /// Detailed error message
        message: String,
    },

    /// No context exists for the correlation identifier
    #[error("Context not found: {correlation_id}")]
    ContextNotFound {
        /// The identifier that was looked up
        correlation_id: String,
    },

    /// The context existed but its expiry timestamp has passed
    #[error("Context expired: {correlation_id}")]
    ContextExpired {
        /// The identifier that was looked up
        correlation_id: String,
    },

    /// The context was already consumed by an earlier audit
    #[error("Context already consumed: {correlation_id}")]
    ContextAlreadyConsumed {
        /// The identifier that was looked up
        correlation_id: String,
    },

    /// An audit was attempted against a blocked pre-check
    #[error("Cannot audit blocked pre-check: {correlation_id}")]
    BlockedContextAudit {
        /// The identifier of the blocked context
        correlation_id: String,
    },

    /// The store already holds an audit record for the correlation identifier
    #[error("Audit record already exists for context: {correlation_id}")]
    DuplicateAudit {
        /// The identifier that was audited twice
        correlation_id: String,
    },

    /// The context store refused a new entry
    #[error("Context store at capacity ({max_entries} entries)")]
    Capacity {
        /// Configured maximum number of live contexts
        max_entries: usize,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Detailed error message
        message: String,
        /// Configuration key that caused the error
        key: Option<String>,
    },

    /// Audit persistence error
    #[error("Storage error in {backend}: {message}")]
    Storage {
        /// Name of the storage backend
        backend: String,
        /// Detailed error message
        message: String,
    },

    /// Integration error with the remote gateway
    #[error("Integration error with {service}: {message}")]
    Integration {
        /// Name of the remote service
        service: String,
        /// Detailed error message
        message: String,
    },

    /// The remote gateway answered with an error body
    #[error("Gateway responded {status} {code}: {message}")]
    Remote {
        /// HTTP status code
        status: u16,
        /// Wire error code from the body
        code: String,
        /// Message from the body
        message: String,
    },

    /// Telemetry/observability error
    #[error("Telemetry error: {message}")]
    Telemetry {
        /// Detailed error message
        message: String,
    },

    /// Timeout error
    #[error("Operation timed out after {duration_ms}ms: {message}")]
    Timeout {
        /// Detailed error message
        message: String,
        /// Duration in milliseconds before timeout
        duration_ms: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error (unexpected condition)
    #[error("Internal error: {message}")]
    Internal {
        /// Detailed error message
        message: String,
    },
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error with field context.
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
        }
    }

    /// Create a context-not-found error.
    pub fn context_not_found(correlation_id: impl Into<String>) -> Self {
        Error::ContextNotFound {
            correlation_id: correlation_id.into(),
        }
    }

    /// Create a context-expired error.
    pub fn context_expired(correlation_id: impl Into<String>) -> Self {
        Error::ContextExpired {
            correlation_id: correlation_id.into(),
        }
    }

    /// Create a context-already-consumed error.
    pub fn context_already_consumed(correlation_id: impl Into<String>) -> Self {
        Error::ContextAlreadyConsumed {
            correlation_id: correlation_id.into(),
        }
    }

    /// Create a blocked-context audit error.
    pub fn blocked_context(correlation_id: impl Into<String>) -> Self {
        Error::BlockedContextAudit {
            correlation_id: correlation_id.into(),
        }
    }

    /// Create a duplicate-audit error.
    pub fn duplicate_audit(correlation_id: impl Into<String>) -> Self {
        Error::DuplicateAudit {
            correlation_id: correlation_id.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: None,
        }
    }

    /// Create a configuration error with key context.
    pub fn config_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Create a storage error.
    pub fn storage(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Storage {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an integration error.
    pub fn integration(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Integration {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a telemetry error.
    pub fn telemetry(message: impl Into<String>) -> Self {
        Error::Telemetry {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>, duration_ms: u64) -> Self {
        Error::Timeout {
            message: message.into(),
            duration_ms,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (worth retrying).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Remote { status, .. } => *status >= 500,
            other => matches!(
                other,
                Error::Storage { .. } | Error::Integration { .. } | Error::Timeout { .. } | Error::Io(_)
            ),
        }
    }

    /// Check if this error is an audit rejection tied to a correlation identifier.
    pub fn is_audit_rejection(&self) -> bool {
        matches!(
            self,
            Error::ContextNotFound { .. }
                | Error::ContextExpired { .. }
                | Error::ContextAlreadyConsumed { .. }
                | Error::BlockedContextAudit { .. }
                | Error::DuplicateAudit { .. }
        )
    }

    /// Get the error category for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::Parse { .. } => "parse",
            Error::ContextNotFound { .. } => "context_not_found",
            Error::ContextExpired { .. } => "context_expired",
            Error::ContextAlreadyConsumed { .. } => "context_already_consumed",
            Error::BlockedContextAudit { .. } => "blocked_context_audit",
            Error::DuplicateAudit { .. } => "duplicate_audit",
            Error::Capacity { .. } => "capacity",
            Error::Config { .. } => "config",
            Error::Storage { .. } => "storage",
            Error::Integration { .. } => "integration",
            Error::Remote { .. } => "remote",
            Error::Telemetry { .. } => "telemetry",
            Error::Timeout { .. } => "timeout",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Yaml(_) => "yaml",
            Error::Internal { .. } => "internal",
        }
    }

    /// Externally visible error code.
    ///
    /// Unknown, expired, already-consumed and blocked contexts share one code so
    /// untrusted callers cannot probe identifier existence or timing.
    pub fn wire_code(&self) -> &'static str {
        match self {
            e if e.is_audit_rejection() => WIRE_AUDIT_REJECTED,
            Error::Validation { .. } | Error::Parse { .. } | Error::Serialization(_) => {
                "invalid_request"
            }
            Error::Capacity { .. } => "precheck_unavailable",
            Error::Storage { .. } | Error::Timeout { .. } => "audit_unavailable",
            _ => "internal_error",
        }
    }

    /// Message safe to return to untrusted callers.
    pub fn wire_message(&self) -> String {
        if self.is_audit_rejection() {
            "audit rejected".to_string()
        } else if matches!(self.wire_code(), "internal_error") {
            "internal error".to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::validation("test error");
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::storage("memory", "unavailable").is_recoverable());
        assert!(Error::integration("gateway", "unavailable").is_recoverable());
        assert!(Error::timeout("test", 5000).is_recoverable());
        assert!(!Error::validation("test").is_recoverable());
        assert!(!Error::context_already_consumed("abc").is_recoverable());

        let rejected = Error::Remote {
            status: 400,
            code: WIRE_AUDIT_REJECTED.to_string(),
            message: "audit rejected".to_string(),
        };
        assert!(!rejected.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::validation_field("invalid value", "usage.total_tokens");
        assert!(err.to_string().contains("invalid value"));
    }

    #[test]
    fn test_audit_rejections_share_wire_code() {
        let errors = [
            Error::context_not_found("a"),
            Error::context_expired("b"),
            Error::context_already_consumed("c"),
            Error::blocked_context("d"),
            Error::duplicate_audit("e"),
        ];

        for err in &errors {
            assert_eq!(err.wire_code(), WIRE_AUDIT_REJECTED);
            assert_eq!(err.wire_message(), "audit rejected");
        }

        // Internal categories stay distinct for logging.
        assert_ne!(errors[0].category(), errors[1].category());
    }

    #[test]
    fn test_wire_code_for_other_errors() {
        assert_eq!(Error::validation("bad").wire_code(), "invalid_request");
        assert_eq!(Error::storage("jsonl", "disk full").wire_code(), "audit_unavailable");
        assert_eq!(Error::Capacity { max_entries: 10 }.wire_code(), "precheck_unavailable");
        assert_eq!(Error::internal("boom").wire_code(), "internal_error");
        assert_eq!(Error::internal("boom").wire_message(), "internal error");
    }
}
