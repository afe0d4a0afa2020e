//! Error types for submission relaying
//!
//! Expected business results (a destination rejecting a submission) are not
//! errors; they are `SubmissionOutcome::Failure`. Everything here aborts or
//! degrades a processing attempt and is reported to the queue worker.

use crate::model::{RequestId, RequestStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Kind of entity a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Request,
    Destination,
    RawRecord,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Request => "Submission request",
            EntityKind::Destination => "Destination",
            EntityKind::RawRecord => "Raw submission record",
        })
    }
}

/// Main error type for relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("No submission strategy for destination {destination_id} (format '{format}')")]
    UnsupportedDestination {
        destination_id: String,
        format: String,
    },

    #[error("Duplicate submission strategy for format '{format}'")]
    DuplicateStrategy { format: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Request {request_id} changed concurrently: expected status {expected}, found {found}")]
    Conflict {
        request_id: RequestId,
        expected: RequestStatus,
        found: RequestStatus,
    },

    #[error("Raw record cleanup failed for {raw_record_id}: {message}")]
    RawRecordCleanup {
        raw_record_id: String,
        message: String,
    },

    #[error("Strategy '{strategy}' failed: {message}")]
    Strategy { strategy: String, message: String },

    #[error("Queue error: {message}")]
    Queue { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl RelayError {
    /// Create not found error
    pub fn not_found<S: Into<String>>(entity: EntityKind, id: S) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create unsupported destination error
    pub fn unsupported_destination<D: Into<String>, F: Into<String>>(
        destination_id: D,
        format: F,
    ) -> Self {
        Self::UnsupportedDestination {
            destination_id: destination_id.into(),
            format: format.into(),
        }
    }

    /// Create storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create strategy error
    pub fn strategy<N: Into<String>, S: Into<String>>(strategy: N, message: S) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    /// Create queue error
    pub fn queue<S: Into<String>>(message: S) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Whether redelivering the task can plausibly succeed.
    ///
    /// Missing entities, unsupported destinations and lost races need data or
    /// operator changes; retrying them only burns deliveries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Storage { .. } | RelayError::Strategy { .. } | RelayError::Queue { .. }
        )
    }

    /// Error message safe to log or persist
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::storage(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::storage(format!("Malformed record: {e}"))
    }
}

const MAX_MESSAGE_LEN: usize = 500;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern compiles")
});

static SECRET_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("secret path pattern compiles")
});

/// Sanitize error messages before they are logged or stored on a request
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SECRET_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    // Truncate very long messages - ensure total length is <= 500
    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_entity() {
        let error = RelayError::not_found(EntityKind::Destination, "D9");
        assert_eq!(error.to_string(), "Destination not found: D9");
    }

    #[test]
    fn test_unsupported_destination_message() {
        let error = RelayError::unsupported_destination("D4", "fax");
        assert!(error.to_string().contains("D4"));
        assert!(error.to_string().contains("'fax'"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RelayError::storage("disk full").is_retryable());
        assert!(RelayError::strategy("api", "panic").is_retryable());
        assert!(RelayError::queue("closed").is_retryable());

        assert!(!RelayError::not_found(EntityKind::Request, "R1").is_retryable());
        assert!(!RelayError::unsupported_destination("D1", "fax").is_retryable());
        assert!(!RelayError::Conflict {
            request_id: RequestId::new("R1"),
            expected: RequestStatus::Pending,
            found: RequestStatus::Submitted,
        }
        .is_retryable());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(RelayError::from(io), RelayError::Storage { .. }));
    }

    #[test]
    fn test_error_message_sanitization() {
        let sanitized =
            sanitize_error_message("Failed to authenticate: password=secret123 token=abc456");

        assert!(!sanitized.contains("secret123"));
        assert!(!sanitized.contains("abc456"));
        assert!(sanitized.contains("password=***"));
        assert!(sanitized.contains("token=***"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));

        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_file_path_redaction() {
        let sanitized =
            sanitize_error_message("Failed to read /home/user/.ssh/id_rsa and /etc/secrets/api.key");

        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("/home/user/.ssh/id_rsa"));
    }

    #[test]
    fn test_sanitize_exactly_500_chars() {
        let message = "x".repeat(500);
        let sanitized = sanitize_error_message(&message);
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_sanitize_empty_message() {
        assert_eq!(sanitize_error_message(""), "");
    }
}
