//! Submission outcomes returned by strategies
//!
//! An outcome is either a success receipt (optionally carrying the
//! destination's case-management ID and status-tracking number) or a list of
//! structured errors. A rejected submission is an expected business result,
//! not a Rust error: strategies return `Ok(SubmissionOutcome::Failure { .. })`.

use crate::error::sanitize_error_message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A structured validation or transport error reported for a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SubmissionError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            code: None,
            message: message.into(),
            description: None,
        }
    }

    /// Error with a machine-readable code
    pub fn coded<C: Into<String>, S: Into<String>>(code: C, message: S) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            description: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<&str> for SubmissionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for SubmissionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{code}] ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(description) = &self.description {
            write!(f, ": {description}")?;
        }
        Ok(())
    }
}

/// Tracking handles returned by a destination that accepted a submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_management_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

impl SubmissionReceipt {
    /// Build a receipt, treating blank values as absent
    pub fn new(case_management_id: Option<String>, tracking_number: Option<String>) -> Self {
        Self {
            case_management_id: non_blank(case_management_id),
            tracking_number: non_blank(tracking_number),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Result of one strategy invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Success(SubmissionReceipt),
    Failure { errors: Vec<SubmissionError> },
}

impl SubmissionOutcome {
    /// Success without tracking handles
    pub fn accepted() -> Self {
        Self::Success(SubmissionReceipt::default())
    }

    pub fn success(receipt: SubmissionReceipt) -> Self {
        Self::Success(receipt)
    }

    /// Failure carrying the given errors; an empty list still yields one
    /// generic error so a failed request never has an empty error payload.
    pub fn failure(errors: Vec<SubmissionError>) -> Self {
        if errors.is_empty() {
            return Self::Failure {
                errors: vec![SubmissionError::new(
                    "destination rejected the submission without details",
                )],
            };
        }
        Self::Failure { errors }
    }

    pub fn failure_with(error: SubmissionError) -> Self {
        Self::Failure {
            errors: vec![error],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        match self {
            Self::Success(receipt) => Some(receipt),
            Self::Failure { .. } => None,
        }
    }

    /// Errors recorded for this submission (empty on success)
    pub fn submission_errors(&self) -> &[SubmissionError] {
        match self {
            Self::Success(_) => &[],
            Self::Failure { errors } => errors,
        }
    }

    /// Decode a destination response body.
    ///
    /// Accepts `{"success": true, "id": .., "status_tracking_number": ..}` and
    /// `{"success": false, "errors": [..]}` where each error is a string or an
    /// object with `code`/`response_code`, `message` and `description`. A body
    /// without `success` is a success unless it lists errors.
    ///
    /// Decoding is field by field: a malformed error entry or tracking field
    /// never overrides an explicit `"success": false`. Returns `None` when the
    /// body is not a JSON object.
    pub fn from_response(body: &Value) -> Option<Self> {
        let fields = body.as_object()?;
        let errors = match fields.get("errors") {
            Some(value) => decode_errors(value),
            None => Some(Vec::new()),
        };

        let success = match fields.get("success").and_then(read_flag) {
            Some(flag) => flag,
            None => matches!(&errors, Some(list) if list.is_empty()),
        };

        if success {
            return Some(Self::Success(SubmissionReceipt::new(
                fields.get("id").and_then(scalar_text),
                fields.get("status_tracking_number").and_then(scalar_text),
            )));
        }

        Some(match errors {
            Some(errors) => Self::failure(errors),
            None => Self::failure_with(invalid_response(body)),
        })
    }
}

/// Code attached when a destination's rejection cannot be decoded
pub const INVALID_RESPONSE_CODE: &str = "invalid_response";

fn invalid_response(body: &Value) -> SubmissionError {
    SubmissionError::coded(
        INVALID_RESPONSE_CODE,
        "destination rejected the submission with an unreadable error list",
    )
    .with_description(sanitize_error_message(&body.to_string()))
}

fn read_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => text.trim().to_ascii_lowercase().parse().ok(),
        _ => None,
    }
}

/// Identifier-like values: strings and numbers
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Free-text values; anything that is not a string is rendered as JSON
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// `None` when `errors` has a shape no destination should send
fn decode_errors(value: &Value) -> Option<Vec<SubmissionError>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => Some(items.iter().filter_map(decode_error).collect()),
        Value::String(_) | Value::Object(_) => decode_error(value).map(|error| vec![error]),
        _ => None,
    }
}

fn decode_error(item: &Value) -> Option<SubmissionError> {
    match item {
        Value::Null => None,
        Value::String(message) => Some(SubmissionError::new(message.clone())),
        Value::Object(fields) => {
            let code = fields
                .get("code")
                .and_then(scalar_text)
                .or_else(|| fields.get("response_code").and_then(scalar_text));
            Some(SubmissionError {
                code,
                message: fields
                    .get("message")
                    .and_then(text_of)
                    .unwrap_or_else(|| "unspecified error".to_string()),
                description: fields.get("description").and_then(text_of),
            })
        }
        other => Some(SubmissionError::new(other.to_string())),
    }
}
