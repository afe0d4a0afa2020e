//! Email submission strategy
//!
//! Renders the request into a plain-text message addressed to the
//! destination's mailbox and hands it to a `Mailer`. The shipped
//! `SpoolMailer` drops each message into a directory for an outbound mail
//! agent to pick up.

use super::SubmissionStrategy;
use crate::error::{sanitize_error_message, RelayResult};
use crate::model::{Destination, RequestId, SubmissionError, SubmissionOutcome, SubmissionRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// A rendered outgoing message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub request_id: RequestId,
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Mail delivery errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail spool write failed: {0}")]
    Spool(#[from] std::io::Error),
    #[error("Message encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Mail rejected: {0}")]
    Rejected(String),
}

/// Outbound mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Mailer that writes one JSON file per message into a spool directory
#[derive(Debug, Clone)]
pub struct SpoolMailer {
    spool_dir: PathBuf,
}

impl SpoolMailer {
    pub fn new(spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
        }
    }

    pub fn spool_dir(&self) -> &PathBuf {
        &self.spool_dir
    }
}

#[async_trait]
impl Mailer for SpoolMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        fs::create_dir_all(&self.spool_dir).await?;

        let file_name = format!(
            "{}-{}.json",
            message.created_at.format("%Y%m%dT%H%M%S%.3fZ"),
            uuid::Uuid::new_v4()
        );
        let path = self.spool_dir.join(file_name);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_vec_pretty(message)?).await?;
        fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), to = %message.to, "Spooled submission email");
        Ok(())
    }
}

/// Strategy for destinations that receive submissions by email
pub struct EmailSubmissionStrategy {
    mailer: Arc<dyn Mailer>,
    from_address: String,
}

impl EmailSubmissionStrategy {
    pub fn new(mailer: Arc<dyn Mailer>, from_address: impl Into<String>) -> Self {
        Self {
            mailer,
            from_address: from_address.into(),
        }
    }

    /// Render a request into a message (pure function)
    pub fn render_message(
        request: &SubmissionRequest,
        destination: &Destination,
        to: &str,
        from: &str,
        now: DateTime<Utc>,
    ) -> EmailMessage {
        let subject = if destination.name.is_empty() {
            format!("Submission {}", request.id)
        } else {
            format!("Submission {} for {}", request.id, destination.name)
        };

        let mut body = format!("Request ID: {}\n\n", request.id);
        body.push_str(&render_form_values(&request.form_values));

        EmailMessage {
            request_id: request.id.clone(),
            to: to.to_string(),
            from: from.to_string(),
            subject,
            body,
            created_at: now,
        }
    }
}

/// One `key: value` line per form field, sorted by key
fn render_form_values(values: &serde_json::Value) -> String {
    match values {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|key| format!("{key}: {}\n", render_scalar(&map[key])))
                .collect()
        }
        serde_json::Value::Null => String::new(),
        other => format!("{}\n", render_scalar(other)),
    }
}

fn render_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SubmissionStrategy for EmailSubmissionStrategy {
    fn name(&self) -> &str {
        "email"
    }

    async fn submit(
        &self,
        request: &SubmissionRequest,
        destination: &Destination,
    ) -> RelayResult<SubmissionOutcome> {
        let Some(to) = destination
            .email_address
            .as_deref()
            .filter(|address| !address.trim().is_empty())
        else {
            return Ok(SubmissionOutcome::failure_with(SubmissionError::coded(
                "missing_email_address",
                format!("destination {} has no submission email address", destination.id),
            )));
        };

        let message =
            Self::render_message(request, destination, to, &self.from_address, Utc::now());

        match self.mailer.send(&message).await {
            Ok(()) => Ok(SubmissionOutcome::accepted()),
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "Submission email not sent");
                Ok(SubmissionOutcome::failure_with(SubmissionError::coded(
                    "mail_error",
                    sanitize_error_message(&e.to_string()),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_message_lists_sorted_fields() {
        let request = SubmissionRequest::pending(
            "R7",
            "D2",
            "W7",
            json!({"zip": "12345", "name": "Ada", "pages": 3}),
        );
        let destination = Destination::new("D2", "Mailroom", "email");

        let message = EmailSubmissionStrategy::render_message(
            &request,
            &destination,
            "mailroom@example.org",
            "relay@example.org",
            Utc::now(),
        );

        assert_eq!(message.subject, "Submission R7 for Mailroom");
        assert_eq!(message.to, "mailroom@example.org");
        assert_eq!(
            message.body,
            "Request ID: R7\n\nname: Ada\npages: 3\nzip: 12345\n"
        );
    }

    #[test]
    fn test_render_handles_non_object_values() {
        assert_eq!(render_form_values(&json!(null)), "");
        assert_eq!(render_form_values(&json!("free text")), "free text\n");
    }
}
