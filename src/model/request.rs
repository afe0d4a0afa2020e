//! Submission requests and their status transitions
//!
//! Transitions never mutate in place: `apply_outcome` and `requeue` build the
//! next value, and the processor commits it with a single guarded save.

use super::ids::{DestinationId, RawRecordId, RequestId};
use super::outcome::{SubmissionError, SubmissionOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing status of a submission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting to be handed off
    Pending,
    /// Accepted by the destination
    Submitted,
    /// Rejected by the destination for this attempt
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Submitted => "submitted",
            RequestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work relayed to a destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub id: RequestId,
    pub status: RequestStatus,
    pub destination_id: DestinationId,
    pub raw_record_id: RawRecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_management_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    /// Errors from the most recent failed attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_errors: Vec<SubmissionError>,
    /// Snapshot of the captured form values handed to the destination
    #[serde(default)]
    pub form_values: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl SubmissionRequest {
    /// New pending request as produced by intake
    pub fn pending(
        id: impl Into<RequestId>,
        destination_id: impl Into<DestinationId>,
        raw_record_id: impl Into<RawRecordId>,
        form_values: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            status: RequestStatus::Pending,
            destination_id: destination_id.into(),
            raw_record_id: raw_record_id.into(),
            case_management_id: None,
            tracking_number: None,
            last_errors: Vec::new(),
            form_values,
            submitted_at: None,
            last_attempt_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Next state of this request after a strategy produced `outcome`.
    ///
    /// Success moves to `submitted`, copies whichever tracking fields the
    /// receipt carries (absent ones keep their previous value) and clears old
    /// errors. Failure moves to `failed` and records the errors.
    pub fn apply_outcome(&self, outcome: &SubmissionOutcome, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.last_attempt_at = Some(at);

        match outcome {
            SubmissionOutcome::Success(receipt) => {
                next.status = RequestStatus::Submitted;
                next.submitted_at = Some(at);
                next.last_errors = Vec::new();
                if let Some(id) = &receipt.case_management_id {
                    next.case_management_id = Some(id.clone());
                }
                if let Some(number) = &receipt.tracking_number {
                    next.tracking_number = Some(number.clone());
                }
            }
            SubmissionOutcome::Failure { errors } => {
                next.status = RequestStatus::Failed;
                next.last_errors = errors.clone();
            }
        }

        next
    }

    /// Put a failed request back into `pending` so it can be enqueued again.
    ///
    /// Returns `None` for requests that are not `failed`. The previous errors
    /// stay attached until the next attempt replaces them.
    pub fn requeue(&self) -> Option<Self> {
        if self.status != RequestStatus::Failed {
            return None;
        }
        let mut next = self.clone();
        next.status = RequestStatus::Pending;
        Some(next)
    }
}
