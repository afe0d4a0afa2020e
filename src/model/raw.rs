//! Raw captured form records
//!
//! The original form capture, kept only until the destination has the data.

use super::ids::RawRecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSubmission {
    pub id: RawRecordId,
    #[serde(default)]
    pub values: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

impl RawSubmission {
    pub fn new(id: impl Into<RawRecordId>, values: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            values,
            captured_at: Utc::now(),
        }
    }
}
