//! Destination entities
//!
//! A destination is one external recipient plus the selector that decides
//! which submission strategy talks to it. This crate only reads them.

use super::ids::DestinationId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    #[serde(default)]
    pub name: String,
    /// Strategy selector, e.g. "api" or "email"
    pub submission_format: String,
    /// Endpoint for the "api" strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Environment variable holding the shared secret for the "api" strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret_env: Option<String>,
    /// Mailbox for the "email" strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

impl Destination {
    pub fn new(
        id: impl Into<DestinationId>,
        name: impl Into<String>,
        submission_format: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            submission_format: submission_format.into(),
            api_url: None,
            api_secret_env: None,
            email_address: None,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_api_secret_env(mut self, var: impl Into<String>) -> Self {
        self.api_secret_env = Some(var.into());
        self
    }

    pub fn with_email_address(mut self, address: impl Into<String>) -> Self {
        self.email_address = Some(address.into());
        self
    }

    /// Selector normalized for strategy lookup
    pub fn format_key(&self) -> String {
        normalize_format(&self.submission_format)
    }
}

/// Trimmed, lowercase form of a strategy selector
pub fn normalize_format(format: &str) -> String {
    format.trim().to_ascii_lowercase()
}
