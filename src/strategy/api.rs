//! HTTP API submission strategy
//!
//! POSTs the request as JSON to the destination's `api_url` and reads the
//! destination's verdict from the response body.

use super::SubmissionStrategy;
use crate::config::{ApiSection, RelayConfig};
use crate::error::{sanitize_error_message, RelayError, RelayResult};
use crate::model::{
    Destination, DestinationId, RequestId, SubmissionError, SubmissionOutcome, SubmissionRequest,
    INVALID_RESPONSE_CODE,
};
use async_trait::async_trait;
use reqwest::header::{HeaderName, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// API strategy configuration
#[derive(Debug, Clone)]
pub struct ApiStrategyConfig {
    pub timeout: Duration,
    pub secret_header: String,
    pub user_agent: String,
}

impl Default for ApiStrategyConfig {
    fn default() -> Self {
        Self::from(&ApiSection::default())
    }
}

impl From<&ApiSection> for ApiStrategyConfig {
    fn from(section: &ApiSection) -> Self {
        Self {
            timeout: section.timeout(),
            secret_header: section.secret_header.clone(),
            user_agent: format!("submission-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Body sent to the destination
#[derive(Debug, Serialize)]
struct ApiSubmissionPayload<'a> {
    request_id: &'a RequestId,
    destination_id: &'a DestinationId,
    destination_name: &'a str,
    form: &'a serde_json::Value,
}

/// Strategy for destinations that accept submissions over HTTP
pub struct ApiSubmissionStrategy {
    client: Client,
    secret_header: HeaderName,
}

impl ApiSubmissionStrategy {
    /// Create a new API strategy
    pub fn new(config: ApiStrategyConfig) -> RelayResult<Self> {
        let secret_header = HeaderName::from_bytes(config.secret_header.as_bytes())
            .map_err(|e| {
                RelayError::strategy(
                    "api",
                    format!("invalid secret header '{}': {e}", config.secret_header),
                )
            })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| RelayError::strategy("api", e.to_string()))?;

        Ok(Self {
            client,
            secret_header,
        })
    }

    /// Turn the destination's HTTP response into an outcome (pure function)
    pub fn interpret_response(status: StatusCode, body: &str) -> SubmissionOutcome {
        let parsed = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| SubmissionOutcome::from_response(&value));

        if status.is_success() {
            // A 2xx body that is not a JSON object carries no verdict
            return parsed.unwrap_or_else(SubmissionOutcome::accepted);
        }

        if let Some(SubmissionOutcome::Failure { errors }) = parsed {
            let readable = errors
                .iter()
                .all(|e| e.code.as_deref() != Some(INVALID_RESPONSE_CODE));
            if readable {
                return SubmissionOutcome::failure(errors);
            }
        }

        let mut error = SubmissionError::coded(
            format!("http_{}", status.as_u16()),
            status
                .canonical_reason()
                .unwrap_or("unexpected response status"),
        );
        if !body.trim().is_empty() {
            error = error.with_description(sanitize_error_message(body.trim()));
        }
        SubmissionOutcome::failure_with(error)
    }

    fn transport_failure(error: &reqwest::Error) -> SubmissionOutcome {
        let message = format!(
            "HTTP request failed: {} (is_connect: {}, is_timeout: {})",
            error,
            error.is_connect(),
            error.is_timeout()
        );
        SubmissionOutcome::failure_with(SubmissionError::coded(
            "transport_error",
            sanitize_error_message(&message),
        ))
    }
}

#[async_trait]
impl SubmissionStrategy for ApiSubmissionStrategy {
    fn name(&self) -> &str {
        "api"
    }

    async fn submit(
        &self,
        request: &SubmissionRequest,
        destination: &Destination,
    ) -> RelayResult<SubmissionOutcome> {
        let Some(api_url) = destination.api_url.as_deref() else {
            return Ok(SubmissionOutcome::failure_with(SubmissionError::coded(
                "missing_api_url",
                format!("destination {} has no submission API URL", destination.id),
            )));
        };

        let secret = match RelayConfig::api_secret(destination) {
            Ok(secret) => secret,
            Err(e) => {
                return Ok(SubmissionOutcome::failure_with(SubmissionError::coded(
                    "missing_secret",
                    e.to_string(),
                )));
            }
        };

        let payload = ApiSubmissionPayload {
            request_id: &request.id,
            destination_id: &destination.id,
            destination_name: &destination.name,
            form: &request.form_values,
        };

        let mut builder = self
            .client
            .post(api_url)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload);
        if let Some(secret) = secret {
            builder = builder.header(self.secret_header.clone(), secret);
        }

        debug!(request_id = %request.id, api_url = %api_url, "Posting submission");

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "Submission API unreachable");
                return Ok(Self::transport_failure(&e));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    request_id = %request.id,
                    status = %status,
                    error = %e,
                    "Failed to read submission API response body"
                );
                String::new()
            }
        };
        debug!(request_id = %request.id, status = %status, "Submission API responded");

        Ok(Self::interpret_response(status, &body))
    }
}
