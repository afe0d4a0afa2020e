//! Submission strategies
//!
//! A strategy hands one request to one kind of destination (HTTP API, email,
//! ...). Variants differ only in transport and payload mapping; they share
//! the `SubmissionStrategy` contract and never write the request themselves.

pub mod api;
pub mod email;
pub mod factory;

use crate::error::RelayResult;
use crate::model::{Destination, SubmissionOutcome, SubmissionRequest};
use async_trait::async_trait;

pub use api::{ApiStrategyConfig, ApiSubmissionStrategy};
pub use email::{EmailMessage, EmailSubmissionStrategy, MailError, Mailer, SpoolMailer};
pub use factory::StrategyFactory;

/// Protocol-specific hand-off of a request to a destination
#[async_trait]
pub trait SubmissionStrategy: Send + Sync {
    /// Strategy name used in logs and reports (e.g. "api")
    fn name(&self) -> &str;

    /// Hand the request to the destination.
    ///
    /// A destination rejecting the submission, or being unreachable, is an
    /// expected result reported as `Ok(SubmissionOutcome::Failure)`. An `Err`
    /// means the attempt could not be evaluated at all and leaves the request
    /// untouched.
    async fn submit(
        &self,
        request: &SubmissionRequest,
        destination: &Destination,
    ) -> RelayResult<SubmissionOutcome>;
}
