//! Data model for submission relaying
//!
//! Requests, destinations, raw records and the outcomes strategies report.

pub mod destination;
pub mod ids;
pub mod outcome;
pub mod raw;
pub mod request;

pub use destination::{normalize_format, Destination};
pub use ids::{DestinationId, RawRecordId, RequestId};
pub use outcome::{SubmissionError, SubmissionOutcome, SubmissionReceipt, INVALID_RESPONSE_CODE};
pub use raw::RawSubmission;
pub use request::{RequestStatus, SubmissionRequest};
