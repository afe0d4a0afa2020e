//! Submission Relay
//!
//! Queue-driven relay that hands captured form submissions to external
//! destinations and records what happened.
//!
//! # Overview
//!
//! A queue task names one submission request. The [`processor`] loads the
//! request, asks the [`resolver`] where it goes, lets the
//! [`strategy::StrategyFactory`] pick the protocol for that destination and
//! hands the request to the chosen [`strategy::SubmissionStrategy`]. The
//! result moves the request from `pending` to `submitted` or `failed`; after
//! a success the raw captured record is deleted.
//!
//! - Data model and request state machine ([`model`])
//! - Record store traits with in-memory and JSON-file backends ([`store`])
//! - HTTP API and email strategies ([`strategy`])
//! - In-memory work queue and worker pool ([`queue`], [`worker`])
//! - Structured logging and metrics ([`observability`])
//!
//! # Quick Start
//!
//! ```rust
//! use submission_relay::model::{SubmissionOutcome, SubmissionRequest, RequestStatus};
//! use chrono::Utc;
//! use serde_json::json;
//!
//! let request = SubmissionRequest::pending("R1", "records-office", "W1", json!({"name": "Ada"}));
//!
//! let outcome = SubmissionOutcome::from_response(&json!({
//!     "success": true,
//!     "id": "CM-100",
//!     "status_tracking_number": "TRK-9"
//! }))
//! .unwrap();
//!
//! let submitted = request.apply_outcome(&outcome, Utc::now());
//! assert_eq!(submitted.status, RequestStatus::Submitted);
//! assert_eq!(submitted.tracking_number.as_deref(), Some("TRK-9"));
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod observability;
pub mod processor;
pub mod queue;
pub mod resolver;
pub mod store;
pub mod strategy;
pub mod testing;
pub mod worker;

pub use config::{ConfigError, RelayConfig};
pub use error::{RelayError, RelayResult};
pub use model::{
    Destination, RequestId, RequestStatus, SubmissionError, SubmissionOutcome, SubmissionRequest,
};
pub use processor::{ProcessReport, SubmissionProcessor};
pub use queue::{InMemoryTaskQueue, QueueTask, TaskQueue};
pub use resolver::{RoutingResolver, StoreRoutingResolver};
pub use strategy::{StrategyFactory, SubmissionStrategy};
pub use worker::{ShutdownHandle, WorkerPool};
