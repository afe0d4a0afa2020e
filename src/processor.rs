//! Queue task processor
//!
//! Takes one queue task to a terminal request state:
//!
//! 1. Load the request and skip it unless it is still `pending`
//! 2. Resolve its destination
//! 3. Pick the strategy for the destination's submission format
//! 4. Hand the request to the strategy
//! 5. Commit `submitted` or `failed` with a single write guarded on `pending`
//! 6. After a success, delete the raw record the request was built from
//!
//! Any error before step 5 leaves the stored request untouched, so a
//! redelivery of the same task starts again from `pending`.

use crate::error::{sanitize_error_message, RelayError, RelayResult};
use crate::model::{
    RequestId, RequestStatus, SubmissionError, SubmissionOutcome, SubmissionRequest,
};
use crate::observability::metrics;
use crate::queue::QueueTask;
use crate::resolver::RoutingResolver;
use crate::store::{RawRecordStore, RequestStore};
use crate::strategy::StrategyFactory;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// What one processing attempt did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProcessReport {
    /// The destination accepted the request
    Submitted {
        request_id: RequestId,
        strategy: String,
        case_management_id: Option<String>,
        tracking_number: Option<String>,
        /// False when the raw record was already gone or could not be deleted
        raw_record_deleted: bool,
        /// Set when the raw record could not be deleted; the request stays submitted
        cleanup_error: Option<String>,
    },
    /// The destination rejected the request
    Failed {
        request_id: RequestId,
        strategy: String,
        errors: Vec<SubmissionError>,
    },
    /// The request was not pending; nothing was done
    Skipped {
        request_id: RequestId,
        status: RequestStatus,
    },
}

impl ProcessReport {
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Submitted { request_id, .. }
            | Self::Failed { request_id, .. }
            | Self::Skipped { request_id, .. } => request_id,
        }
    }

    /// Status the request is in after this attempt
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Submitted { .. } => RequestStatus::Submitted,
            Self::Failed { .. } => RequestStatus::Failed,
            Self::Skipped { status, .. } => *status,
        }
    }
}

/// Drives submission requests through their state machine
pub struct SubmissionProcessor {
    requests: Arc<dyn RequestStore>,
    raw_records: Arc<dyn RawRecordStore>,
    resolver: Arc<dyn RoutingResolver>,
    strategies: Arc<StrategyFactory>,
}

impl SubmissionProcessor {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        raw_records: Arc<dyn RawRecordStore>,
        resolver: Arc<dyn RoutingResolver>,
        strategies: Arc<StrategyFactory>,
    ) -> Self {
        Self {
            requests,
            raw_records,
            resolver,
            strategies,
        }
    }

    /// Process one queue task.
    ///
    /// # Errors
    ///
    /// Propagates lookup, routing, strategy and storage errors. When an error
    /// is returned no terminal status was written by this attempt.
    #[tracing::instrument(
        name = "process_request",
        skip(self, task),
        fields(request_id = %task.request_id)
    )]
    pub async fn process(&self, task: &QueueTask) -> RelayResult<ProcessReport> {
        let started = Instant::now();
        metrics().task_received();

        let result = self.run(task).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(ProcessReport::Submitted { strategy, .. }) => {
                metrics().request_submitted(strategy, elapsed);
            }
            Ok(ProcessReport::Failed { strategy, .. }) => {
                metrics().request_failed(strategy, elapsed);
            }
            Ok(ProcessReport::Skipped { .. }) => metrics().request_skipped(elapsed),
            Err(e @ RelayError::Conflict { .. }) => {
                metrics().conflict_detected();
                metrics().fatal_error(elapsed);
                warn!(error = %e, "Request was finished by another attempt");
            }
            Err(e) => {
                metrics().fatal_error(elapsed);
                error!(
                    error = %e.sanitized_message(),
                    retryable = e.is_retryable(),
                    "Request processing aborted, status left unchanged"
                );
            }
        }

        result
    }

    async fn run(&self, task: &QueueTask) -> RelayResult<ProcessReport> {
        let request = self.requests.load(&task.request_id).await?;

        if !request.is_pending() {
            info!(status = %request.status, "Request is not pending, skipping");
            return Ok(ProcessReport::Skipped {
                request_id: request.id,
                status: request.status,
            });
        }

        let destination = self.resolver.resolve(&request).await?;
        let strategy = self.strategies.get_strategy(&destination)?;
        let strategy_name = strategy.name().to_string();

        debug!(
            destination_id = %destination.id,
            strategy = %strategy_name,
            "Handing request to strategy"
        );

        let outcome = strategy
            .submit(&request, &destination)
            .instrument(crate::strategy_span!(
                strategy = %strategy_name,
                destination_id = %destination.id
            ))
            .await?;
        let outcome = sanitize_outcome(outcome);

        let next = request.apply_outcome(&outcome, Utc::now());
        self.requests
            .save_if_status(&next, RequestStatus::Pending)
            .await?;

        match outcome {
            SubmissionOutcome::Success(_) => {
                info!(
                    destination_id = %destination.id,
                    strategy = %strategy_name,
                    case_management_id = next.case_management_id.as_deref().unwrap_or(""),
                    tracking_number = next.tracking_number.as_deref().unwrap_or(""),
                    "Request submitted"
                );
                let (raw_record_deleted, cleanup_error) = self.cleanup_raw_record(&next).await;

                Ok(ProcessReport::Submitted {
                    request_id: next.id,
                    strategy: strategy_name,
                    case_management_id: next.case_management_id,
                    tracking_number: next.tracking_number,
                    raw_record_deleted,
                    cleanup_error,
                })
            }
            SubmissionOutcome::Failure { errors } => {
                let summary: Vec<String> = errors.iter().map(ToString::to_string).collect();
                warn!(
                    destination_id = %destination.id,
                    strategy = %strategy_name,
                    errors = ?summary,
                    "Request failed"
                );

                Ok(ProcessReport::Failed {
                    request_id: next.id,
                    strategy: strategy_name,
                    errors,
                })
            }
        }
    }

    /// Best-effort raw record deletion; never undoes the submission
    async fn cleanup_raw_record(&self, request: &SubmissionRequest) -> (bool, Option<String>) {
        match self
            .raw_records
            .delete_by_request_reference(&request.raw_record_id)
            .await
        {
            Ok(true) => (true, None),
            Ok(false) => {
                debug!(raw_record_id = %request.raw_record_id, "Raw record already deleted");
                (false, None)
            }
            Err(e) => {
                let cleanup = RelayError::RawRecordCleanup {
                    raw_record_id: request.raw_record_id.to_string(),
                    message: e.sanitized_message(),
                };
                metrics().cleanup_failed();
                warn!(error = %cleanup, "Request submitted but raw record was kept");
                (false, Some(cleanup.to_string()))
            }
        }
    }

    /// Move a failed request back to `pending` so it can be enqueued again.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown requests and `Conflict` unless the request is
    /// currently `failed`.
    pub async fn requeue(&self, id: &RequestId) -> RelayResult<SubmissionRequest> {
        let request = self.requests.load(id).await?;
        let Some(next) = request.requeue() else {
            return Err(RelayError::Conflict {
                request_id: request.id,
                expected: RequestStatus::Failed,
                found: request.status,
            });
        };

        self.requests
            .save_if_status(&next, RequestStatus::Failed)
            .await?;
        info!(request_id = %id, "Request requeued");
        Ok(next)
    }
}

/// Strip secrets from destination-supplied error text before it is stored
fn sanitize_outcome(outcome: SubmissionOutcome) -> SubmissionOutcome {
    match outcome {
        SubmissionOutcome::Failure { errors } => SubmissionOutcome::Failure {
            errors: errors
                .into_iter()
                .map(|mut error| {
                    error.message = sanitize_error_message(&error.message);
                    error.description = error.description.map(|d| sanitize_error_message(&d));
                    error
                })
                .collect(),
        },
        success => success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Destination, RawSubmission};
    use crate::resolver::StoreRoutingResolver;
    use crate::store::{MemoryDestinationStore, MemoryRawRecordStore, MemoryRequestStore};
    use crate::testing::mocks::MockStrategy;
    use serde_json::json;

    struct Harness {
        requests: Arc<MemoryRequestStore>,
        raw_records: Arc<MemoryRawRecordStore>,
        strategy: Arc<MockStrategy>,
        processor: SubmissionProcessor,
    }

    async fn harness(strategy: MockStrategy) -> Harness {
        let requests = Arc::new(MemoryRequestStore::new());
        requests
            .insert(SubmissionRequest::pending("R1", "D1", "W1", json!({"name": "Ada"})))
            .await;
        let raw_records = Arc::new(MemoryRawRecordStore::new());
        raw_records
            .insert(RawSubmission::new("W1", json!({"name": "Ada"})))
            .await;

        let destinations = Arc::new(MemoryDestinationStore::new([Destination::new(
            "D1", "Records", "api",
        )]));
        let strategy = Arc::new(strategy);
        let mut factory = StrategyFactory::new();
        factory.register("api", strategy.clone()).unwrap();

        let processor = SubmissionProcessor::new(
            requests.clone(),
            raw_records.clone(),
            Arc::new(StoreRoutingResolver::new(destinations)),
            Arc::new(factory),
        );

        Harness {
            requests,
            raw_records,
            strategy,
            processor,
        }
    }

    #[tokio::test]
    async fn test_report_serializes_with_result_tag() {
        let report = ProcessReport::Skipped {
            request_id: RequestId::from("R1"),
            status: RequestStatus::Submitted,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            json!({"result": "skipped", "request_id": "R1", "status": "submitted"})
        );
    }

    #[tokio::test]
    async fn test_failure_errors_are_sanitized_before_storage() {
        let h = harness(MockStrategy::rejecting(
            "api",
            vec![SubmissionError::new("bad credentials token=s3cr3t")],
        ))
        .await;

        h.processor.process(&QueueTask::new("R1")).await.unwrap();

        let stored = h.requests.get(&RequestId::from("R1")).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Failed);
        assert!(!stored.last_errors[0].message.contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_requeue_moves_failed_back_to_pending() {
        let h = harness(MockStrategy::rejecting("api", vec!["nope".into()])).await;
        let id = RequestId::from("R1");

        h.processor.process(&QueueTask::new("R1")).await.unwrap();
        let requeued = h.processor.requeue(&id).await.unwrap();
        assert_eq!(requeued.status, RequestStatus::Pending);

        assert!(matches!(
            h.processor.requeue(&id).await,
            Err(RelayError::Conflict { .. })
        ));
        assert_eq!(h.strategy.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_raw_record_is_not_a_cleanup_error() {
        let h = harness(MockStrategy::accepting("api")).await;
        h.raw_records
            .delete_by_request_reference(&"W1".into())
            .await
            .unwrap();

        let report = h.processor.process(&QueueTask::new("R1")).await.unwrap();
        match report {
            ProcessReport::Submitted {
                raw_record_deleted,
                cleanup_error,
                ..
            } => {
                assert!(!raw_record_deleted);
                assert!(cleanup_error.is_none());
            }
            other => panic!("expected submitted, got {other:?}"),
        }
    }
}
