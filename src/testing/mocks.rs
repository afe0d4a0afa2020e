//! Mock implementations for testing
//!
//! Scripted strategies, stores that fail on demand and a recording mailer,
//! so the processor and worker pool can be exercised without a network or
//! a database.

use crate::error::{RelayError, RelayResult};
use crate::model::{
    Destination, RawRecordId, RawSubmission, RequestId, RequestStatus, SubmissionError,
    SubmissionOutcome, SubmissionReceipt, SubmissionRequest,
};
use crate::store::{MemoryRawRecordStore, MemoryRequestStore, RawRecordStore, RequestStore};
use crate::strategy::{EmailMessage, MailError, Mailer, SubmissionStrategy};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum MockBehavior {
    Outcome(SubmissionOutcome),
    Error(String),
}

/// Strategy that returns a scripted result and records what it was given
#[derive(Debug)]
pub struct MockStrategy {
    name: String,
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(SubmissionRequest, Destination)>>,
}

impl MockStrategy {
    fn scripted(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_outcome(name: &str, outcome: SubmissionOutcome) -> Self {
        Self::scripted(name, MockBehavior::Outcome(outcome))
    }

    /// Accepts every request without tracking fields
    pub fn accepting(name: &str) -> Self {
        Self::with_outcome(name, SubmissionOutcome::accepted())
    }

    pub fn with_receipt(name: &str, case_management_id: &str, tracking_number: &str) -> Self {
        Self::with_outcome(
            name,
            SubmissionOutcome::success(SubmissionReceipt::new(
                Some(case_management_id.to_string()),
                Some(tracking_number.to_string()),
            )),
        )
    }

    pub fn rejecting(name: &str, errors: Vec<SubmissionError>) -> Self {
        Self::with_outcome(name, SubmissionOutcome::failure(errors))
    }

    /// Fails with `RelayError::Strategy` instead of producing an outcome
    pub fn erroring(name: &str, message: &str) -> Self {
        Self::scripted(name, MockBehavior::Error(message.to_string()))
    }

    /// Sleep before answering, to widen race windows in concurrency tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn seen_requests(&self) -> Vec<(SubmissionRequest, Destination)> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl SubmissionStrategy for MockStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        request: &SubmissionRequest,
        destination: &Destination,
    ) -> RelayResult<SubmissionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .await
            .push((request.clone(), destination.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::Outcome(outcome) => Ok(outcome.clone()),
            MockBehavior::Error(message) => Err(RelayError::strategy(&self.name, message.clone())),
        }
    }
}

/// Request store whose writes can be made to fail
#[derive(Debug, Default)]
pub struct FailingRequestStore {
    inner: MemoryRequestStore,
    fail_writes: AtomicBool,
    failed_writes: AtomicUsize,
}

impl FailingRequestStore {
    /// Store that rejects every write until `set_failing(false)`
    pub fn new(requests: impl IntoIterator<Item = SubmissionRequest>) -> Self {
        Self {
            inner: MemoryRequestStore::with_requests(requests),
            fail_writes: AtomicBool::new(true),
            failed_writes: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryRequestStore {
        &self.inner
    }

    fn check_writable(&self) -> RelayResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(RelayError::storage("Mock request store is unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for FailingRequestStore {
    async fn load(&self, id: &RequestId) -> RelayResult<SubmissionRequest> {
        self.inner.load(id).await
    }

    async fn save(&self, request: &SubmissionRequest) -> RelayResult<()> {
        self.check_writable()?;
        self.inner.save(request).await
    }

    async fn save_if_status(
        &self,
        request: &SubmissionRequest,
        expected: RequestStatus,
    ) -> RelayResult<()> {
        self.check_writable()?;
        self.inner.save_if_status(request, expected).await
    }
}

/// Raw record store whose deletes always fail
#[derive(Debug, Default)]
pub struct FailingRawRecordStore {
    inner: MemoryRawRecordStore,
    delete_attempts: AtomicUsize,
}

impl FailingRawRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: RawSubmission) {
        self.inner.insert(record).await;
    }

    pub async fn contains(&self, id: &RawRecordId) -> bool {
        self.inner.contains(id).await
    }

    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RawRecordStore for FailingRawRecordStore {
    async fn load(&self, id: &RawRecordId) -> RelayResult<RawSubmission> {
        self.inner.load(id).await
    }

    async fn delete_by_request_reference(&self, id: &RawRecordId) -> RelayResult<bool> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        Err(RelayError::storage(format!(
            "Mock raw record store refused to delete {id}"
        )))
    }
}

/// Mailer that keeps messages in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<EmailMessage>>>,
    pub should_fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn sent_messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Rejected("mock relay refused the message".to_string()));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Pending request with a small form snapshot
pub fn pending_request(id: &str, destination_id: &str, raw_record_id: &str) -> SubmissionRequest {
    SubmissionRequest::pending(
        id,
        destination_id,
        raw_record_id,
        json!({
            "requester_name": "Ada Lovelace",
            "request_description": "All records about the analytical engine",
        }),
    )
}

/// Raw record matching `pending_request`
pub fn raw_record(id: &str) -> RawSubmission {
    RawSubmission::new(
        id,
        json!({
            "requester_name": "Ada Lovelace",
            "request_description": "All records about the analytical engine",
        }),
    )
}

pub fn api_destination(id: &str, api_url: &str) -> Destination {
    Destination::new(id, format!("{id} records office"), "api").with_api_url(api_url)
}

pub fn email_destination(id: &str, address: &str) -> Destination {
    Destination::new(id, format!("{id} mailroom"), "email").with_email_address(address)
}
