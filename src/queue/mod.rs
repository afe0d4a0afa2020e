//! Work queue
//!
//! A queue task carries nothing but the ID of the request to process; the
//! request itself is always re-read from the store. Deliveries are
//! at-least-once, so the same task may be handed out more than once.

pub mod memory;

use crate::error::{RelayError, RelayResult};
use crate::model::RequestId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::{DeadLetter, InMemoryTaskQueue};

/// Unit of work: process this request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTask {
    pub request_id: RequestId,
}

impl QueueTask {
    pub fn new(request_id: impl Into<RequestId>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    /// Parse one input line: a `{"request_id": ..}` object or a bare ID
    pub fn parse_line(line: &str) -> RelayResult<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        if line.starts_with('{') {
            return serde_json::from_str(line)
                .map(Some)
                .map_err(|e| RelayError::queue(format!("invalid queue task '{line}': {e}")));
        }

        if line.chars().any(char::is_whitespace) {
            return Err(RelayError::queue(format!(
                "invalid queue task '{line}': expected a request ID"
            )));
        }
        Ok(Some(Self::new(line)))
    }
}

/// One hand-out of a task to a consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_id: Uuid,
    pub task: QueueTask,
    /// 1 on the first hand-out, incremented on every redelivery
    pub attempt: u32,
}

impl Delivery {
    pub fn new(task: QueueTask, attempt: u32) -> Self {
        Self {
            delivery_id: Uuid::new_v4(),
            task,
            attempt,
        }
    }
}

/// Queue consumed by the worker pool
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Add a task to the back of the queue
    async fn enqueue(&self, task: QueueTask) -> RelayResult<()>;

    /// Wait for the next delivery.
    ///
    /// Returns `None` once the queue is closed and every delivery has been
    /// settled, which is the consumer's signal to stop.
    async fn receive(&self) -> Option<Delivery>;

    /// Settle a delivery as done
    async fn ack(&self, delivery: &Delivery) -> RelayResult<()>;

    /// Settle a delivery as not done.
    ///
    /// Retryable deliveries are redelivered until the queue's delivery limit;
    /// everything else is dead-lettered.
    async fn nack(&self, delivery: &Delivery, reason: &str, retryable: bool) -> RelayResult<()>;
}
