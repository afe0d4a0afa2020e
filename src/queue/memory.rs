//! In-memory task queue.

use super::{Delivery, QueueTask, TaskQueue};
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

/// Task that ran out of deliveries or failed permanently
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub task: QueueTask,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    in_flight: HashSet<Uuid>,
    dead_letters: Vec<DeadLetter>,
    closed: bool,
}

/// FIFO queue with at-least-once delivery and a dead-letter list.
///
/// Closing the queue stops new tasks from being added; consumers keep
/// receiving until the backlog is drained and every delivery is settled.
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    max_deliveries: u32,
}

impl InMemoryTaskQueue {
    /// `max_deliveries` counts the first hand-out; values below 1 are raised to 1
    pub fn new(max_deliveries: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            max_deliveries: max_deliveries.max(1),
        }
    }

    /// Stop accepting tasks and let consumers finish the backlog
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Tasks waiting to be handed out
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.ready.is_empty()
    }

    /// Deliveries handed out but not yet settled
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Remove a delivery from the in-flight set, keeping the lock for the caller
    async fn settle(&self, delivery: &Delivery) -> RelayResult<MutexGuard<'_, QueueState>> {
        let mut state = self.state.lock().await;
        if !state.in_flight.remove(&delivery.delivery_id) {
            return Err(RelayError::queue(format!(
                "delivery {} is not in flight",
                delivery.delivery_id
            )));
        }
        Ok(state)
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: QueueTask) -> RelayResult<()> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(RelayError::queue(format!(
                    "queue is closed, dropping task for request {}",
                    task.request_id
                )));
            }
            state.ready.push_back(Delivery::new(task, 1));
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self) -> Option<Delivery> {
        loop {
            // Register interest before looking at the state so a wake-up
            // between the check and the await is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(delivery) = state.ready.pop_front() {
                    state.in_flight.insert(delivery.delivery_id);
                    return Some(delivery);
                }
                if state.closed && state.in_flight.is_empty() {
                    return None;
                }
            }

            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> RelayResult<()> {
        drop(self.settle(delivery).await?);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, reason: &str, retryable: bool) -> RelayResult<()> {
        {
            let mut state = self.settle(delivery).await?;

            if retryable && delivery.attempt < self.max_deliveries {
                debug!(
                    request_id = %delivery.task.request_id,
                    attempt = delivery.attempt,
                    reason = %reason,
                    "Redelivering task"
                );
                state
                    .ready
                    .push_back(Delivery::new(delivery.task.clone(), delivery.attempt + 1));
            } else {
                warn!(
                    request_id = %delivery.task.request_id,
                    attempts = delivery.attempt,
                    retryable,
                    reason = %reason,
                    "Dead-lettering task"
                );
                state.dead_letters.push(DeadLetter {
                    task: delivery.task.clone(),
                    attempts: delivery.attempt,
                    reason: reason.to_string(),
                });
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = InMemoryTaskQueue::new(3);
        queue.enqueue(QueueTask::new("R1")).await.unwrap();
        queue.enqueue(QueueTask::new("R2")).await.unwrap();

        let first = queue.receive().await.unwrap();
        let second = queue.receive().await.unwrap();
        assert_eq!(first.task.request_id.as_str(), "R1");
        assert_eq!(second.task.request_id.as_str(), "R2");
        assert_eq!(first.attempt, 1);
        assert_eq!(queue.in_flight().await, 2);
    }

    #[tokio::test]
    async fn test_retryable_nack_redelivers_until_limit() {
        let queue = InMemoryTaskQueue::new(2);
        queue.enqueue(QueueTask::new("R1")).await.unwrap();

        let first = queue.receive().await.unwrap();
        queue.nack(&first, "storage down", true).await.unwrap();

        let second = queue.receive().await.unwrap();
        assert_eq!(second.attempt, 2);
        assert_ne!(second.delivery_id, first.delivery_id);

        queue.nack(&second, "storage down", true).await.unwrap();
        assert!(queue.is_empty().await);

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_nack_dead_letters_immediately() {
        let queue = InMemoryTaskQueue::new(5);
        queue.enqueue(QueueTask::new("R1")).await.unwrap();

        let delivery = queue.receive().await.unwrap();
        queue.nack(&delivery, "not found", false).await.unwrap();

        assert!(queue.is_empty().await);
        assert_eq!(queue.dead_letters().await[0].reason, "not found");
    }

    #[tokio::test]
    async fn test_double_settle_is_rejected() {
        let queue = InMemoryTaskQueue::new(1);
        queue.enqueue(QueueTask::new("R1")).await.unwrap();

        let delivery = queue.receive().await.unwrap();
        queue.ack(&delivery).await.unwrap();
        assert!(queue.ack(&delivery).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_tasks_and_drains() {
        let queue = InMemoryTaskQueue::new(1);
        queue.enqueue(QueueTask::new("R1")).await.unwrap();
        queue.close().await;

        assert!(queue.enqueue(QueueTask::new("R2")).await.is_err());

        let delivery = queue.receive().await.unwrap();
        queue.ack(&delivery).await.unwrap();
        assert!(queue.receive().await.is_none());
    }

    #[tokio::test]
    async fn test_receive_waits_for_enqueue() {
        let queue = Arc::new(InMemoryTaskQueue::new(1));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.receive().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(QueueTask::new("R9")).await.unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.task.request_id.as_str(), "R9");
    }

    #[tokio::test]
    async fn test_close_wakes_idle_consumers() {
        let queue = Arc::new(InMemoryTaskQueue::new(1));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.receive().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(received.is_none());
    }
}
