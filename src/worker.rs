//! Queue worker pool
//!
//! Each worker takes one delivery at a time, runs it through the processor
//! and settles it: success and lost races are acked, other errors are nacked
//! with the error's retryability so the queue decides between redelivery and
//! dead-lettering.

use crate::error::RelayError;
use crate::observability::metrics;
use crate::processor::SubmissionProcessor;
use crate::queue::{Delivery, TaskQueue};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

/// Handle to a group of queue workers
pub struct WorkerPool {
    shutdown_tx: Arc<watch::Sender<bool>>,
    joins: Vec<JoinHandle<()>>,
}

/// Cloneable way to stop a pool from another task (e.g. a signal handler)
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        // Receivers may already be gone if every worker has exited
        let _ = self.shutdown_tx.send(true);
    }
}

impl WorkerPool {
    /// Spawn `n` workers consuming `queue` (at least one)
    pub fn spawn(
        n: usize,
        queue: Arc<dyn TaskQueue>,
        processor: Arc<SubmissionProcessor>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n.max(1))
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let processor = Arc::clone(&processor);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(
                    worker_loop(worker_id, queue, processor, shutdown_rx)
                        .instrument(crate::worker_span!(worker_id)),
                )
            })
            .collect();

        metrics().set_worker_state("running");
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            joins,
        }
    }

    pub fn size(&self) -> usize {
        self.joins.len()
    }

    /// Ask workers to stop taking new deliveries.
    ///
    /// A delivery that is already being processed runs to completion.
    pub fn request_shutdown(&self) {
        self.shutdown_handle().request();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Wait for every worker to exit
    pub async fn join(self) {
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "Queue worker panicked");
            }
        }
        metrics().set_worker_state("stopped");
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn TaskQueue>,
    processor: Arc<SubmissionProcessor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("Queue worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let delivery = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // Every pool handle dropped without a shutdown request
                    break;
                }
                continue;
            }
            delivery = queue.receive() => delivery,
        };

        let Some(delivery) = delivery else {
            debug!("Queue drained");
            break;
        };

        let span = crate::request_span!(
            worker_id,
            request_id = %delivery.task.request_id,
            attempt = delivery.attempt
        );
        handle_delivery(queue.as_ref(), &processor, delivery)
            .instrument(span)
            .await;
    }

    info!("Queue worker stopped");
}

async fn handle_delivery(
    queue: &dyn TaskQueue,
    processor: &SubmissionProcessor,
    delivery: Delivery,
) {
    let request_id = &delivery.task.request_id;

    let settled = match processor.process(&delivery.task).await {
        Ok(report) => {
            debug!(
                request_id = %request_id,
                attempt = delivery.attempt,
                status = %report.status(),
                "Delivery processed"
            );
            queue.ack(&delivery).await
        }
        // Another delivery of the same request already settled it
        Err(RelayError::Conflict { found, .. }) => {
            info!(
                request_id = %request_id,
                attempt = delivery.attempt,
                status = %found,
                "Delivery lost the race to a concurrent attempt"
            );
            queue.ack(&delivery).await
        }
        Err(e) => {
            queue
                .nack(&delivery, &e.sanitized_message(), e.is_retryable())
                .await
        }
    };

    if let Err(e) = settled {
        error!(request_id = %request_id, error = %e, "Failed to settle delivery");
    }
}
