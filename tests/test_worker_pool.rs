//! Worker pool tests
//!
//! Runs the pool over the in-memory queue and checks how deliveries are
//! settled: acked on success, redelivered on retryable errors and
//! dead-lettered otherwise.

use std::sync::Arc;
use std::time::Duration;
use submission_relay::model::{RequestId, RequestStatus, SubmissionRequest};
use submission_relay::processor::SubmissionProcessor;
use submission_relay::queue::{InMemoryTaskQueue, QueueTask, TaskQueue};
use submission_relay::resolver::StoreRoutingResolver;
use submission_relay::store::{MemoryDestinationStore, MemoryRawRecordStore, MemoryRequestStore};
use submission_relay::strategy::StrategyFactory;
use submission_relay::testing::mocks::{
    api_destination, pending_request, raw_record, MockStrategy,
};
use submission_relay::WorkerPool;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Setup {
    requests: Arc<MemoryRequestStore>,
    strategy: Arc<MockStrategy>,
    processor: Arc<SubmissionProcessor>,
}

async fn setup(strategy: MockStrategy, requests: Vec<SubmissionRequest>) -> Setup {
    let raw_records = Arc::new(MemoryRawRecordStore::new());
    for request in &requests {
        raw_records
            .insert(raw_record(request.raw_record_id.as_str()))
            .await;
    }
    let requests = Arc::new(MemoryRequestStore::with_requests(requests));
    let strategy = Arc::new(strategy);

    let mut factory = StrategyFactory::new();
    factory.register("api", strategy.clone()).unwrap();

    let processor = Arc::new(SubmissionProcessor::new(
        requests.clone(),
        raw_records,
        Arc::new(StoreRoutingResolver::new(Arc::new(
            MemoryDestinationStore::new([api_destination("D1", "http://localhost:9/in")]),
        ))),
        Arc::new(factory),
    ));

    Setup {
        requests,
        strategy,
        processor,
    }
}

async fn status_of(requests: &MemoryRequestStore, id: &str) -> RequestStatus {
    requests.get(&RequestId::from(id)).await.unwrap().status
}

#[tokio::test]
async fn test_pool_processes_every_task_and_stops_when_drained() {
    let ids: Vec<String> = (1..=12).map(|n| format!("R{n}")).collect();
    let setup = setup(
        MockStrategy::accepting("api"),
        ids.iter()
            .map(|id| pending_request(id, "D1", &format!("W-{id}")))
            .collect(),
    )
    .await;

    let queue = Arc::new(InMemoryTaskQueue::new(3));
    for id in &ids {
        queue.enqueue(QueueTask::new(id.as_str())).await.unwrap();
    }
    queue.close().await;

    let pool = WorkerPool::spawn(4, queue.clone(), setup.processor.clone());
    assert_eq!(pool.size(), 4);
    tokio::time::timeout(TIMEOUT, pool.join()).await.unwrap();

    for id in &ids {
        assert_eq!(status_of(&setup.requests, id).await, RequestStatus::Submitted);
    }
    assert_eq!(setup.strategy.calls(), ids.len());
    assert_eq!(queue.in_flight().await, 0);
    assert!(queue.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_deliveries_submit_once() {
    let setup = setup(
        MockStrategy::accepting("api"),
        vec![pending_request("R1", "D1", "W1")],
    )
    .await;

    let queue = Arc::new(InMemoryTaskQueue::new(3));
    for _ in 0..3 {
        queue.enqueue(QueueTask::new("R1")).await.unwrap();
    }
    queue.close().await;

    // One worker so the duplicates are handled one after another
    let pool = WorkerPool::spawn(1, queue.clone(), setup.processor.clone());
    tokio::time::timeout(TIMEOUT, pool.join()).await.unwrap();

    assert_eq!(setup.strategy.calls(), 1);
    assert_eq!(status_of(&setup.requests, "R1").await, RequestStatus::Submitted);
    assert!(queue.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_duplicate_deliveries_are_not_dead_lettered() {
    let setup = setup(
        MockStrategy::accepting("api").with_delay(Duration::from_millis(50)),
        vec![pending_request("R1", "D1", "W1")],
    )
    .await;

    let queue = Arc::new(InMemoryTaskQueue::new(3));
    for _ in 0..4 {
        queue.enqueue(QueueTask::new("R1")).await.unwrap();
    }
    queue.close().await;

    let pool = WorkerPool::spawn(4, queue.clone(), setup.processor.clone());
    tokio::time::timeout(TIMEOUT, pool.join()).await.unwrap();

    assert!(setup.strategy.calls() >= 1);
    assert_eq!(status_of(&setup.requests, "R1").await, RequestStatus::Submitted);
    assert!(queue.dead_letters().await.is_empty());
    assert_eq!(queue.in_flight().await, 0);
}

#[tokio::test]
async fn test_retryable_errors_are_redelivered_then_dead_lettered() {
    let setup = setup(
        MockStrategy::erroring("api", "destination client crashed"),
        vec![pending_request("R1", "D1", "W1")],
    )
    .await;

    let queue = Arc::new(InMemoryTaskQueue::new(3));
    queue.enqueue(QueueTask::new("R1")).await.unwrap();
    queue.close().await;

    let pool = WorkerPool::spawn(2, queue.clone(), setup.processor.clone());
    tokio::time::timeout(TIMEOUT, pool.join()).await.unwrap();

    assert_eq!(setup.strategy.calls(), 3);
    let dead = queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert!(dead[0].reason.contains("destination client crashed"));
    assert_eq!(status_of(&setup.requests, "R1").await, RequestStatus::Pending);
}

#[tokio::test]
async fn test_non_retryable_errors_are_dead_lettered_immediately() {
    let setup = setup(MockStrategy::accepting("api"), vec![]).await;

    let queue = Arc::new(InMemoryTaskQueue::new(5));
    queue.enqueue(QueueTask::new("missing")).await.unwrap();
    queue.close().await;

    let pool = WorkerPool::spawn(1, queue.clone(), setup.processor.clone());
    tokio::time::timeout(TIMEOUT, pool.join()).await.unwrap();

    let dead = queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 1);
    assert!(dead[0].reason.contains("not found"));
    assert_eq!(setup.strategy.calls(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_idle_workers() {
    let setup = setup(MockStrategy::accepting("api"), vec![]).await;
    let queue = Arc::new(InMemoryTaskQueue::new(1));

    let pool = WorkerPool::spawn(3, queue.clone(), setup.processor.clone());
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::time::timeout(TIMEOUT, pool.shutdown_and_join())
        .await
        .unwrap();
    assert!(!queue.is_closed().await);
}

#[tokio::test]
async fn test_shutdown_handle_stops_pool_from_another_task() {
    let setup = setup(MockStrategy::accepting("api"), vec![]).await;
    let queue = Arc::new(InMemoryTaskQueue::new(1));

    let pool = WorkerPool::spawn(2, queue.clone(), setup.processor.clone());
    let handle = pool.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.request();
    });

    tokio::time::timeout(TIMEOUT, pool.join()).await.unwrap();
}
