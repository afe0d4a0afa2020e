//! JSON file store tests
//!
//! Exercises the on-disk request and raw-record store, including the
//! status-guarded write and a full processing pass over a data directory.

use serde_json::json;
use std::sync::Arc;
use submission_relay::error::{EntityKind, RelayError};
use submission_relay::model::{RawRecordId, RequestId, RequestStatus};
use submission_relay::processor::{ProcessReport, SubmissionProcessor};
use submission_relay::queue::QueueTask;
use submission_relay::resolver::StoreRoutingResolver;
use submission_relay::store::{JsonFileStore, MemoryDestinationStore, RawRecordStore, RequestStore};
use submission_relay::strategy::StrategyFactory;
use submission_relay::testing::mocks::{
    api_destination, pending_request, raw_record, MockStrategy,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_file_store_round_trips_requests() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();
    let request = pending_request("R1", "D1", "W1");

    store.save(&request).await.unwrap();

    assert!(dir.path().join("requests/R1.json").exists());
    let loaded = RequestStore::load(&store, &RequestId::from("R1")).await.unwrap();
    assert_eq!(loaded, request);
}

#[tokio::test]
async fn test_file_store_reports_missing_records() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();

    let err = RequestStore::load(&store, &RequestId::from("nope"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::NotFound {
            entity: EntityKind::Request,
            ..
        }
    ));

    let err = RawRecordStore::load(&store, &RawRecordId::from("nope"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::NotFound {
            entity: EntityKind::RawRecord,
            ..
        }
    ));
}

#[tokio::test]
async fn test_file_store_guarded_save_detects_conflict() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();
    let request = pending_request("R1", "D1", "W1");
    store.save(&request).await.unwrap();

    let mut failed = request.clone();
    failed.status = RequestStatus::Failed;
    store
        .save_if_status(&failed, RequestStatus::Pending)
        .await
        .unwrap();

    let mut submitted = request.clone();
    submitted.status = RequestStatus::Submitted;
    let err = store
        .save_if_status(&submitted, RequestStatus::Pending)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RelayError::Conflict {
            found: RequestStatus::Failed,
            ..
        }
    ));
    let stored = RequestStore::load(&store, &request.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Failed);
}

#[tokio::test]
async fn test_file_store_raw_record_is_readable_until_deleted() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();
    let record = raw_record("W1");
    store.insert_raw(&record).await.unwrap();

    let id = RawRecordId::from("W1");
    let loaded = RawRecordStore::load(&store, &id).await.unwrap();
    assert_eq!(loaded, record);

    store.delete_by_request_reference(&id).await.unwrap();
    assert!(RawRecordStore::load(&store, &id).await.is_err());
}

#[tokio::test]
async fn test_file_store_delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();
    store.insert_raw(&raw_record("W1")).await.unwrap();

    let id = RawRecordId::from("W1");
    assert!(store.delete_by_request_reference(&id).await.unwrap());
    assert!(!store.delete_by_request_reference(&id).await.unwrap());
}

#[tokio::test]
async fn test_file_store_rejects_path_traversal_ids() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();

    let err = RequestStore::load(&store, &RequestId::from("../secrets"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Storage { .. }));
}

#[tokio::test]
async fn test_file_store_reads_integer_ids_written_by_intake() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::open(dir.path()).await.unwrap();

    std::fs::write(
        dir.path().join("requests/42.json"),
        json!({
            "id": 42,
            "status": "pending",
            "destination_id": 7,
            "raw_record_id": 1042,
            "form_values": {"name": "Ada"}
        })
        .to_string(),
    )
    .unwrap();

    let request = RequestStore::load(&store, &RequestId::from(42u64))
        .await
        .unwrap();
    assert_eq!(request.destination_id.as_str(), "7");
    assert_eq!(request.raw_record_id.as_str(), "1042");
    assert!(request.last_errors.is_empty());
}

#[tokio::test]
async fn test_processing_against_file_store() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
    store.save(&pending_request("R1", "D1", "W1")).await.unwrap();
    store.insert_raw(&raw_record("W1")).await.unwrap();

    let mut factory = StrategyFactory::new();
    factory
        .register(
            "api",
            Arc::new(MockStrategy::with_receipt("api", "CM-1", "TRK-1")),
        )
        .unwrap();
    let destinations = Arc::new(MemoryDestinationStore::new([api_destination(
        "D1",
        "http://localhost:9/in",
    )]));
    let processor = SubmissionProcessor::new(
        store.clone(),
        store.clone(),
        Arc::new(StoreRoutingResolver::new(destinations)),
        Arc::new(factory),
    );

    let report = processor.process(&QueueTask::new("R1")).await.unwrap();
    assert!(matches!(
        report,
        ProcessReport::Submitted {
            raw_record_deleted: true,
            ..
        }
    ));

    assert!(!dir.path().join("raw/W1.json").exists());
    let stored = RequestStore::load(store.as_ref(), &RequestId::from("R1"))
        .await
        .unwrap();
    assert_eq!(stored.status, RequestStatus::Submitted);
    assert_eq!(stored.tracking_number.as_deref(), Some("TRK-1"));
}
