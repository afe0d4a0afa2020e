//! In-memory stores
//!
//! Used by tests and as the destination catalog built from configuration.
//! Write and delete counters let tests assert how many side effects an
//! attempt produced.

use super::{DestinationStore, RawRecordStore, RequestStore};
use crate::error::{EntityKind, RelayError, RelayResult};
use crate::model::{
    Destination, DestinationId, RawRecordId, RawSubmission, RequestId, RequestStatus,
    SubmissionRequest,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Request store backed by a map
#[derive(Debug, Default)]
pub struct MemoryRequestStore {
    records: RwLock<HashMap<RequestId, SubmissionRequest>>,
    writes: AtomicUsize,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requests(requests: impl IntoIterator<Item = SubmissionRequest>) -> Self {
        let records = requests
            .into_iter()
            .map(|request| (request.id.clone(), request))
            .collect();
        Self {
            records: RwLock::new(records),
            writes: AtomicUsize::new(0),
        }
    }

    /// Seed a request without counting it as a write
    pub async fn insert(&self, request: SubmissionRequest) {
        self.records
            .write()
            .await
            .insert(request.id.clone(), request);
    }

    pub async fn get(&self, id: &RequestId) -> Option<SubmissionRequest> {
        self.records.read().await.get(id).cloned()
    }

    /// Number of successful `save`/`save_if_status` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn load(&self, id: &RequestId) -> RelayResult<SubmissionRequest> {
        self.get(id)
            .await
            .ok_or_else(|| RelayError::not_found(EntityKind::Request, id.as_str()))
    }

    async fn save(&self, request: &SubmissionRequest) -> RelayResult<()> {
        self.records
            .write()
            .await
            .insert(request.id.clone(), request.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_if_status(
        &self,
        request: &SubmissionRequest,
        expected: RequestStatus,
    ) -> RelayResult<()> {
        // Compare and write under one lock so two writers cannot both win
        let mut records = self.records.write().await;
        let current = records
            .get(&request.id)
            .ok_or_else(|| RelayError::not_found(EntityKind::Request, request.id.as_str()))?;

        if current.status != expected {
            return Err(RelayError::Conflict {
                request_id: request.id.clone(),
                expected,
                found: current.status,
            });
        }

        records.insert(request.id.clone(), request.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Destination catalog built once and read concurrently
#[derive(Debug, Default, Clone)]
pub struct MemoryDestinationStore {
    destinations: HashMap<DestinationId, Destination>,
}

impl MemoryDestinationStore {
    pub fn new(destinations: impl IntoIterator<Item = Destination>) -> Self {
        Self {
            destinations: destinations
                .into_iter()
                .map(|destination| (destination.id.clone(), destination))
                .collect(),
        }
    }

    /// Catalog from the `[[destinations]]` configuration entries
    pub fn from_config(destinations: &[Destination]) -> Self {
        Self::new(destinations.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

#[async_trait]
impl DestinationStore for MemoryDestinationStore {
    async fn load(&self, id: &DestinationId) -> RelayResult<Destination> {
        self.destinations
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::not_found(EntityKind::Destination, id.as_str()))
    }
}

/// Raw record store backed by a map
#[derive(Debug, Default)]
pub struct MemoryRawRecordStore {
    records: RwLock<HashMap<RawRecordId, RawSubmission>>,
    delete_calls: AtomicUsize,
}

impl MemoryRawRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: RawSubmission) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    pub async fn contains(&self, id: &RawRecordId) -> bool {
        self.records.read().await.contains_key(id)
    }

    /// Number of `delete_by_request_reference` calls, including no-op ones
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RawRecordStore for MemoryRawRecordStore {
    async fn load(&self, id: &RawRecordId) -> RelayResult<RawSubmission> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::not_found(EntityKind::RawRecord, id.as_str()))
    }

    async fn delete_by_request_reference(&self, id: &RawRecordId) -> RelayResult<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(id: &str) -> SubmissionRequest {
        SubmissionRequest::pending(id, "D1", format!("W-{id}"), json!({}))
    }

    #[tokio::test]
    async fn test_load_missing_request_is_not_found() {
        let store = MemoryRequestStore::new();
        let err = store.load(&RequestId::new("nope")).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::NotFound {
                entity: EntityKind::Request,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_save_if_status_detects_conflict() {
        let store = MemoryRequestStore::with_requests([pending("R1")]);

        let mut submitted = pending("R1");
        submitted.status = RequestStatus::Submitted;
        store
            .save_if_status(&submitted, RequestStatus::Pending)
            .await
            .unwrap();

        let mut failed = pending("R1");
        failed.status = RequestStatus::Failed;
        let err = store
            .save_if_status(&failed, RequestStatus::Pending)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::Conflict {
                found: RequestStatus::Submitted,
                ..
            }
        ));
        assert_eq!(store.write_count(), 1);
        assert_eq!(
            store.get(&RequestId::new("R1")).await.unwrap().status,
            RequestStatus::Submitted
        );
    }

    #[tokio::test]
    async fn test_seeding_is_not_a_write() {
        let store = MemoryRequestStore::new();
        store.insert(pending("R1")).await;
        assert_eq!(store.write_count(), 0);
        store.save(&pending("R1")).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_destination_lookup() {
        let store = MemoryDestinationStore::new([Destination::new("D1", "Records", "api")]);
        assert_eq!(store.len(), 1);
        assert!(store.load(&DestinationId::new("D1")).await.is_ok());
        assert!(matches!(
            store.load(&DestinationId::new("D2")).await,
            Err(RelayError::NotFound {
                entity: EntityKind::Destination,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_raw_delete_is_idempotent() {
        let store = MemoryRawRecordStore::new();
        store.insert(RawSubmission::new("W1", json!({"a": 1}))).await;

        let id = RawRecordId::new("W1");
        assert!(store.delete_by_request_reference(&id).await.unwrap());
        assert!(!store.delete_by_request_reference(&id).await.unwrap());
        assert!(!store.contains(&id).await);
        assert_eq!(store.delete_calls(), 2);
    }
}
