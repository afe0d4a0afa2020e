//! Record store abstractions
//!
//! The relay reaches its persistence through these traits so the processor
//! can be wired to the in-memory stores in tests, to the JSON file store in
//! the CLI, or to any external database adapter.

pub mod file;
pub mod memory;

use crate::error::RelayResult;
use crate::model::{
    Destination, DestinationId, RawRecordId, RawSubmission, RequestId, RequestStatus,
    SubmissionRequest,
};
use async_trait::async_trait;

pub use file::JsonFileStore;
pub use memory::{MemoryDestinationStore, MemoryRawRecordStore, MemoryRequestStore};

/// Mutable store of submission requests
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Load a request, failing with `NotFound` if it does not exist
    async fn load(&self, id: &RequestId) -> RelayResult<SubmissionRequest>;

    /// Unconditionally write a request (last write wins)
    async fn save(&self, request: &SubmissionRequest) -> RelayResult<()>;

    /// Write a request only if the stored copy still has status `expected`.
    ///
    /// Fails with `Conflict` when another writer moved the request first and
    /// with `NotFound` if the request disappeared.
    async fn save_if_status(
        &self,
        request: &SubmissionRequest,
        expected: RequestStatus,
    ) -> RelayResult<()>;
}

/// Read-only store of destination entities
#[async_trait]
pub trait DestinationStore: Send + Sync {
    async fn load(&self, id: &DestinationId) -> RelayResult<Destination>;
}

/// Store of raw captured form records
#[async_trait]
pub trait RawRecordStore: Send + Sync {
    async fn load(&self, id: &RawRecordId) -> RelayResult<RawSubmission>;

    /// Delete the raw record a request refers to.
    ///
    /// Returns `Ok(false)` if it was already gone, so repeating the call is a
    /// no-op.
    async fn delete_by_request_reference(&self, id: &RawRecordId) -> RelayResult<bool>;
}
