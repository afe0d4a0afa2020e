//! JSON file store
//!
//! One pretty-printed JSON document per record:
//!
//! ```text
//! <data_dir>/requests/<request-id>.json
//! <data_dir>/raw/<raw-record-id>.json
//! ```
//!
//! Writes go to a temporary file that is then renamed over the target, so a
//! reader never sees a half-written record. The compare-and-swap guard only
//! serializes writers inside one process.

use super::{RawRecordStore, RequestStore};
use crate::error::{EntityKind, RelayError, RelayResult};
use crate::model::{RawRecordId, RawSubmission, RequestId, RequestStatus, SubmissionRequest};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Request and raw-record store over a data directory
#[derive(Debug)]
pub struct JsonFileStore {
    requests_dir: PathBuf,
    raw_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store, creating its directories if needed
    pub async fn open(data_dir: impl AsRef<Path>) -> RelayResult<Self> {
        let data_dir = data_dir.as_ref();
        let store = Self {
            requests_dir: data_dir.join("requests"),
            raw_dir: data_dir.join("raw"),
            write_lock: Mutex::new(()),
        };
        fs::create_dir_all(&store.requests_dir).await?;
        fs::create_dir_all(&store.raw_dir).await?;
        debug!(data_dir = %data_dir.display(), "Opened JSON file store");
        Ok(store)
    }

    /// Store a raw record (intake side; used for seeding and tests)
    pub async fn insert_raw(&self, record: &RawSubmission) -> RelayResult<()> {
        let path = record_path(&self.raw_dir, record.id.as_str())?;
        write_json(&path, record).await
    }

    async fn read_request(&self, id: &RequestId) -> RelayResult<SubmissionRequest> {
        let path = record_path(&self.requests_dir, id.as_str())?;
        read_json(&path)
            .await?
            .ok_or_else(|| RelayError::not_found(EntityKind::Request, id.as_str()))
    }
}

/// Map a record ID to a file path, refusing IDs that could escape the directory
fn record_path(dir: &Path, id: &str) -> RelayResult<PathBuf> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if !valid {
        return Err(RelayError::storage(format!(
            "record id '{id}' cannot be used as a file name"
        )));
    }
    Ok(dir.join(format!("{id}.json")))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> RelayResult<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> RelayResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl RequestStore for JsonFileStore {
    async fn load(&self, id: &RequestId) -> RelayResult<SubmissionRequest> {
        self.read_request(id).await
    }

    async fn save(&self, request: &SubmissionRequest) -> RelayResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = record_path(&self.requests_dir, request.id.as_str())?;
        write_json(&path, request).await
    }

    async fn save_if_status(
        &self,
        request: &SubmissionRequest,
        expected: RequestStatus,
    ) -> RelayResult<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.read_request(&request.id).await?;
        if current.status != expected {
            return Err(RelayError::Conflict {
                request_id: request.id.clone(),
                expected,
                found: current.status,
            });
        }
        let path = record_path(&self.requests_dir, request.id.as_str())?;
        write_json(&path, request).await
    }
}

#[async_trait]
impl RawRecordStore for JsonFileStore {
    async fn load(&self, id: &RawRecordId) -> RelayResult<RawSubmission> {
        let path = record_path(&self.raw_dir, id.as_str())?;
        read_json(&path)
            .await?
            .ok_or_else(|| RelayError::not_found(EntityKind::RawRecord, id.as_str()))
    }

    async fn delete_by_request_reference(&self, id: &RawRecordId) -> RelayResult<bool> {
        let path = record_path(&self.raw_dir, id.as_str())?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
