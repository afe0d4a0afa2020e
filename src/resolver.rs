//! Routing resolution
//!
//! Decides which destination a request goes to. The default resolver simply
//! follows the destination reference stored on the request.

use crate::error::RelayResult;
use crate::model::{Destination, SubmissionRequest};
use crate::store::DestinationStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Request → destination routing
#[async_trait]
pub trait RoutingResolver: Send + Sync {
    /// Resolve the destination for a request.
    ///
    /// # Errors
    ///
    /// `NotFound` if the referenced destination no longer exists.
    async fn resolve(&self, request: &SubmissionRequest) -> RelayResult<Destination>;
}

/// Resolver that loads `request.destination_id` from a destination store
pub struct StoreRoutingResolver {
    destinations: Arc<dyn DestinationStore>,
}

impl StoreRoutingResolver {
    pub fn new(destinations: Arc<dyn DestinationStore>) -> Self {
        Self { destinations }
    }
}

#[async_trait]
impl RoutingResolver for StoreRoutingResolver {
    async fn resolve(&self, request: &SubmissionRequest) -> RelayResult<Destination> {
        let destination = self.destinations.load(&request.destination_id).await?;
        debug!(
            request_id = %request.id,
            destination_id = %destination.id,
            submission_format = %destination.submission_format,
            "Resolved destination"
        );
        Ok(destination)
    }
}
