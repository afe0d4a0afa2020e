//! Strategy selection
//!
//! Maps a destination's `submission_format` selector to a registered
//! strategy. New protocols are added by registering another strategy; the
//! processor never changes.

use super::{
    ApiStrategyConfig, ApiSubmissionStrategy, EmailSubmissionStrategy, SpoolMailer,
    SubmissionStrategy,
};
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::model::{normalize_format, Destination};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of strategies keyed by normalized selector.
///
/// Built during startup, read-only afterwards.
#[derive(Default)]
pub struct StrategyFactory {
    strategies: HashMap<String, Arc<dyn SubmissionStrategy>>,
}

impl StrategyFactory {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Factory with the built-in `api` and `email` strategies
    pub fn from_config(config: &RelayConfig) -> RelayResult<Self> {
        let api = ApiSubmissionStrategy::new(ApiStrategyConfig::from(&config.api))?;
        let mailer = Arc::new(SpoolMailer::new(config.email.spool_dir.clone()));
        let email = EmailSubmissionStrategy::new(mailer, config.email.from_address.clone());

        let mut factory = Self::new();
        factory.register("api", Arc::new(api))?;
        factory.register("email", Arc::new(email))?;
        Ok(factory)
    }

    /// Register a strategy for a selector
    pub fn register(
        &mut self,
        format: &str,
        strategy: Arc<dyn SubmissionStrategy>,
    ) -> RelayResult<()> {
        let key = normalize_format(format);
        if self.strategies.contains_key(&key) {
            return Err(RelayError::DuplicateStrategy { format: key });
        }
        self.strategies.insert(key, strategy);
        Ok(())
    }

    /// Strategy for a destination.
    ///
    /// # Errors
    ///
    /// `UnsupportedDestination` if nothing is registered for the destination's
    /// selector.
    pub fn get_strategy(&self, destination: &Destination) -> RelayResult<Arc<dyn SubmissionStrategy>> {
        self.strategies
            .get(&destination.format_key())
            .cloned()
            .ok_or_else(|| {
                RelayError::unsupported_destination(
                    destination.id.as_str(),
                    destination.submission_format.as_str(),
                )
            })
    }

    /// Registered selectors, sorted
    pub fn formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.strategies.keys().cloned().collect();
        formats.sort();
        formats
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
