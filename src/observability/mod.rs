//! Observability: structured logging and in-process metrics

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{request_span, strategy_span, worker_span};
