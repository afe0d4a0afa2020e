//! Structured logging using the tracing crate
//!
//! Every processing attempt runs inside a `request_span!`, strategy
//! hand-offs inside a `strategy_span!` and each queue consumer inside a
//! `worker_span!`, so a log line can always be tied back to the request
//! it concerns.
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG or TRACE (defaults to INFO)
//! - `LOG_FORMAT`: json, pretty or compact (defaults to json)
//! - `LOG_SPANS`: emit span open/close events (true/false, defaults to false)
//! - `RUST_LOG`: overrides all filtering (env_logger syntax)
//!
//! ```bash
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG submission-relay run < tasks.jsonl
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies that are far too chatty at the relay's default level
const QUIET_TARGETS: &[&str] = &["reqwest=warn", "hyper=warn", "hyper_util=warn", "tokio=warn"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line (log aggregation)
    Json,
    /// Multi-line, coloured (development)
    Pretty,
    /// Single-line, coloured (terminal)
    Compact,
}

impl LogFormat {
    /// Parse log format from string, defaulting to JSON
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Parse a `LOG_LEVEL` value, defaulting to INFO
pub fn parse_level(s: &str) -> Level {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" | "WARNING" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

fn parse_flag(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("true")
}

fn build_filter(level: Level) -> EnvFilter {
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    QUIET_TARGETS
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(EnvFilter::new(level.to_string()), |filter, directive| {
            filter.add_directive(directive)
        })
}

/// Initialize logging with manual configuration.
///
/// Installing a second global subscriber is ignored rather than treated as
/// fatal, so tests and embedders may call this more than once.
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) {
    let span_events = if include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let subscriber = tracing_subscriber::registry().with(build_filter(level));

    let result = match format {
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_span_events(span_events),
            )
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already installed");
    }
}

/// Initialize logging from environment variables
pub fn init_default_logging() {
    let level = parse_level(&env::var("LOG_LEVEL").unwrap_or_default());
    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
    let include_spans = parse_flag(&env::var("LOG_SPANS").unwrap_or_default());

    init_logging(level, format, include_spans);
}

/// Span covering one processing attempt for one request
#[macro_export]
macro_rules! request_span {
    ($($field:tt)*) => {
        tracing::info_span!("request_processing", $($field)*)
    };
}

/// Span covering one strategy hand-off
#[macro_export]
macro_rules! strategy_span {
    ($($field:tt)*) => {
        tracing::info_span!("strategy_submit", $($field)*)
    };
}

/// Span covering a queue consumer's lifetime
#[macro_export]
macro_rules! worker_span {
    ($($field:tt)*) => {
        tracing::info_span!("queue_worker", $($field)*)
    };
}

pub use {request_span, strategy_span, worker_span};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(" Compact "), LogFormat::Compact);
    }

    #[test]
    fn test_log_format_invalid_defaults_to_json() {
        for input in ["", "xml", "yaml", "plain"] {
            assert_eq!(LogFormat::parse(input), LogFormat::Json, "input: {input}");
        }
    }

    #[test]
    fn test_parse_level() {
        let cases = [
            ("ERROR", Level::ERROR),
            ("warn", Level::WARN),
            ("Warning", Level::WARN),
            ("info", Level::INFO),
            ("DEBUG", Level::DEBUG),
            ("trace", Level::TRACE),
            ("loud", Level::INFO),
            ("", Level::INFO),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_level(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("1"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_quiet_targets_are_valid_directives() {
        for directive in QUIET_TARGETS {
            assert!(
                directive.parse::<Directive>().is_ok(),
                "bad directive {directive}"
            );
        }
    }
}
