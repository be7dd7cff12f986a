//! Structured logging using the tracing crate
//!
//! ## Log Format Options
//!
//! `LOG_FORMAT` selects the output format:
//!
//! - `json` - Structured JSON for log aggregation (default)
//! - `pretty` - Human-readable with colors and indentation
//! - `compact` - Terminal-friendly single lines
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG, TRACE - defaults to INFO
//! - `LOG_FORMAT`: json, pretty, compact - defaults to json
//! - `LOG_SPANS`: emit span open/close events (true/false) - defaults to false
//! - `RUST_LOG`: replaces the filter entirely (env_logger syntax)
//!
//! ```bash
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG ./device-sim run
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies whose logs are capped at WARN
const QUIET_DEPENDENCIES: &[&str] = &["rumqttc", "tokio"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with colors but minimal spacing (terminal-friendly)
    Compact,
}

impl LogFormat {
    /// Parse log format from string; unknown values fall back to JSON
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Parse a level name; unknown values fall back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

fn parse_flag(s: &str) -> bool {
    s.eq_ignore_ascii_case("true")
}

/// Build the event filter, letting `RUST_LOG` override the defaults
pub fn build_filter(level: Level, rust_log: Option<String>) -> EnvFilter {
    if let Some(rust_log) = rust_log {
        return EnvFilter::new(rust_log);
    }

    QUIET_DEPENDENCIES
        .iter()
        .filter_map(|target| format!("{target}=warn").parse().ok())
        .fold(EnvFilter::new(level.to_string()), |filter, directive| {
            filter.add_directive(directive)
        })
}

/// Initialize logging with manual configuration
///
/// Does nothing if a global subscriber is already installed.
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) {
    let filter = build_filter(level, env::var("RUST_LOG").ok());
    let subscriber = tracing_subscriber::registry().with(filter);

    let span_events = if include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let result = match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_span_events(span_events))
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
        tracing::debug!("Global subscriber already installed");
    }
}

/// Initialize logging from environment variables
pub fn init_default_logging() {
    let level = parse_level(&env::var("LOG_LEVEL").unwrap_or_default());
    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
    let include_spans = parse_flag(&env::var("LOG_SPANS").unwrap_or_default());

    init_logging(level, format, include_spans);
}

/// Create a span around broker connection work
#[macro_export]
macro_rules! connection_span {
    ($($field:tt)*) => {
        tracing::info_span!("broker_connection", $($field)*)
    };
}

/// Create a span around one telemetry tick
#[macro_export]
macro_rules! telemetry_span {
    ($($field:tt)*) => {
        tracing::info_span!("telemetry_tick", $($field)*)
    };
}

pub use {connection_span, telemetry_span};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("CoMpAcT"), LogFormat::Compact);
    }

    #[test]
    fn test_log_format_parse_invalid_defaults_to_json() {
        assert_eq!(LogFormat::parse(""), LogFormat::Json);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Json);
    }

    #[test]
    fn test_parse_level() {
        let cases = [
            ("ERROR", Level::ERROR),
            ("warn", Level::WARN),
            ("Info", Level::INFO),
            ("DEBUG", Level::DEBUG),
            ("trace", Level::TRACE),
            ("", Level::INFO),
            ("verbose", Level::INFO),
        ];

        for (input, expected) in cases {
            assert_eq!(parse_level(input), expected, "Failed for input: {input}");
        }
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("1"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_build_filter_quiets_dependencies() {
        let filter = build_filter(Level::DEBUG, None).to_string().to_lowercase();
        assert!(filter.contains("rumqttc=warn"));
        assert!(filter.contains("debug"));
    }

    #[test]
    fn test_build_filter_rust_log_override() {
        let filter = build_filter(Level::INFO, Some("device_sim=trace".to_string()))
            .to_string()
            .to_lowercase();
        assert!(filter.contains("device_sim=trace"));
        assert!(!filter.contains("rumqttc"));
    }

    #[test]
    fn test_span_macros_take_fields() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let tick = crate::telemetry_span!(tick = 3u64);
            let metadata = tick.metadata().expect("span enabled");
            assert_eq!(metadata.name(), "telemetry_tick");
            assert!(metadata.fields().field("tick").is_some());

            let connect =
                crate::connection_span!(phase = "initial_connect", broker = %"localhost");
            let metadata = connect.metadata().expect("span enabled");
            assert_eq!(metadata.name(), "broker_connection");
            assert!(metadata.fields().field("phase").is_some());
            assert!(metadata.fields().field("broker").is_some());
        });
    }

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging(Level::INFO, LogFormat::Compact, false);
        init_logging(Level::DEBUG, LogFormat::Json, true);
    }
}
