//! Logging utilities.
//!
//! Provides structured JSON or pretty logging through `tracing-subscriber`,
//! plus run identifiers for correlating the log lines of one decision pass.
//!
//! # Noise Filtering
//!
//! By default, noisy library modules are set to `warn` level to reduce log
//! clutter while keeping business logs at the specified level. `RUST_LOG`
//! overrides the whole filter.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default noisy modules that should be filtered to warn level.
///
/// Market-data and broker collaborators usually sit on an HTTP stack; their
/// connection-level chatter carries no decision context.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tokio_util",
    "tungstenite",
];

/// Build the filter directive string: base level, then `module=warn` clamps.
fn directives(log_level: &str, excluded_targets: &[String]) -> String {
    let mut directives = String::from(log_level);

    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }
    for target in excluded_targets {
        directives.push_str(&format!(",{}=warn", target));
    }

    directives
}

/// Build the EnvFilter, preferring `RUST_LOG` when set.
fn build_filter(log_level: &str, excluded_targets: &[String]) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(log_level, excluded_targets)))
}

fn install(filter: EnvFilter, log_format: &str) {
    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }
}

/// Initialize logging with the given configuration.
///
/// # Arguments
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - Output format: "json" for structured JSON, "pretty" for human-readable
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_logging(log_level: &str, log_format: &str) {
    init_logging_with_exclusions(log_level, log_format, &[]);
}

/// Initialize logging with custom excluded targets.
///
/// Like `init_logging`, but additionally clamps `excluded_targets` to `warn`.
pub fn init_logging_with_exclusions(
    log_level: &str,
    log_format: &str,
    excluded_targets: &[String],
) {
    install(build_filter(log_level, excluded_targets), log_format);

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len() + excluded_targets.len(),
        "Logging initialized"
    );
}

/// Generate a new trace ID for a decision run.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_modules_list() {
        assert!(NOISY_MODULES.contains(&"hyper"));
        assert!(NOISY_MODULES.contains(&"reqwest"));
        assert!(NOISY_MODULES.contains(&"h2"));
    }

    #[test]
    fn test_directives_include_exclusions() {
        let d = directives("debug", &["zero_rebalance::data".to_string()]);
        assert!(d.starts_with("debug,"));
        assert!(d.contains("hyper=warn"));
        assert!(d.ends_with("zero_rebalance::data=warn"));
    }

    #[test]
    fn test_generate_trace_id() {
        let a = generate_trace_id();
        let b = generate_trace_id();
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("info", "pretty");
        init_logging("debug", "json");
    }
}
