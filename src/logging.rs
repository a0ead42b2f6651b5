//! Tracing subscriber setup.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` wins over the configured level when it is set and parses.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Pick the filter: `RUST_LOG`, then `level`, then `info`.
pub fn build_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .or_else(|| EnvFilter::try_new(level.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(level: &str, format: LogFormat) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(rust_log.as_deref(), level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
