use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(level: &str) {
    let level = if level.trim().is_empty() {
        DEFAULT_LOG_LEVEL
    } else {
        level.trim()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    // A second initialisation (tests, repeated tool runs in one process) is not an error.
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
