use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::configs::LoggingConfig;

/// Builds the filter directive from config: `level` first, then any extra
/// per-target `filters`. Socket and HTTP internals are kept at `warn` unless
/// the config names them explicitly.
pub fn filter_directive(config: Option<&LoggingConfig>) -> String {
    let log_level = config
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");

    let filters = config.and_then(|l| l.filters.as_deref()).unwrap_or("");

    if filters.is_empty() {
        format!("{},tungstenite=warn,hyper_util=warn", log_level)
    } else {
        format!("{},tungstenite=warn,hyper_util=warn,{}", log_level, filters)
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the config. Calling
/// this when a subscriber is already installed is a no-op, so host
/// applications that set up their own tracing stay in control.
pub fn init(config: Option<&LoggingConfig>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(config.map(|l| l.thread_ids).unwrap_or(false))
        .with_line_number(true)
        .with_file(false);

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("global subscriber already installed; keeping it");
    }
}
