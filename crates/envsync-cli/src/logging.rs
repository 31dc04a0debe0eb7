// Tracing initialization with configurable and reloadable log level.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> = OnceLock::new();

/// Builds the active filter: a valid RUST_LOG wins, otherwise `level`.
fn build_filter(level: &str) -> EnvFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

pub fn init_logging(level: &str) {
    let (reload_layer, handle) = reload::Layer::new(build_filter(level));
    let _ = LOG_RELOAD_HANDLE.set(handle);

    // Logs go to stderr so command output on stdout stays clean.
    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Apply a new logging level at runtime if reload handle is configured.
///
/// RUST_LOG, when set, still takes precedence over `level`.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = build_filter(level);
        });
    }
}
