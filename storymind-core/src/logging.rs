//! Tracing setup shared by the CLI and any other front-end.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `fmt` subscriber honoring `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; subsequent calls are no-ops (the global
/// subscriber can only be set once per process).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
