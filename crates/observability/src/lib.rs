//! Tracing and logging setup shared by the binary and tests.

/// Initialize process-wide tracing from `config`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &LogConfig) {
    tracing::init(config);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat};
