//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide tracing from the environment.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    self::tracing::init(self::tracing::TracingConfig::from_env());
}

/// Initialize tracing for tests: human-readable output captured by the test
/// harness, `debug` for this workspace's crates unless `RUST_LOG` says otherwise.
pub fn init_for_tests() {
    self::tracing::init(self::tracing::TracingConfig::for_tests());
}

pub mod tracing;

pub use self::tracing::{LogFormat, TracingConfig};
