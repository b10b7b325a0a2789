#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Log a test phase marker for readable output.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = $name, "=== test phase ===");
    };
}

/// Log test completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "test complete");
    };
}
