//! Tracing compatibility layer for structured logging.
//!
//! Provides a unified logging interface whether or not the
//! `tracing-integration` feature is enabled:
//!
//! - **With the feature**: re-exports from the `tracing` crate.
//! - **Without it**: no-op macros that compile to nothing, keeping the crate
//!   dependency-free by default.
//!
//! # Usage
//!
//! ```rust,ignore
//! use reqscope::tracing_compat::{debug, trace};
//!
//! trace!(kind = "with_cancel", "scope derived");
//! debug!("scope canceled");
//! ```
//!
//! Enable real output by turning on the feature:
//!
//! ```toml
//! reqscope = { version = "0.1", features = ["tracing-integration"] }
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op implementations when tracing is disabled.
    //!
    //! These macros expand to nothing, ensuring zero compile-time and
    //! runtime cost.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op info-level logging macro.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }
}

#[cfg(not(feature = "tracing-integration"))]
pub use crate::{debug, error, info, trace, warn};
