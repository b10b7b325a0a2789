//! Terminal reason types.
//!
//! A node in the scope tree becomes done exactly once, and the cause is
//! recorded as a [`DoneReason`]. There are exactly two: an explicit cancel
//! request, or an elapsed deadline. Once recorded, the reason never changes.

use core::fmt;

/// Why a scope became done.
///
/// Retrieved via [`Context::reason`](crate::Context::reason) once the scope
/// is done; before that point there is no reason to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoneReason {
    /// Explicit cancellation requested through a [`CancelHandle`](crate::CancelHandle).
    Canceled,
    /// The scope's effective deadline elapsed.
    DeadlineExceeded,
}

impl DoneReason {
    /// Returns true if this reason is [`DoneReason::Canceled`].
    #[must_use]
    pub const fn is_canceled(self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Returns true if this reason is [`DoneReason::DeadlineExceeded`].
    #[must_use]
    pub const fn is_deadline_exceeded(self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

impl fmt::Display for DoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => write!(f, "canceled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

impl std::error::Error for DoneReason {}
