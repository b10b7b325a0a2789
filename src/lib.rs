//! Reqscope: request-scoped cancellation, deadline propagation, and value chains.
//!
//! # Overview
//!
//! Reqscope models a request's lifetime as an immutable tree of scopes. A
//! caller derives child scopes from a root; derivation never mutates the
//! parent. Cancelling or expiring a scope makes its entire subtree done
//! exactly once, with an immutable terminal reason, and the signal reaches
//! children derived concurrently with (or after) the trigger. Each scope can
//! additionally carry one immutable key/value pair, looked up from a scope
//! outward through its ancestors with the nearest match winning.
//!
//! # Core Guarantees
//!
//! - **One-shot, monotonic done state**: a scope becomes done at most once;
//!   the recorded reason never changes afterward
//! - **No lost propagation**: a child derived from an already-done parent is
//!   born done; the derive/trigger race cannot produce a pending orphan
//! - **Effective deadlines**: a scope is done no later than the earliest
//!   deadline among itself and its ancestors
//! - **Cooperative, never preemptive**: the crate only signals; it performs
//!   no I/O and never forcibly stops caller work
//! - **No cross-tree contention**: one lock per scope, no global lock
//!
//! # Module Structure
//!
//! - [`context`]: The [`Context`] handle and all derivation constructors
//! - [`done`]: The [`Done`] observation handle (awaitable and blockable)
//! - [`reason`]: The terminal [`DoneReason`] taxonomy
//! - [`key`]: Typed, identity-compared [`Key`]s for the value chain
//! - [`tracing_compat`]: Feature-gated structured-logging shim
//!
//! # Example
//!
//! ```
//! use reqscope::{Context, DoneReason, Key};
//! use std::time::Duration;
//!
//! let request_id: Key<u64> = Key::new();
//!
//! let root = Context::background();
//! let (scope, cancel) = root.with_timeout(Duration::from_secs(30));
//! let scope = scope.with_value(request_id, 7);
//!
//! assert!(!scope.is_done());
//! assert_eq!(scope.value(request_id).as_deref(), Some(&7));
//!
//! cancel.cancel();
//! assert_eq!(scope.done().wait(), DoneReason::Canceled);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod done;
pub mod key;
pub mod reason;
pub mod tracing_compat;

mod node;
mod timer;

pub use context::{CancelHandle, Context};
pub use done::Done;
pub use key::Key;
pub use reason::DoneReason;
