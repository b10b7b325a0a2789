//! Request-scope handles: derivation, cancellation, deadlines, values.
//!
//! A [`Context`] is a cheap clonable handle to one node of the scope tree.
//! Scopes are derived, never mutated: every `with_*` constructor returns a
//! new child and leaves the parent untouched. Cancelling or expiring a scope
//! makes its entire subtree done exactly once, including children derived
//! concurrently with (or after) the trigger.
//!
//! # Example
//!
//! ```
//! use reqscope::{Context, DoneReason};
//! use std::time::Duration;
//!
//! let root = Context::background();
//! let (scope, cancel) = root.with_timeout(Duration::from_secs(5));
//!
//! // A worker observes the scope cooperatively.
//! let observer = scope.done();
//! cancel.cancel();
//! assert_eq!(observer.wait(), DoneReason::Canceled);
//! assert_eq!(scope.reason(), Some(DoneReason::Canceled));
//! ```

use crate::done::Done;
use crate::key::Key;
use crate::node::{Node, NodeKind};
use crate::reason::DoneReason;
use crate::timer;
use crate::tracing_compat::debug;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A handle to one scope in the cancellation/deadline/value tree.
///
/// Clones share the node: a signal observed through one clone is observed
/// through all. Derivation walks only downward; a scope never learns about
/// its siblings and never mutates its ancestors.
#[derive(Clone)]
pub struct Context {
    node: Arc<Node>,
}

/// The explicit trigger half of a cancelable scope.
///
/// Calling [`cancel`](CancelHandle::cancel) makes the scope (and its whole
/// subtree) done with [`DoneReason::Canceled`]. Idempotent: the first
/// trigger from any path wins and later calls change nothing. Dropping the
/// handle does *not* cancel the scope.
#[derive(Clone)]
pub struct CancelHandle {
    node: Arc<Node>,
}

impl CancelHandle {
    /// Requests cancellation of the scope this handle was derived with.
    pub fn cancel(&self) {
        if self.node.complete(DoneReason::Canceled) {
            debug!("scope canceled");
        }
    }
}

impl Context {
    /// The root scope for genuine top-level entry points.
    ///
    /// Never done, no deadline, no values.
    #[must_use]
    pub fn background() -> Self {
        Self {
            node: Node::root(NodeKind::Background),
        }
    }

    /// A placeholder root for call sites that have not yet decided which
    /// scope to thread through. Behaves like [`Context::background`] but is
    /// distinguishable in `Debug` output, so outstanding placeholders are
    /// easy to find.
    #[must_use]
    pub fn todo() -> Self {
        Self {
            node: Node::root(NodeKind::Todo),
        }
    }

    /// Derives a scope that can be canceled through the returned handle.
    ///
    /// If this scope is already done, the child is returned born-done with
    /// the same reason. Never fails, never blocks.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let node = Node::child(&self.node, NodeKind::Cancel, self.node.deadline(), None);
        let handle = CancelHandle {
            node: Arc::clone(&node),
        };
        (Self { node }, handle)
    }

    /// Derives a scope that is done no later than `at`, with
    /// [`DoneReason::DeadlineExceeded`] if the deadline fires first.
    ///
    /// The child's effective deadline is `min(at, parent effective)`: asking
    /// for a later deadline than an ancestor's cannot extend it. A deadline
    /// already in the past expires the scope immediately. The returned
    /// handle cancels manually, exactly as with [`Context::with_cancel`].
    #[must_use]
    pub fn with_deadline(&self, at: Instant) -> (Self, CancelHandle) {
        let effective = match self.node.deadline() {
            Some(parent) => parent.min(at),
            None => at,
        };
        let node = Node::child(&self.node, NodeKind::Deadline, Some(effective), None);
        if !node.is_done() {
            if effective <= Instant::now() {
                node.complete(DoneReason::DeadlineExceeded);
            } else {
                timer::arm(effective, &node);
            }
        }
        let handle = CancelHandle {
            node: Arc::clone(&node),
        };
        (Self { node }, handle)
    }

    /// Sugar over [`Context::with_deadline`] at `now + timeout`.
    ///
    /// A duration too large to represent as a deadline degrades to a plain
    /// cancelable scope; it could never elapse anyway.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        match Instant::now().checked_add(timeout) {
            Some(at) => self.with_deadline(at),
            None => self.with_cancel(),
        }
    }

    /// Derives a scope carrying one key/value pair layered in front of this
    /// scope's chain. The parent's pairs are neither copied nor merged, and
    /// no existing chain is ever mutated.
    #[must_use]
    pub fn with_value<T: Send + Sync + 'static>(&self, key: Key<T>, value: T) -> Self {
        let erased: Arc<dyn Any + Send + Sync> = Arc::new(value);
        let node = Node::child(
            &self.node,
            NodeKind::Value,
            self.node.deadline(),
            Some((key.id(), erased)),
        );
        Self { node }
    }

    /// Polls whether this scope is done. Lock-free.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.node.is_done()
    }

    /// The terminal reason, or `None` while the scope is still pending.
    #[must_use]
    pub fn reason(&self) -> Option<DoneReason> {
        self.node.reason()
    }

    /// Returns an observer handle for this scope's done signal.
    ///
    /// Each call returns an independent observer; all outstanding observers
    /// are released exactly once when the scope becomes done.
    #[must_use]
    pub fn done(&self) -> Done {
        Done::new(Arc::clone(&self.node))
    }

    /// The effective deadline: the earliest among this scope and all its
    /// ancestors, or `None` if nothing on the path carries one.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.node.deadline()
    }

    /// Looks up the value for `key`, scanning this scope and then its
    /// ancestors toward the root. The nearest match wins; `None` once the
    /// root is passed without one. Never traverses siblings or children.
    #[must_use]
    pub fn value<T: Send + Sync + 'static>(&self, key: Key<T>) -> Option<Arc<T>> {
        let mut current = Some(&self.node);
        while let Some(node) = current {
            if let Some((id, value)) = node.pair() {
                if *id == key.id() {
                    return Arc::clone(value).downcast().ok();
                }
            }
            current = node.parent();
        }
        None
    }
}

impl fmt::Debug for Context {
    /// Renders the derivation chain root-first, e.g.
    /// `Background.with_timeout.with_cancel.with_value`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut labels = Vec::new();
        let mut current = Some(&self.node);
        while let Some(node) = current {
            labels.push(node.kind().label());
            current = node.parent();
        }
        labels.reverse();
        write!(f, "{}", labels.join("."))
    }
}
