//! The scope tree node.
//!
//! A [`Node`] is the shared state behind every [`Context`](crate::Context)
//! handle: the parent link, the child registry, the one-shot done state with
//! its waiter list, the resolved effective deadline, and (for value nodes)
//! a single key/value pair.
//!
//! # Locking discipline
//!
//! Each node has exactly one lock over its mutable state; parent links,
//! deadlines, and value pairs are immutable after construction and read
//! without synchronization. No operation holds two node locks at once:
//! derivation locks only the parent, and completion releases the node's own
//! lock before touching children or the parent. Lock acquisition order is
//! therefore trivially acyclic and unrelated nodes never contend.
//!
//! # The derive/complete race
//!
//! The parent's lock is held across "check done state, register child" during
//! derivation and across "record reason, snapshot children" during
//! completion. A concurrent derivation therefore either observes the reason
//! already recorded (and the child is constructed born-done) or lands in the
//! registry before the snapshot is taken and is notified. No interleaving
//! lets a child escape.

use crate::reason::DoneReason;
use crate::tracing_compat::trace;
use std::any::Any;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::task::Waker;
use std::time::Instant;

/// What produced a node; used only for `Debug` rendering of a context chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Background,
    Todo,
    Cancel,
    Deadline,
    Value,
}

impl NodeKind {
    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::Background => "Background",
            Self::Todo => "TODO",
            Self::Cancel => "with_cancel",
            Self::Deadline => "with_deadline",
            Self::Value => "with_value",
        }
    }
}

/// Mutable node state, guarded by the node's single lock.
struct State {
    /// Terminal reason; `Some` exactly when the node is done.
    reason: Option<DoneReason>,
    /// Registered children awaiting propagation. Weak: a child no caller can
    /// reach needs no notification. Emptied when the node completes.
    children: Vec<Weak<Node>>,
    /// Wakers of pending [`Done`](crate::Done) observers. Slots are reused
    /// so a dropped observer leaves no hole that grows the vec.
    waiters: Vec<Option<Waker>>,
}

/// One node in the scope tree.
pub(crate) struct Node {
    /// Strong link: live descendants keep the ancestor chain alive for
    /// value lookup and deadline resolution. `None` only for roots.
    parent: Option<Arc<Node>>,
    kind: NodeKind,
    /// Effective deadline, resolved at construction:
    /// `min(own requested, parent effective)`. Immutable.
    deadline: Option<Instant>,
    /// Key identity and erased value, present only on value nodes.
    pair: Option<(u64, Arc<dyn Any + Send + Sync>)>,
    /// Whether any node on this path (self or ancestor) can ever fire.
    /// Children of never-firing chains skip registration entirely.
    can_fire: bool,
    /// Lock-free done fast path; set under the lock, after the reason.
    done: AtomicBool,
    state: Mutex<State>,
    done_cv: Condvar,
}

impl Node {
    /// Creates a root node: no parent, no deadline, no value, never done.
    pub(crate) fn root(kind: NodeKind) -> Arc<Self> {
        trace!(kind = kind.label(), "scope root created");
        Arc::new(Self {
            parent: None,
            kind,
            deadline: None,
            pair: None,
            can_fire: false,
            done: AtomicBool::new(false),
            state: Mutex::new(State {
                reason: None,
                children: Vec::new(),
                waiters: Vec::new(),
            }),
            done_cv: Condvar::new(),
        })
    }

    /// Derives a child of `parent`.
    ///
    /// `deadline` must already be the child's *effective* deadline (the
    /// caller resolves the min against the parent). If the parent is already
    /// done the child is returned born-done with the parent's reason; there
    /// is no window in which the returned child is observably pending while
    /// the parent is done. Never fails, never blocks.
    pub(crate) fn child(
        parent: &Arc<Self>,
        kind: NodeKind,
        deadline: Option<Instant>,
        pair: Option<(u64, Arc<dyn Any + Send + Sync>)>,
    ) -> Arc<Self> {
        let can_fire = match kind {
            NodeKind::Cancel | NodeKind::Deadline => true,
            _ => parent.can_fire,
        };
        let node = Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            kind,
            deadline,
            pair,
            can_fire,
            done: AtomicBool::new(false),
            state: Mutex::new(State {
                reason: None,
                children: Vec::new(),
                waiters: Vec::new(),
            }),
            done_cv: Condvar::new(),
        });
        trace!(kind = kind.label(), "scope derived");

        // Nothing above a never-firing chain can cancel this node, so there
        // is no propagation to subscribe to.
        if parent.can_fire {
            let inherited = {
                let mut parent_state = parent.lock_state();
                match parent_state.reason {
                    Some(reason) => Some(reason),
                    None => {
                        // Amortized pruning: sweep dead entries only when a
                        // push is about to reallocate.
                        if parent_state.children.len() == parent_state.children.capacity() {
                            parent_state.children.retain(|w| w.strong_count() > 0);
                        }
                        parent_state.children.push(Arc::downgrade(&node));
                        None
                    }
                }
            };
            if let Some(reason) = inherited {
                // The child is not yet shared, so completing it here cannot
                // be observed as a pending-then-done transition.
                node.complete(reason);
            }
        }
        node
    }

    pub(crate) const fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) const fn parent(&self) -> Option<&Arc<Self>> {
        self.parent.as_ref()
    }

    pub(crate) const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn pair(&self) -> Option<&(u64, Arc<dyn Any + Send + Sync>)> {
        self.pair.as_ref()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("node lock poisoned")
    }

    /// Lock-free done poll.
    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Terminal reason, `None` while pending.
    pub(crate) fn reason(&self) -> Option<DoneReason> {
        if !self.is_done() {
            return None;
        }
        self.lock_state().reason
    }

    /// Marks this node done with `reason` and propagates to the subtree.
    ///
    /// Idempotent: the first call wins and returns true; later calls (and
    /// propagation into an already-done child, e.g. one whose own deadline
    /// fired first) are no-ops that leave the recorded reason untouched.
    pub(crate) fn complete(self: &Arc<Self>, reason: DoneReason) -> bool {
        let (children, waiters) = {
            let mut state = self.lock_state();
            if state.reason.is_some() {
                trace!(%reason, "trigger ignored, scope already done");
                return false;
            }
            state.reason = Some(reason);
            // Ordering: reason first, flag second, both inside the lock, so
            // a lock-free `is_done() == true` always finds the reason set.
            self.done.store(true, Ordering::Release);
            self.done_cv.notify_all();
            (
                mem::take(&mut state.children),
                mem::take(&mut state.waiters),
            )
        };
        trace!(
            %reason,
            children = children.len(),
            waiters = waiters.len(),
            "scope done, propagating"
        );
        for waker in waiters.into_iter().flatten() {
            waker.wake();
        }
        for child in &children {
            if let Some(child) = child.upgrade() {
                child.complete(reason);
            }
        }
        self.detach();
        true
    }

    /// Drops this node from its parent's child registry. Purely advisory
    /// bookkeeping; a stale weak entry is skipped during propagation anyway.
    fn detach(self: &Arc<Self>) {
        let Some(parent) = self.parent.as_ref() else {
            return;
        };
        if !parent.can_fire {
            return;
        }
        let self_ptr = Arc::as_ptr(self);
        parent
            .lock_state()
            .children
            .retain(|w| w.as_ptr() != self_ptr);
    }

    /// Registers (or re-registers) an observer waker.
    ///
    /// Returns the terminal reason instead if the node is already done, in
    /// which case no slot is occupied. `slot` is the observer's slot index
    /// from a previous registration, updated in place.
    pub(crate) fn register_waiter(
        &self,
        slot: &mut Option<usize>,
        waker: &Waker,
    ) -> Option<DoneReason> {
        let mut state = self.lock_state();
        if let Some(reason) = state.reason {
            *slot = None;
            return Some(reason);
        }
        match *slot {
            Some(index) => {
                state.waiters[index] = Some(waker.clone());
            }
            None => {
                let index = match state.waiters.iter().position(Option::is_none) {
                    Some(free) => {
                        state.waiters[free] = Some(waker.clone());
                        free
                    }
                    None => {
                        state.waiters.push(Some(waker.clone()));
                        state.waiters.len() - 1
                    }
                };
                *slot = Some(index);
            }
        }
        None
    }

    /// Releases an observer slot after its `Done` handle is dropped pending.
    pub(crate) fn remove_waiter(&self, slot: usize) {
        let mut state = self.lock_state();
        if slot < state.waiters.len() {
            state.waiters[slot] = None;
        }
    }

    /// Blocks the calling thread until this node is done.
    pub(crate) fn wait(&self) -> DoneReason {
        let mut state = self.lock_state();
        loop {
            if let Some(reason) = state.reason {
                return reason;
            }
            state = self.done_cv.wait(state).expect("node lock poisoned");
        }
    }

    /// Blocks until done or until `deadline`, whichever comes first.
    pub(crate) fn wait_deadline(&self, deadline: Instant) -> Option<DoneReason> {
        let mut state = self.lock_state();
        loop {
            if let Some(reason) = state.reason {
                return Some(reason);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, timed_out) = self
                .done_cv
                .wait_timeout(state, deadline - now)
                .expect("node lock poisoned");
            state = next;
            if timed_out.timed_out() && state.reason.is_none() {
                return None;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.lock_state()
            .waiters
            .iter()
            .filter(|w| w.is_some())
            .count()
    }

    #[cfg(test)]
    pub(crate) fn child_count(&self) -> usize {
        self.lock_state().children.len()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("done", &self.is_done())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
