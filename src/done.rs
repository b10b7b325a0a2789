//! The done-signal observation handle.
//!
//! [`Done`] is the one blocking surface of the crate. It can be observed
//! three ways, all one-shot and all releasing every independent observer
//! exactly once:
//!
//! - awaited as a [`Future`] resolving to the terminal [`DoneReason`],
//! - blocked on with [`Done::wait`] from a plain thread,
//! - blocked on with a bound via [`Done::wait_timeout`].
//!
//! The reason is durably recorded before any observer is released, so a
//! released observer never reads an empty reason.

use crate::node::Node;
use crate::reason::DoneReason;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

/// An awaitable, blockable handle to a scope's done signal.
///
/// Obtained from [`Context::done`](crate::Context::done). Each call produces
/// an independent observer; any number may be outstanding at once.
#[derive(Debug)]
pub struct Done {
    node: Arc<Node>,
    /// Waker slot occupied in the node, if this observer polled Pending.
    slot: Option<usize>,
}

impl Done {
    pub(crate) fn new(node: Arc<Node>) -> Self {
        Self { node, slot: None }
    }

    /// Polls the signal without blocking or registering.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.node.is_done()
    }

    /// Blocks the calling thread until the scope is done.
    ///
    /// Never returns for a scope whose ancestor chain cannot fire (a bare
    /// root, for instance); callers who need a bound should use
    /// [`Done::wait_timeout`].
    #[must_use]
    pub fn wait(&self) -> DoneReason {
        self.node.wait()
    }

    /// Blocks until the scope is done or `timeout` elapses.
    ///
    /// Returns `None` on timeout; the scope may of course still become done
    /// later.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<DoneReason> {
        match std::time::Instant::now().checked_add(timeout) {
            Some(deadline) => self.node.wait_deadline(deadline),
            None => Some(self.node.wait()),
        }
    }
}

impl Future for Done {
    type Output = DoneReason;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match this.node.register_waiter(&mut this.slot, cx.waker()) {
            Some(reason) => Poll::Ready(reason),
            None => Poll::Pending,
        }
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.node.remove_waiter(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Wake, Waker};
    use std::thread;

    fn poll_once(done: &mut Done) -> Poll<DoneReason> {
        struct NoopWaker;
        impl Wake for NoopWaker {
            fn wake(self: Arc<Self>) {}
        }
        let waker = Waker::from(Arc::new(NoopWaker));
        let mut cx = TaskContext::from_waker(&waker);
        Pin::new(done).poll(&mut cx)
    }

    struct CountingWaker(AtomicUsize);
    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn wake_by_ref(self: &Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn cancelable() -> Arc<Node> {
        let root = Node::root(NodeKind::Background);
        Node::child(&root, NodeKind::Cancel, None, None)
    }

    #[test]
    fn ready_immediately_when_already_done() {
        let node = cancelable();
        node.complete(DoneReason::Canceled);
        let mut done = Done::new(node);
        assert_eq!(poll_once(&mut done), Poll::Ready(DoneReason::Canceled));
    }

    #[test]
    fn pending_then_woken_on_complete() {
        let node = cancelable();
        let mut done = Done::new(Arc::clone(&node));

        let counting = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counting));
        let mut cx = TaskContext::from_waker(&waker);
        assert!(Pin::new(&mut done).poll(&mut cx).is_pending());

        node.complete(DoneReason::Canceled);
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
        assert_eq!(poll_once(&mut done), Poll::Ready(DoneReason::Canceled));
    }

    #[test]
    fn repolling_reuses_the_slot() {
        let node = cancelable();
        let mut done = Done::new(Arc::clone(&node));
        assert!(poll_once(&mut done).is_pending());
        assert!(poll_once(&mut done).is_pending());
        assert_eq!(node.waiter_count(), 1);
    }

    #[test]
    fn dropping_pending_observer_frees_its_slot() {
        let node = cancelable();
        let mut done = Done::new(Arc::clone(&node));
        assert!(poll_once(&mut done).is_pending());
        assert_eq!(node.waiter_count(), 1);
        drop(done);
        assert_eq!(node.waiter_count(), 0);
    }

    #[test]
    fn wait_unblocks_on_complete() {
        let node = cancelable();
        let waiter = {
            let node = Arc::clone(&node);
            thread::spawn(move || Done::new(node).wait())
        };
        thread::sleep(Duration::from_millis(20));
        node.complete(DoneReason::Canceled);
        assert_eq!(waiter.join().expect("waiter panicked"), DoneReason::Canceled);
    }

    #[test]
    fn wait_timeout_expires_on_pending_scope() {
        let node = cancelable();
        let done = Done::new(node);
        assert_eq!(done.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn all_observers_released_once() {
        let node = cancelable();
        let mut waiters = Vec::new();
        for _ in 0..4 {
            let node = Arc::clone(&node);
            waiters.push(thread::spawn(move || Done::new(node).wait()));
        }
        thread::sleep(Duration::from_millis(20));
        node.complete(DoneReason::DeadlineExceeded);
        for waiter in waiters {
            assert_eq!(
                waiter.join().expect("waiter panicked"),
                DoneReason::DeadlineExceeded
            );
        }
    }
}
