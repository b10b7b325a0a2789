//! Deadline driver.
//!
//! A single shared thread owns a min-heap of armed deadlines and sleeps on a
//! condvar until the earliest one is due, then fires the owning node with
//! [`DoneReason::DeadlineExceeded`]. Arming an earlier deadline wakes the
//! thread so it can re-sleep against the new front of the heap.
//!
//! Entries hold only a `Weak` reference to their node: a node that completes
//! by another path, or is dropped entirely, leaves an inert entry that is
//! skipped when it reaches the front. Firing an already-done node is a no-op
//! by the one-shot contract, so disarming needs no heap surgery.
//!
//! The thread is spawned lazily on the first armed deadline and parks
//! indefinitely when the heap drains.

use crate::node::Node;
use crate::reason::DoneReason;
use crate::tracing_compat::trace;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Instant;

struct Entry {
    at: Instant,
    node: Weak<Node>,
}

// BinaryHeap is a max-heap; order entries so the earliest deadline wins.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.at.cmp(&self.at)
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl Eq for Entry {}

struct Driver {
    heap: Mutex<BinaryHeap<Entry>>,
    wake: Condvar,
}

impl Driver {
    fn lock_heap(&self) -> MutexGuard<'_, BinaryHeap<Entry>> {
        self.heap.lock().expect("timer heap lock poisoned")
    }

    fn run(&self) {
        let mut heap = self.lock_heap();
        loop {
            let now = Instant::now();
            let mut due = Vec::new();
            while heap.peek().is_some_and(|entry| entry.at <= now) {
                if let Some(entry) = heap.pop() {
                    due.push(entry);
                }
            }
            if !due.is_empty() {
                // Fire outside the heap lock: completion takes node locks
                // and fans out to subtrees.
                drop(heap);
                for entry in due {
                    if let Some(node) = entry.node.upgrade() {
                        trace!("deadline elapsed, triggering scope");
                        node.complete(DoneReason::DeadlineExceeded);
                    }
                }
                heap = self.lock_heap();
                continue;
            }
            heap = match heap.peek().map(|entry| entry.at) {
                Some(at) => {
                    let timeout = at.saturating_duration_since(now);
                    self.wake
                        .wait_timeout(heap, timeout)
                        .expect("timer heap lock poisoned")
                        .0
                }
                None => self.wake.wait(heap).expect("timer heap lock poisoned"),
            };
        }
    }
}

fn driver() -> &'static Driver {
    static DRIVER: OnceLock<&'static Driver> = OnceLock::new();
    DRIVER.get_or_init(|| {
        let driver: &'static Driver = Box::leak(Box::new(Driver {
            heap: Mutex::new(BinaryHeap::new()),
            wake: Condvar::new(),
        }));
        std::thread::Builder::new()
            .name("reqscope-timer".into())
            .spawn(move || driver.run())
            .expect("failed to spawn timer thread");
        driver
    })
}

/// Arms a deadline for `node`. The node is fired with `DeadlineExceeded` no
/// earlier than `at`, unless it completes first by another path.
pub(crate) fn arm(at: Instant, node: &Arc<Node>) {
    let driver = driver();
    let mut heap = driver.lock_heap();
    let is_new_front = heap.peek().is_none_or(|front| at < front.at);
    heap.push(Entry {
        at,
        node: Arc::downgrade(node),
    });
    drop(heap);
    trace!("deadline armed");
    if is_new_front {
        driver.wake.notify_one();
    }
}
