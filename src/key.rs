//! Typed keys for the value chain.
//!
//! Values attached to a scope are looked up by an explicit [`Key`] object,
//! never by string name. Each call to [`Key::new`] mints a process-unique
//! identity, so two independently created keys never collide even when they
//! carry the same value type. Components share access to a value by sharing
//! the key, typically through a `OnceLock`:
//!
//! ```
//! use reqscope::{Context, Key};
//! use std::sync::OnceLock;
//!
//! static TRACE_ID: OnceLock<Key<u64>> = OnceLock::new();
//!
//! fn trace_id_key() -> Key<u64> {
//!     *TRACE_ID.get_or_init(Key::new)
//! }
//!
//! let ctx = Context::background().with_value(trace_id_key(), 42u64);
//! assert_eq!(ctx.value(trace_id_key()).as_deref(), Some(&42));
//! ```

use core::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// A typed, identity-compared key for scope values.
///
/// `Key<T>` is `Copy` and cheap to pass around. Equality is by identity:
/// only the exact key object (or a copy of it) used with
/// [`Context::with_value`](crate::Context::with_value) will find the value
/// again.
pub struct Key<T> {
    id: u64,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Key<T> {
    /// Mints a fresh key with a process-unique identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    pub(crate) const fn id(self) -> u64 {
        self.id
    }
}

impl<T> Default for Key<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impls: derive would bound on T, but the key never holds a T.
impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.id)
    }
}
