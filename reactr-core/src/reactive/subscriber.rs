//! Observer types for reactive containers.
//!
//! Two kinds of observer can be registered against a field:
//!
//! - A plain callback, held strongly for the life of the container.
//! - A weak bound method: a `Weak<T>` to some target object plus a method to
//!   call on it. The subscription lives exactly as long as the target.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::registry::Registry;

/// Unique identifier for a weak subscription.
///
/// Ids are never reused, so unsubscribing with a stale id cannot remove an
/// unrelated subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A plain observer, invoked with the container on every write.
pub(crate) type Callback<M> = Arc<dyn Fn(&M) + Send + Sync>;

/// A type-erased weak bound method.
pub(crate) trait WeakObserver<M>: Send + Sync {
    /// Invoke the method if the target is still alive.
    ///
    /// Returns `false` when the target has been dropped.
    fn notify(&self, model: &M) -> bool;

    fn is_alive(&self) -> bool;
}

/// A method bound to a target through a weak reference.
pub(crate) struct BoundMethod<T, F> {
    target: Weak<T>,
    method: F,
}

impl<T, F> BoundMethod<T, F> {
    pub(crate) fn new(target: &Arc<T>, method: F) -> Self {
        Self {
            target: Arc::downgrade(target),
            method,
        }
    }
}

impl<M, T, F> WeakObserver<M> for BoundMethod<T, F>
where
    T: Send + Sync,
    F: Fn(&T, &M) + Send + Sync,
{
    fn notify(&self, model: &M) -> bool {
        match self.target.upgrade() {
            Some(target) => {
                (self.method)(&*target, model);
                true
            }
            None => false,
        }
    }

    fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }
}

/// One entry in a field's weak-subscription list.
pub(crate) struct WeakEntry<M> {
    pub(crate) id: SubscriptionId,
    pub(crate) observer: Arc<dyn WeakObserver<M>>,
}

impl<M> Clone for WeakEntry<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            observer: Arc::clone(&self.observer),
        }
    }
}

/// Handle to a weak subscription, returned by `subscribe_weak`.
///
/// Dropping this handle does nothing: the subscription's lifetime is tied to
/// its target. Call [`WeakSubscription::into_guard`] to tie it to a scope
/// instead.
pub struct WeakSubscription<M> {
    id: SubscriptionId,
    registry: Weak<Registry<M>>,
}

impl<M> WeakSubscription<M> {
    pub(crate) fn new(id: SubscriptionId, registry: &Arc<Registry<M>>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Convert into a guard that unsubscribes when dropped.
    ///
    /// Store the guard inside the target to remove the entry at the moment
    /// the target is destroyed rather than at the next write.
    pub fn into_guard(self) -> SubscriptionGuard<M> {
        SubscriptionGuard {
            id: self.id,
            registry: self.registry,
        }
    }
}

impl<M> std::fmt::Debug for WeakSubscription<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakSubscription").field("id", &self.id).finish()
    }
}

/// Unsubscribes its weak subscription when dropped.
///
/// Outliving the container is fine: the drop is then a no-op.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard<M> {
    id: SubscriptionId,
    registry: Weak<Registry<M>>,
}

impl<M> SubscriptionGuard<M> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl<M> Drop for SubscriptionGuard<M> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_weak(self.id);
        }
    }
}

impl<M> std::fmt::Debug for SubscriptionGuard<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard").field("id", &self.id).finish()
    }
}
