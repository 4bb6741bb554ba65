//! Observable Containers
//!
//! An [`Observable`] is the per-instance state behind a model: the value of
//! each field that has been written, the three subscriber registries, and the
//! container configuration. A model type embeds one and exposes it through
//! the [`Model`] trait, which also provides the subscription API.
//!
//! # Fan-out
//!
//! Every write runs three passes over the written field's observers:
//!
//! 1. plain callbacks, in registration order,
//! 2. weak bound methods whose target is alive, in registration order,
//! 3. the field's wait signal, if any task has ever watched it.
//!
//! Weak entries found dead in pass 2 are pruned from every field once the
//! pass is over.
//!
//! # Thread Safety
//!
//! Writes to one container are serialized by a re-entrant lock held across
//! store and fan-out, so observers on other threads never see a half-finished
//! write and an observer may itself write. The registries are only locked
//! while a list is copied or edited.
//!
//! The write lock stays held while observers run. Observers that write into
//! another container from inside fan-out take that container's lock too, so
//! two threads whose observers write into each other's containers can
//! deadlock. Keeping cross-container writes acyclic is up to the caller.

use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::ReentrantMutex;

use super::field::{Field, StorageKey};
use super::registry::Registry;
use super::subscriber::{BoundMethod, SubscriptionId, WeakEntry, WeakSubscription};
use crate::config::{FailurePolicy, ObservableConfig};

/// A type whose fields are reactive.
///
/// Implementors only provide [`Model::observable`]; the rest of the API is
/// provided on top of it. Every operation taking a field accepts either a
/// [`Field`] token or a plain string name.
pub trait Model: Sized + 'static {
    /// The container backing this instance.
    fn observable(&self) -> &Observable<Self>;

    /// Names of the fields this type declares.
    ///
    /// When non-empty, subscribing under any other name logs a warning.
    fn field_names() -> &'static [&'static str] {
        &[]
    }

    fn get<T>(&self, field: &Field<Self, T>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        field.get(self)
    }

    fn set<T>(&self, field: &Field<Self, T>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        field.set(self, value)
    }

    fn try_set<T>(&self, field: &Field<Self, T>, value: T) -> crate::Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        field.try_set(self, value)
    }

    /// Register a plain callback, kept for the life of the container.
    fn subscribe<F>(&self, field: impl AsRef<str>, callback: F)
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        self.observable().subscribe(field, callback)
    }

    /// Register `method` on `target`, held through a weak reference.
    ///
    /// The subscription is dropped once `target` is.
    fn subscribe_weak<T, F>(
        &self,
        field: impl AsRef<str>,
        target: &Arc<T>,
        method: F,
    ) -> WeakSubscription<Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &Self) + Send + Sync + 'static,
    {
        self.observable().subscribe_weak(field, target, method)
    }

    /// Remove a weak subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId) {
        self.observable().unsubscribe(id)
    }

    /// Resolve on the next write to `field`.
    fn watch(&self, field: impl AsRef<str>) -> impl Future<Output = ()> + Send + 'static {
        self.observable().watch(field)
    }
}

/// How a single write treats panicking observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FanOut {
    /// Let the panic unwind through the write.
    Propagate,
    /// Catch, log, continue.
    Isolate,
    /// Catch, continue, hand the messages back to the caller.
    Collect,
}

impl From<FailurePolicy> for FanOut {
    fn from(policy: FailurePolicy) -> Self {
        match policy {
            FailurePolicy::Propagate => FanOut::Propagate,
            FailurePolicy::Isolate => FanOut::Isolate,
        }
    }
}

/// Outcome of reading a stored value.
pub(crate) enum Stored<T> {
    Unset,
    Value(T),
    Mismatch,
}

/// Per-instance reactive state.
pub struct Observable<M> {
    values: DashMap<StorageKey, Box<dyn Any + Send + Sync>>,
    registry: Arc<Registry<M>>,
    write_lock: ReentrantMutex<()>,
    config: ObservableConfig,
}

impl<M> Observable<M> {
    /// Create an empty container with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ObservableConfig::default())
    }

    pub fn with_config(config: ObservableConfig) -> Self {
        Self {
            values: DashMap::new(),
            registry: Arc::new(Registry::new()),
            write_lock: ReentrantMutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &ObservableConfig {
        &self.config
    }

    /// Remove a weak subscription from every field. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.registry.remove_weak(id) {
            tracing::debug!(?id, "weak subscription removed");
        }
    }

    /// Remove every weak subscription whose target is gone.
    ///
    /// Returns the number removed. Writes do this on their own when they run
    /// into a dead entry; this is for callers that want it done now.
    pub fn prune(&self) -> usize {
        let removed = self.registry.remove_dead();
        if removed > 0 {
            tracing::debug!(removed, "pruned dead weak subscriptions");
        }
        removed
    }

    /// Resolve on the next write to `field` after this call.
    ///
    /// Each call covers one write; loop to follow every change. Dropping the
    /// future cancels only this waiter.
    pub fn watch(&self, field: impl AsRef<str>) -> impl Future<Output = ()> + Send + 'static {
        self.registry.signal_or_insert(field.as_ref()).wait()
    }

    /// Number of plain callbacks registered under `field`.
    pub fn subscription_count(&self, field: impl AsRef<str>) -> usize {
        self.registry.callback_count(field.as_ref())
    }

    /// Number of weak subscriptions registered under `field`, dead or alive.
    pub fn weak_subscription_count(&self, field: impl AsRef<str>) -> usize {
        self.registry.weak_count(field.as_ref())
    }

    /// Whether any task has ever watched `field`.
    pub fn has_wait_signal(&self, field: impl AsRef<str>) -> bool {
        self.registry.has_signal(field.as_ref())
    }

    pub(crate) fn load<T: Clone + 'static>(&self, key: StorageKey) -> Stored<T> {
        match self.values.get(&key) {
            None => Stored::Unset,
            Some(stored) => match stored.downcast_ref::<T>() {
                Some(value) => Stored::Value(value.clone()),
                None => Stored::Mismatch,
            },
        }
    }

    pub(crate) fn contains(&self, key: StorageKey) -> bool {
        self.values.contains_key(&key)
    }
}

impl<M: Model> Observable<M> {
    pub fn subscribe<F>(&self, field: impl AsRef<str>, callback: F)
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        let field = field.as_ref();
        warn_if_undeclared::<M>(field);

        self.registry.add_callback(field, Arc::new(callback));
        tracing::debug!(field, "callback subscribed");
    }

    pub fn subscribe_weak<T, F>(
        &self,
        field: impl AsRef<str>,
        target: &Arc<T>,
        method: F,
    ) -> WeakSubscription<M>
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &M) + Send + Sync + 'static,
    {
        let field = field.as_ref();
        warn_if_undeclared::<M>(field);

        let id = SubscriptionId::new();
        self.registry.add_weak(
            field,
            WeakEntry {
                id,
                observer: Arc::new(BoundMethod::new(target, method)),
            },
        );
        tracing::debug!(field, ?id, "weak subscription added");

        WeakSubscription::new(id, &self.registry)
    }

    /// Store `value` for `field` and notify its observers.
    ///
    /// Returns the panic messages caught under `FanOut::Collect` or
    /// `FanOut::Isolate`.
    pub(crate) fn write<T>(&self, model: &M, field: &Field<M, T>, value: T, fan_out: FanOut) -> Vec<String>
    where
        T: Send + Sync + 'static,
    {
        let _guard = self.write_lock.lock();
        self.values.insert(field.storage_key(), Box::new(value));
        self.notify(model, field.name(), fan_out)
    }

    fn notify(&self, model: &M, field: &'static str, fan_out: FanOut) -> Vec<String> {
        let mut failures = Vec::new();

        // Only a signal that exists before pass 1 is released by this write,
        // so a watch armed by an observer waits for the next one.
        let pending = self.registry.signal(field).map(|signal| {
            let write = signal.begin();
            (signal, write)
        });

        let callbacks = self.registry.callbacks(field);
        let weak = self.registry.weak_entries(field);
        tracing::trace!(field, callbacks = callbacks.len(), weak = weak.len(), "fan-out");

        for callback in callbacks {
            run_observer(field, fan_out, &mut failures, || callback(model));
        }

        let mut found_dead = false;
        for entry in weak {
            let mut alive = true;
            run_observer(field, fan_out, &mut failures, || {
                alive = entry.observer.notify(model);
            });
            found_dead |= !alive;
        }
        if found_dead {
            self.prune();
        }

        if let Some((signal, write)) = pending {
            signal.release(write);
        }

        failures
    }
}

fn warn_if_undeclared<M: Model>(field: &str) {
    let declared = M::field_names();
    if !declared.is_empty() && !declared.contains(&field) {
        tracing::warn!(
            field,
            model = std::any::type_name::<M>(),
            "subscribing to a field the model does not declare"
        );
    }
}

fn run_observer(field: &'static str, fan_out: FanOut, failures: &mut Vec<String>, observer: impl FnOnce()) {
    if fan_out == FanOut::Propagate {
        observer();
        return;
    }

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(observer)) {
        let message = panic_message(payload.as_ref());
        if fan_out == FanOut::Isolate {
            tracing::error!(field, %message, "observer panicked, continuing fan-out");
        }
        failures.push(message);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<M> Default for Observable<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Debug for Observable<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("stored_values", &self.values.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
    use std::time::Duration;

    struct Values {
        observable: Observable<Values>,
    }

    impl Values {
        const VALUE1: Field<Values, i32> = Field::new("value1", || 10);
        const VALUE2: Field<Values, i32> = Field::new("value2", || 12);

        fn new() -> Self {
            Self::with_config(ObservableConfig::default())
        }

        fn with_config(config: ObservableConfig) -> Self {
            Self {
                observable: Observable::with_config(config),
            }
        }
    }

    impl Model for Values {
        fn observable(&self) -> &Observable<Self> {
            &self.observable
        }

        fn field_names() -> &'static [&'static str] {
            &["value1", "value2"]
        }
    }

    struct Listener {
        hits: AtomicI32,
    }

    impl Listener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                hits: AtomicI32::new(0),
            })
        }

        fn on_change(&self, _: &Values) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn kinds_fire_in_order() {
        let values = Values::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = Listener::new();

        let log_weak = log.clone();
        let _sub = values.subscribe_weak(Values::VALUE1, &listener, move |_, _| {
            log_weak.lock().push("weak");
        });
        let log_plain = log.clone();
        values.subscribe(Values::VALUE1, move |_| log_plain.lock().push("plain"));

        values.set(&Values::VALUE1, 1);

        assert_eq!(*log.lock(), vec!["plain", "weak"]);
    }

    #[test]
    fn callbacks_only_fire_for_their_field() {
        let values = Values::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        values.subscribe("value1", move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        values.set(&Values::VALUE2, 30);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        values.set(&Values::VALUE1, 20);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn weak_subscription_is_pruned_after_target_drops() {
        let values = Values::new();
        let listener = Listener::new();

        let _ = values.subscribe_weak(Values::VALUE1, &listener, Listener::on_change);
        let _ = values.subscribe_weak(Values::VALUE2, &listener, Listener::on_change);
        assert_eq!(values.observable().weak_subscription_count(Values::VALUE1), 1);

        drop(listener);
        values.set(&Values::VALUE1, 1);

        // The dead entry is removed from every field, not just the one written.
        assert_eq!(values.observable().weak_subscription_count(Values::VALUE1), 0);
        assert_eq!(values.observable().weak_subscription_count(Values::VALUE2), 0);
    }

    #[test]
    fn prune_removes_dead_entries_without_a_write() {
        let values = Values::new();
        let listener = Listener::new();
        let survivor = Listener::new();

        let _ = values.subscribe_weak(Values::VALUE1, &listener, Listener::on_change);
        let _ = values.subscribe_weak(Values::VALUE1, &survivor, Listener::on_change);
        drop(listener);

        assert_eq!(values.observable().prune(), 1);
        assert_eq!(values.observable().weak_subscription_count(Values::VALUE1), 1);
    }

    #[test]
    fn guard_unsubscribes_on_drop() {
        let values = Values::new();
        let listener = Listener::new();

        let guard = values
            .subscribe_weak(Values::VALUE1, &listener, Listener::on_change)
            .into_guard();
        assert_eq!(values.observable().weak_subscription_count(Values::VALUE1), 1);

        drop(guard);
        assert_eq!(values.observable().weak_subscription_count(Values::VALUE1), 0);

        values.set(&Values::VALUE1, 5);
        assert_eq!(listener.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn guard_outliving_container_is_harmless() {
        let listener = Listener::new();
        let guard = {
            let values = Values::new();
            values
                .subscribe_weak(Values::VALUE1, &listener, Listener::on_change)
                .into_guard()
        };
        drop(guard);
    }

    #[test]
    fn observers_may_subscribe_and_write_reentrantly() {
        let values = Arc::new(Values::new());
        let seen = Arc::new(AtomicI32::new(0));

        let seen_clone = seen.clone();
        values.subscribe(Values::VALUE1, move |v: &Values| {
            // Chained write to another field from inside fan-out.
            v.set(&Values::VALUE2, Values::VALUE1.get(v) * 2);
            let seen_inner = seen_clone.clone();
            v.subscribe(Values::VALUE2, move |_| {
                seen_inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        values.set(&Values::VALUE1, 4);
        assert_eq!(values.get(&Values::VALUE2), 8);
        assert_eq!(values.observable().subscription_count(Values::VALUE2), 1);

        values.set(&Values::VALUE2, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn propagate_policy_stops_fan_out_at_panic() {
        let values = Values::new();
        let after = Arc::new(AtomicI32::new(0));
        let after_clone = after.clone();
        let failed = Arc::new(AtomicBool::new(false));
        let failed_clone = failed.clone();

        values.subscribe(Values::VALUE1, move |_| {
            if !failed_clone.swap(true, Ordering::SeqCst) {
                panic!("observer failed");
            }
        });
        values.subscribe(Values::VALUE1, move |_| {
            after_clone.fetch_add(1, Ordering::SeqCst);
        });
        let pending = values.watch(Values::VALUE1);
        tokio::pin!(pending);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| values.set(&Values::VALUE1, 1)));

        assert!(outcome.is_err());
        assert_eq!(after.load(Ordering::SeqCst), 0);
        // The value was stored before fan-out began.
        assert_eq!(values.get(&Values::VALUE1), 1);
        // The release step was skipped along with the later observers.
        let outcome = tokio::time::timeout(Duration::from_millis(20), &mut pending).await;
        assert!(outcome.is_err());

        values.set(&Values::VALUE1, 2);
        assert_eq!(after.load(Ordering::SeqCst), 1);
        tokio::time::timeout(Duration::from_secs(1), &mut pending)
            .await
            .expect("watcher was not released by the following write");
    }

    #[test]
    fn isolate_policy_runs_remaining_observers() {
        let values = Values::with_config(
            ObservableConfig::default().with_failure_policy(FailurePolicy::Isolate),
        );
        let after = Arc::new(AtomicI32::new(0));
        let after_clone = after.clone();

        values.subscribe(Values::VALUE1, |_| panic!("observer failed"));
        values.subscribe(Values::VALUE1, move |_| {
            after_clone.fetch_add(1, Ordering::SeqCst);
        });

        values.set(&Values::VALUE1, 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn isolate_policy_survives_a_panicking_weak_observer() {
        let values = Values::with_config(
            ObservableConfig::default().with_failure_policy(FailurePolicy::Isolate),
        );
        let faulty = Listener::new();
        let live = Listener::new();

        values.subscribe_weak(Values::VALUE1, &faulty, |_: &Listener, _: &Values| {
            panic!("weak observer failed")
        });
        values.subscribe_weak(Values::VALUE1, &live, Listener::on_change);
        let pending = values.watch(Values::VALUE1);

        values.set(&Values::VALUE1, 1);

        assert_eq!(live.hits.load(Ordering::SeqCst), 1);
        assert_eq!(values.observable().weak_subscription_count(Values::VALUE1), 2);
        tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("watcher was not released after a weak observer panicked");
    }

    #[tokio::test]
    async fn watch_armed_during_fan_out_waits_for_the_next_write() {
        let values = Arc::new(Values::new());
        let armed: Arc<Mutex<Vec<Pin<Box<dyn Future<Output = ()> + Send>>>>> =
            Arc::new(Mutex::new(Vec::new()));

        let slot = armed.clone();
        values.subscribe(Values::VALUE1, move |v: &Values| {
            let mut slot = slot.lock();
            if slot.is_empty() {
                slot.push(Box::pin(v.watch(Values::VALUE1)));
            }
        });

        values.set(&Values::VALUE1, 1);
        let mut pending = armed.lock().pop().expect("callback did not arm a watch");
        let outcome = tokio::time::timeout(Duration::from_millis(50), &mut pending).await;
        assert!(outcome.is_err());

        values.set(&Values::VALUE1, 2);
        tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("watch armed during fan-out missed the next write");
    }

    #[tokio::test]
    async fn watch_armed_during_fan_out_skips_the_current_release() {
        let values = Arc::new(Values::new());
        let earlier = values.watch(Values::VALUE1);
        let armed: Arc<Mutex<Vec<Pin<Box<dyn Future<Output = ()> + Send>>>>> =
            Arc::new(Mutex::new(Vec::new()));

        let slot = armed.clone();
        values.subscribe(Values::VALUE1, move |v: &Values| {
            let mut slot = slot.lock();
            if slot.is_empty() {
                slot.push(Box::pin(v.watch(Values::VALUE1)));
            }
        });

        values.set(&Values::VALUE1, 1);
        tokio::time::timeout(Duration::from_secs(1), earlier)
            .await
            .expect("watch armed before the write was not released");

        let mut pending = armed.lock().pop().expect("callback did not arm a watch");
        let outcome = tokio::time::timeout(Duration::from_millis(50), &mut pending).await;
        assert!(outcome.is_err());

        values.set(&Values::VALUE1, 2);
        tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("watch armed during fan-out missed the next write");
    }

    #[test]
    fn try_set_collects_every_failure() {
        let values = Values::new();
        let after = Arc::new(AtomicI32::new(0));
        let after_clone = after.clone();

        values.subscribe(Values::VALUE1, |_| panic!("first"));
        values.subscribe(Values::VALUE1, move |_| {
            after_clone.fetch_add(1, Ordering::SeqCst);
        });
        values.subscribe(Values::VALUE1, |_| panic!("{}", String::from("second")));

        let err = values.try_set(&Values::VALUE1, 7).unwrap_err();

        assert_eq!(
            err,
            crate::ReactrError::ObserverPanicked {
                field: "value1",
                failures: vec!["first".to_string(), "second".to_string()],
            }
        );
        assert_eq!(after.load(Ordering::SeqCst), 1);
        assert!(values.try_set(&Values::VALUE2, 7).is_ok());
    }

    #[test]
    fn unknown_field_names_are_still_registered() {
        let values = Values::new();
        values.subscribe("nonexistent", |_| {});
        assert_eq!(values.observable().subscription_count("nonexistent"), 1);
    }

    #[test]
    fn watch_creates_signal_lazily() {
        let values = Values::new();
        assert!(!values.observable().has_wait_signal(Values::VALUE1));

        let pending = values.watch(Values::VALUE1);
        assert!(values.observable().has_wait_signal(Values::VALUE1));
        assert!(!values.observable().has_wait_signal(Values::VALUE2));

        // Cancelling a watch leaves the registries alone.
        drop(pending);
        assert!(values.observable().has_wait_signal(Values::VALUE1));
    }
}
