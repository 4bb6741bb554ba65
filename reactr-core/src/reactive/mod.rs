//! Reactive Fields and Containers
//!
//! This module implements reactive property containers: model types whose
//! named fields notify observers on every assignment.
//!
//! # Concepts
//!
//! ## Fields
//!
//! A [`Field`] is a descriptor for one named, typed attribute of a model. It
//! is shared metadata (name, storage key, default) and never holds instance
//! data. Reading it returns the instance's value; writing it stores the value
//! and fans out to that instance's observers.
//!
//! ## Containers
//!
//! An [`Observable`] is the per-instance state: stored values plus three
//! registries keyed by field name. A model type embeds one and implements
//! [`Model`] to expose it.
//!
//! ## Observers
//!
//! - Plain callbacks are held strongly and never removed.
//! - Weak subscriptions call a method on a target held through `Weak<T>`, and
//!   disappear once the target is dropped. A [`SubscriptionGuard`] removes one
//!   eagerly when it goes out of scope.
//! - Watchers await [`Model::watch`] and are released by the next write.
//!
//! # Implementation Notes
//!
//! Rust has no finalizers on `Weak`, so dead weak entries are pruned by the
//! first write that encounters them, by [`Observable::prune`], or by a guard.
//! A dead entry is never invoked in the meantime.

mod field;
mod observable;
mod registry;
mod subscriber;
mod wait;

pub use field::Field;
pub use observable::{Model, Observable};
pub use subscriber::{SubscriptionGuard, SubscriptionId, WeakSubscription};
