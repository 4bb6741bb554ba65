//! Reactive Field Descriptors
//!
//! A [`Field`] describes one named, typed attribute of a model type. It is
//! metadata shared by every instance of that type: a name, a storage key and
//! a default. The values themselves live in each instance's [`Observable`].
//!
//! # How Fields Work
//!
//! 1. Reading returns the instance's last written value, or the default if
//!    nothing has been written. Reading never notifies.
//!
//! 2. Writing stores the value unconditionally and fans out to every observer
//!    of the field on that instance. There is no equality check: writing the
//!    value a field already holds still notifies.
//!
//! Fields are normally declared as associated constants so they double as
//! stable tokens for `subscribe` and `watch`:
//!
//! ```rust,ignore
//! impl Settings {
//!     pub const VOLUME: Field<Settings, u8> = Field::new("volume", || 50);
//! }
//!
//! settings.subscribe(Settings::VOLUME, |s| println!("{}", Settings::VOLUME.get(s)));
//! Settings::VOLUME.set(&settings, 70);
//! ```
//!
//! [`Observable`]: super::Observable

use std::any;
use std::fmt::Debug;
use std::marker::PhantomData;

use super::observable::{FanOut, Model, Stored};
use crate::error::{ReactrError, Result};

/// Key under which an instance stashes a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StorageKey(&'static str);

/// Descriptor for a reactive field of type `T` on model `M`.
pub struct Field<M, T> {
    name: &'static str,
    key: StorageKey,
    default: fn() -> T,
    _model: PhantomData<fn(&M)>,
}

impl<M, T> Field<M, T> {
    /// Declare a field. `default` produces the value read before any write.
    pub const fn new(name: &'static str, default: fn() -> T) -> Self {
        Self {
            name,
            key: StorageKey(name),
            default,
            _model: PhantomData,
        }
    }

    /// The public name the field was declared under.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }

    pub(crate) fn storage_key(&self) -> StorageKey {
        self.key
    }
}

impl<M, T> Field<M, T>
where
    M: Model,
    T: Clone + Send + Sync + 'static,
{
    /// Read the field on `model`.
    ///
    /// Falls back to the default, with a warning, if the stored value has the
    /// wrong type.
    pub fn get(&self, model: &M) -> T {
        match self.try_get(model) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(field = self.name, %err, "falling back to default value");
                self.default_value()
            }
        }
    }

    /// Read the field on `model`, reporting a type mismatch as an error.
    pub fn try_get(&self, model: &M) -> Result<T> {
        match model.observable().load::<T>(self.key) {
            Stored::Unset => Ok(self.default_value()),
            Stored::Value(value) => Ok(value),
            Stored::Mismatch => Err(ReactrError::TypeMismatch {
                field: self.name,
                expected: any::type_name::<T>(),
            }),
        }
    }

    /// Whether a value has been written to this field on `model`.
    pub fn is_set(&self, model: &M) -> bool {
        model.observable().contains(self.key)
    }

    /// Write the field on `model` and notify its observers.
    ///
    /// Observer panics are handled according to the container's
    /// [`FailurePolicy`](crate::FailurePolicy).
    pub fn set(&self, model: &M, value: T) {
        let fan_out = FanOut::from(model.observable().config().failure_policy);
        model.observable().write(model, self, value, fan_out);
    }

    /// Write the field on `model`, isolating every observer.
    ///
    /// All observers run even if some panic; the panics are then reported
    /// together as [`ReactrError::ObserverPanicked`].
    pub fn try_set(&self, model: &M, value: T) -> Result<()> {
        let failures = model.observable().write(model, self, value, FanOut::Collect);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReactrError::ObserverPanicked {
                field: self.name,
                failures,
            })
        }
    }

    /// Write the result of `f` applied to the current value.
    pub fn update<F>(&self, model: &M, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.get(model));
        self.set(model, next);
    }
}

impl<M, T> Clone for Field<M, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M, T> Copy for Field<M, T> {}

impl<M, T> AsRef<str> for Field<M, T> {
    fn as_ref(&self) -> &str {
        self.name
    }
}

impl<M, T> Debug for Field<M, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("type", &any::type_name::<T>())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
