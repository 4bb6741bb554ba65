//! Error types for reactive containers.

use thiserror::Error;

/// Errors reported by the checked field operations.
///
/// The unchecked paths (`Field::get`, `Field::set`) never return these.
/// Stale weak subscriptions and unknown subscription ids are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactrError {
    /// One or more observers panicked during the fan-out of a write.
    ///
    /// The value was stored and every other observer still ran.
    #[error("{} observer(s) of field `{field}` panicked: {}", .failures.len(), .failures.join("; "))]
    ObserverPanicked {
        field: &'static str,
        failures: Vec<String>,
    },

    /// The stored value for a field is not of the type the descriptor expects.
    ///
    /// Only possible when two descriptors on the same model share a name.
    #[error("stored value for field `{field}` is not a `{expected}`")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ReactrError>;
