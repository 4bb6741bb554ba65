//! Container configuration.
//!
//! An [`ObservableConfig`] is fixed when a container is constructed. It is
//! deserializable so a host application can keep it next to the rest of its
//! settings:
//!
//! ```rust,ignore
//! let config: ObservableConfig = serde_json::from_str(r#"{"failure_policy":"isolate"}"#)?;
//! let settings = Settings::with_config(config);
//! ```

use serde::{Deserialize, Serialize};

/// What happens when an observer panics during fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The panic unwinds through the write. Observers after the failing one,
    /// and the wait-signal release, are skipped for that write.
    #[default]
    Propagate,

    /// Each observer runs under `catch_unwind`. A panic is logged and the
    /// remaining observers still run.
    Isolate,
}

/// Per-container settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservableConfig {
    pub failure_policy: FailurePolicy,
}

impl ObservableConfig {
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}
