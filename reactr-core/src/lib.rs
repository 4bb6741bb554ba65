//! Reactr Core
//!
//! This crate provides reactive property containers: objects whose named,
//! typed fields notify observers whenever they are assigned. It supports:
//!
//! - Synchronous plain callbacks
//! - Weak bound-method subscriptions that end with their target
//! - Asynchronous "wait for the next write" via [`Model::watch`]
//!
//! Every write notifies, whether or not the value changed. Within one write,
//! plain callbacks run first, then weak subscriptions, then waiters are
//! released.
//!
//! # Architecture
//!
//! - `reactive`: field descriptors, containers, registries and wait signals
//! - `config`: per-container settings
//! - `error`: error types for the checked operations
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use reactr_core::{reactive_model, Model};
//!
//! reactive_model! {
//!     pub struct Settings {
//!         volume as VOLUME: u8 = 50,
//!         muted as MUTED: bool = false,
//!     }
//! }
//!
//! struct Mixer;
//!
//! impl Mixer {
//!     fn on_volume(&self, settings: &Settings) {
//!         println!("volume is now {}", settings.volume());
//!     }
//! }
//!
//! let settings = Settings::new();
//! let mixer = Arc::new(Mixer);
//!
//! settings.subscribe(Settings::MUTED, |s| println!("muted: {}", s.muted()));
//! settings.subscribe_weak(Settings::VOLUME, &mixer, Mixer::on_volume);
//!
//! settings.set(&Settings::VOLUME, 70);
//! // Prints: "volume is now 70"
//!
//! settings.watch(Settings::VOLUME).await;
//! ```

mod macros;

pub mod config;
pub mod error;
pub mod reactive;

pub use config::{FailurePolicy, ObservableConfig};
pub use error::{ReactrError, Result};
pub use reactive::{Field, Model, Observable, SubscriptionGuard, SubscriptionId, WeakSubscription};
