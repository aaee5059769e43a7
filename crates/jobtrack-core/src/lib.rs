//! jobtrack core: the pod record model, label selectors, counter arithmetic
//! and the error surface shared by the webhook and its tests.
//!
//! This crate carries no transport or runtime dependencies. Everything here is
//! pure and synchronous so the retry engine can call it on every attempt.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `JobTrackError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod counter;
pub mod error;
pub mod record;
pub mod selector;

/// Shared result type.
pub use error::{ClientCode, JobTrackError, Result};

pub use counter::{CounterPolicy, Delta, DEFAULT_COUNTER_LABEL};
pub use record::{PodKey, PodRecord};
pub use selector::Selector;
