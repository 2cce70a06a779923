//! Metric names for tally.
//!
//! Recording goes through the `metrics` crate facade, so every call is a
//! no-op until the embedding application installs a recorder.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tally_metrics::{counter, histogram, vault};
//!
//! counter!(vault::UNLOCK_ATTEMPTS_TOTAL).increment(1);
//! histogram!(vault::KDF_DURATION_SECONDS).record(0.42);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
