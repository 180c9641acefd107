//! Concurrent execution engine.
//!
//! [`runtime::Runtime`] drives the worker pool and tuner over a
//! [`crate::state::SharedState`]; [`permits::Permits`] bounds how many workers
//! are active at once.

/// Interruptible counting semaphore.
pub mod permits;

/// Worker pool and tuner.
pub mod runtime;

pub use permits::{Permit, Permits};
pub use runtime::{tune_once, RunSummary, Runtime};
