//! Batchvault common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the batchvault crates:
//! - Feature and batch identity types
//! - Tracking consent state and change notification
//! - Common error types

pub mod consent;
pub mod error;
pub mod id;

pub use consent::{ConsentObserver, ConsentProvider, ConsentState, Subscription};
pub use error::{Error, ErrorCategory, Result};
pub use id::{BatchId, FeatureName};
