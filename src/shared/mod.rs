//! Shared pipeline state
//!
//! This module provides the immutable state snapshot and the store that
//! hands it to consumers (a UI, the CLI reporter) without locking on read.

pub mod state;
pub mod store;

pub use state::{FailureKind, Phase, PipelineState};
pub use store::{StatePublisher, StateStore, SubscriptionId};
