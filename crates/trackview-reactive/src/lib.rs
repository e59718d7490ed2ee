#![forbid(unsafe_code)]

//! Invalidation-based reactive computations for trackview.
//!
//! A [`Tracker`] runs functions inside [`Computation`]s that record every
//! [`Dependency`] they read and rerun, at the tracker's next
//! [`flush`](Tracker::flush), whenever one of those dependencies changes.
//! [`Observable`] is the value-holding source most callers read from.

pub mod config;
pub mod error;
pub mod reactive;

pub use config::{RerunErrorPolicy, TrackerConfig, ViolationPolicy};
pub use error::ReactiveError;
pub use reactive::{
    Computation, ComputationId, Dependency, FlushReport, Observable, ReadSet, Subscription,
    SubscriptionState, Tracker, TrackerStats,
};
