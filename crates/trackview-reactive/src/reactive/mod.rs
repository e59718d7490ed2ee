#![forbid(unsafe_code)]

//! Reactive computations for trackview.
//!
//! This module provides the invalidation-based primitives the view binding
//! is built on:
//!
//! - [`Tracker`]: owns the pending-rerun queue and the flush loop. Several
//!   trackers may live in one thread; none of them is global.
//! - [`Computation`]: one live run of a function. Records every
//!   [`Dependency`] it reads and reruns at the next flush after any of them
//!   changes, until [`stop`](Computation::stop) is called.
//! - [`Dependency`]: the invalidation edge a data source exposes.
//! - [`Observable`]: a shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks and dependency capture on read.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`ReadSet`]: the dependencies one function read, flagged when any of
//!   them changes; never reruns anything.
//!
//! # Architecture
//!
//! Everything is single-threaded and uses `Rc<RefCell<..>>`. The computation
//! that is currently capturing lives on a thread-local frame stack;
//! [`Tracker::nonreactive`] pushes an isolation frame so reads inside it are
//! invisible to the enclosing computation. Dependencies hold computations
//! weakly; the tracker's pending queue holds them strongly until they rerun.
//!
//! # Invariants
//!
//! 1. A computation's first run happens synchronously inside
//!    [`Tracker::autorun`]; every later run happens inside [`Tracker::flush`].
//! 2. A stopped computation never runs again, and stopping is idempotent.
//! 3. A computation is queued at most once per invalidation.
//! 4. Reads inside [`Tracker::nonreactive`] never register on the enclosing
//!    computation.
//! 5. Setting an [`Observable`] to an equal value is a no-op (no version
//!    bump, no notifications, no invalidation).

mod capture;
pub mod computation;
pub mod dependency;
pub mod observable;
pub mod read_set;
pub mod tracker;

pub use computation::{Computation, ComputationId, SubscriptionState};
pub use dependency::Dependency;
pub use observable::{Observable, Subscription};
pub use read_set::ReadSet;
pub use tracker::{FlushReport, Tracker, TrackerStats};
