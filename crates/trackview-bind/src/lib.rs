#![forbid(unsafe_code)]

//! Reactive view binding.
//!
//! [`use_tracker`] gives a render function a value computed by a reactive
//! producer. The value is available synchronously on the first render,
//! cached per call site in a [`Registry`], and kept current after commit by a
//! live computation that writes fresh results back and asks the host for
//! another render. [`with_tracker`] wraps a whole view the same way.
//!
//! Everything hangs off a [`TrackerRoot`] installed on the host.
//!
//! ```
//! use trackview_bind::{TrackerRoot, use_tracker};
//! use trackview_core::deps;
//! use trackview_host::Host;
//! use trackview_reactive::{Observable, Tracker};
//!
//! let host = Host::new();
//! let root = TrackerRoot::new(Tracker::new()).install(&host);
//! let count = Observable::new(1);
//!
//! let source = count.clone();
//! let mut counter = host.create(move |cx, (): &()| {
//!     let source = source.clone();
//!     Ok(*use_tracker(cx, Some(deps![]), move || Ok(source.get()))?)
//! });
//! assert_eq!(counter.render_and_commit(&()).unwrap(), 1);
//!
//! count.set(2);
//! root.tracker().flush().unwrap();
//! for _ in host.take_update_requests() {
//!     assert_eq!(counter.render_and_commit(&()).unwrap(), 2);
//! }
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod registry;
pub mod root;
pub mod with_tracker;

pub use binding::{Binding, use_binding, use_tracker, use_tracker_checked};
pub use config::{BindingConfig, BindingMode};
pub use error::BindError;
pub use registry::{InstanceIdentity, Registry, RegistryStats};
pub use root::{BindingStats, TrackerRoot};
pub use with_tracker::{TrackerSpec, with_tracker};
