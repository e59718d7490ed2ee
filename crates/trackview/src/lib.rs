#![forbid(unsafe_code)]

//! trackview public facade crate.
//!
//! Re-exports the workspace crates and a prelude with the names most
//! components need.

pub use trackview_core as core;
pub use trackview_host as host;
pub use trackview_reactive as reactive;

#[cfg(feature = "bind")]
pub use trackview_bind as bind;

pub mod prelude {
    pub use trackview_core::{Dep, Deps, deps, deps_equal};
    pub use trackview_host::{Cleanup, Host, HostConfig, HostError, Instance, RenderCx};
    pub use trackview_reactive::{Computation, Observable, ReactiveError, Tracker, TrackerConfig};

    #[cfg(feature = "bind")]
    pub use trackview_bind::{
        BindError, BindingConfig, BindingMode, TrackerRoot, TrackerSpec, use_binding,
        use_tracker, use_tracker_checked, with_tracker,
    };
}
