#![forbid(unsafe_code)]

//! Host render model: render, commit, effects, and forced updates.
//!
//! A [`Host`] is the root of one render tree. Each component instance created
//! from it owns a list of hooks addressed by call order:
//!
//! - [`RenderCx::use_slot`]: a persistent per-call-site slot.
//! - [`RenderCx::use_effect`]: work that runs after commit, with cleanup
//!   before the next qualifying commit and on unmount.
//! - [`RenderCx::updater`]: a handle that asks the host for another render.
//!
//! Rendering is pure: effects collected by a render only run if that render
//! is the one committed.

pub mod config;
pub mod cx;
pub mod error;
pub mod host;
pub mod instance;

pub use config::HostConfig;
pub use cx::{Cleanup, RenderCx};
pub use error::{HookKind, HostError};
pub use host::{Host, HostMessage, HostStats, InstanceKey, Updater};
pub use instance::{Instance, RenderPhase};
