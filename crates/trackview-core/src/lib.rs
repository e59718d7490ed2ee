#![forbid(unsafe_code)]

//! Core: dependency lists and the comparator shared by the binding cache and
//! the host effect scheduler.

pub mod deps;

pub use deps::{Dep, Deps, deps_equal};
