#![forbid(unsafe_code)]

//! The per-tree binding context.
//!
//! A [`TrackerRoot`] bundles the result [`Registry`], the [`Tracker`] that
//! runs live computations, and the [`BindingConfig`]. It is installed on a
//! [`Host`] as a context value, so independent render trees in one thread
//! never share cache entries or computations.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use trackview_host::{Host, RenderCx};
use trackview_reactive::Tracker;

use crate::config::BindingConfig;
use crate::error::BindError;
use crate::registry::Registry;

/// Binding counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingStats {
    /// Live computations started by effects.
    pub computations_started: u64,
    /// Live computations stopped by cleanups.
    pub computations_stopped: u64,
    /// Live reruns that produced a new value.
    pub reruns: u64,
    /// Live runs (first or later) that failed.
    pub rerun_failures: u64,
    /// Consistency checks that disagreed with the cache.
    pub stale_reads: u64,
}

pub struct TrackerRoot {
    registry: Registry,
    tracker: Tracker,
    config: BindingConfig,
    stats: Cell<BindingStats>,
}

impl TrackerRoot {
    /// A root with the default [`BindingConfig`].
    #[must_use]
    pub fn new(tracker: Tracker) -> Self {
        Self::with_config(tracker, BindingConfig::default())
    }

    #[must_use]
    pub fn with_config(tracker: Tracker, config: BindingConfig) -> Self {
        Self {
            registry: Registry::new(),
            tracker,
            config,
            stats: Cell::new(BindingStats::default()),
        }
    }

    /// Provide this root to every render under `host`.
    ///
    /// Replaces a previously installed root; entries held by the old root
    /// are not migrated.
    pub fn install(self, host: &Host) -> Rc<Self> {
        let root = Rc::new(self);
        if host.provide(Rc::clone(&root)).is_some() {
            tracing::warn!(message = "root.replaced");
        }
        root
    }

    /// The root installed on the host rendering `cx`.
    ///
    /// # Errors
    ///
    /// [`BindError::MissingRoot`] if none was installed.
    pub fn from_cx(cx: &RenderCx<'_>) -> Result<Rc<Self>, BindError> {
        cx.context::<Self>().ok_or(BindError::MissingRoot)
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[must_use]
    pub fn config(&self) -> BindingConfig {
        self.config
    }

    #[must_use]
    pub fn stats(&self) -> BindingStats {
        self.stats.get()
    }

    pub(crate) fn bump(&self, f: impl FnOnce(&mut BindingStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl fmt::Debug for TrackerRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerRoot")
            .field("registry", &self.registry)
            .field("tracker", &self.tracker)
            .field("config", &self.config)
            .field("stats", &self.stats.get())
            .finish()
    }
}
