#![forbid(unsafe_code)]

//! The render-tree root.
//!
//! # Coalescing Rules
//!
//! Forced updates travel as [`HostMessage`]s over a channel owned by the
//! host. [`Host::take_update_requests`] drains the channel and:
//!
//! - returns each instance at most once, in order of its first request;
//! - drops requests for instances that have been unmounted.
//!
//! Callers must not assume one render per request.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::mpsc;

use ahash::{AHashMap, AHashSet};

use crate::config::HostConfig;
use crate::cx::RenderCx;
use crate::error::HostError;
use crate::instance::Instance;

/// Identity of one component instance, unique within its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(u64);

impl InstanceKey {
    /// Get the raw key value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Messages sent to the host from outside the render phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMessage {
    /// Schedule another render pass for the instance.
    Rerender(InstanceKey),
}

/// Forced-update handle for one instance.
///
/// Cheap to clone and does not keep the host alive.
#[derive(Clone)]
pub struct Updater {
    key: InstanceKey,
    sender: mpsc::Sender<HostMessage>,
}

impl Updater {
    /// The instance this handle re-renders.
    #[must_use]
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    /// Ask the host to render the instance again.
    ///
    /// Returns `false` if the host is gone.
    pub fn request(&self) -> bool {
        match self.sender.send(HostMessage::Rerender(self.key)) {
            Ok(()) => {
                tracing::trace!(message = "host.update_requested", instance = self.key.get());
                true
            }
            Err(_) => {
                tracing::debug!(message = "host.update_orphaned", instance = self.key.get());
                false
            }
        }
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater").field("key", &self.key).finish()
    }
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Render function invocations (each double-render pass counts).
    pub renders: u64,
    /// Successful commits.
    pub commits: u64,
    /// Effect bodies run.
    pub effects_run: u64,
    /// Effect cleanups run.
    pub cleanups_run: u64,
    /// Update requests merged into an earlier request for the same instance.
    pub updates_coalesced: u64,
    /// Update requests for instances that no longer exist.
    pub updates_dropped: u64,
}

pub(crate) struct HostInner {
    config: HostConfig,
    next_key: Cell<u64>,
    context: RefCell<AHashMap<TypeId, Rc<dyn Any>>>,
    live: RefCell<AHashSet<InstanceKey>>,
    sender: mpsc::Sender<HostMessage>,
    receiver: mpsc::Receiver<HostMessage>,
    stats: Cell<HostStats>,
}

/// Root of one render tree.
///
/// Cloning creates another handle to the **same** host.
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    /// Create a host with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    /// Create a host with an explicit configuration.
    #[must_use]
    pub fn with_config(config: HostConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            inner: Rc::new(HostInner {
                config,
                next_key: Cell::new(1),
                context: RefCell::new(AHashMap::new()),
                live: RefCell::new(AHashSet::new()),
                sender,
                receiver,
                stats: Cell::new(HostStats::default()),
            }),
        }
    }

    /// The configuration this host was built with.
    #[must_use]
    pub fn config(&self) -> HostConfig {
        self.inner.config
    }

    /// Diagnostic counters.
    #[must_use]
    pub fn stats(&self) -> HostStats {
        self.inner.stats.get()
    }

    /// Make `value` available to every render in this tree through
    /// [`RenderCx::context`]. Returns the value it replaces, if any.
    pub fn provide<T: Any>(&self, value: Rc<T>) -> Option<Rc<T>> {
        self.inner
            .context
            .borrow_mut()
            .insert(TypeId::of::<T>(), value)
            .and_then(|previous| previous.downcast::<T>().ok())
    }

    /// The context value of type `T`, if provided.
    #[must_use]
    pub fn context<T: Any>(&self) -> Option<Rc<T>> {
        let value = self.inner.context.borrow().get(&TypeId::of::<T>()).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Create an instance of a component. Nothing renders until
    /// [`Instance::render`] is called.
    pub fn create<P, V, F>(&self, render: F) -> Instance<P, V>
    where
        F: FnMut(&mut RenderCx<'_>, &P) -> Result<V, HostError> + 'static,
    {
        let key = InstanceKey(self.inner.next_key.get());
        self.inner.next_key.set(key.0 + 1);
        self.inner.live.borrow_mut().insert(key);
        tracing::trace!(message = "host.create", instance = key.get());
        Instance::new(key, self.clone(), Box::new(render))
    }

    /// Whether the instance exists and has not been unmounted.
    #[must_use]
    pub fn is_live(&self, key: InstanceKey) -> bool {
        self.inner.live.borrow().contains(&key)
    }

    /// Number of live instances.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.live.borrow().len()
    }

    /// Drain forced-update requests. See the module docs for coalescing.
    #[must_use]
    pub fn take_update_requests(&self) -> Vec<InstanceKey> {
        let mut seen = AHashSet::new();
        let mut keys = Vec::new();
        let mut coalesced = 0;
        let mut dropped = 0;
        while let Ok(HostMessage::Rerender(key)) = self.inner.receiver.try_recv() {
            if !self.is_live(key) {
                dropped += 1;
            } else if seen.insert(key) {
                keys.push(key);
            } else {
                coalesced += 1;
            }
        }
        self.bump(|s| {
            s.updates_coalesced += coalesced;
            s.updates_dropped += dropped;
        });
        if !keys.is_empty() || dropped > 0 {
            tracing::debug!(
                message = "host.take_updates",
                instances = keys.len(),
                coalesced,
                dropped
            );
        }
        keys
    }

    pub(crate) fn updater(&self, key: InstanceKey) -> Updater {
        Updater {
            key,
            sender: self.inner.sender.clone(),
        }
    }

    pub(crate) fn retire(&self, key: InstanceKey) {
        self.inner.live.borrow_mut().remove(&key);
    }

    pub(crate) fn bump(&self, f: impl FnOnce(&mut HostStats)) {
        let mut stats = self.inner.stats.get();
        f(&mut stats);
        self.inner.stats.set(stats);
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.inner.config)
            .field("live", &self.live_count())
            .field("stats", &self.stats())
            .finish()
    }
}
