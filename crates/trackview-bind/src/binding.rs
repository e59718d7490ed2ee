#![forbid(unsafe_code)]

//! Binding a reactive producer to a component call site.
//!
//! # Lifecycle
//!
//! Render (pure with respect to the tracker):
//!
//! 1. The first render allocates an [`InstanceIdentity`] in a persistent slot.
//! 2. Every render asks the registry for the entry of that identity. Equal
//!    deps return the cached result; anything else runs the producer inside
//!    [`Tracker::nonreactive`](trackview_reactive::Tracker::nonreactive),
//!    records what it read in a [`ReadSet`], and caches the result.
//!
//! Effect (after the first commit, and after every commit whose deps
//! changed):
//!
//! 3. Any previous computation is stopped, the committed value is written
//!    back to the registry, and a live computation starts. Its first run only
//!    captures dependencies; the value it produces is discarded because the
//!    render-time value is already authoritative. If the committed value's
//!    inputs changed between render and commit, the new computation is
//!    invalidated at once so the next flush replaces it. Each later run
//!    writes its result to the registry and asks the host to render again.
//! 4. Cleanup, before the next qualifying commit and on unmount, stops the
//!    computation and evicts the entry. Dropping the instance's hooks evicts
//!    it too, so a site that never committed leaves nothing behind.
//!
//! # Invariants
//!
//! 1. A call site never has two live computations.
//! 2. Renders never start or stop computations.
//! 3. After unmount the registry holds no entry for the call site.
//!
//! # Failure Modes
//!
//! - **Producer fails during render**: [`BindError::Producer`]; the cache is
//!   left as it was.
//! - **Producer fails in a live rerun**: the failure is kept and returned as
//!   [`BindError::Rerun`] by the next render, and a re-render is requested.
//!   Whether the computation keeps running is the tracker's
//!   [`RerunErrorPolicy`](trackview_reactive::RerunErrorPolicy).
//! - **Producer fails in the live first run**: no computation is left
//!   running, the entry is evicted, and the next commit starts a fresh one.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trackview_core::{Dep, Deps};
use trackview_host::{Cleanup, RenderCx, Updater};
use trackview_reactive::{Computation, ReactiveError, ReadSet, SubscriptionState};

use crate::config::BindingMode;
use crate::error::BindError;
use crate::registry::InstanceIdentity;
use crate::root::TrackerRoot;

type Producer<T> = Rc<dyn Fn() -> Result<T, ReactiveError>>;

/// Persistent state of one call site.
struct SiteState {
    identity: InstanceIdentity,
    computation: RefCell<Option<Computation>>,
    pending_error: RefCell<Option<ReactiveError>>,
    /// Bumped when the live computation could not start; part of the
    /// effect deps so the next commit starts it again.
    restarts: Cell<u64>,
    /// What the last render-time compute read, keyed by the value it made.
    render_reads: RefCell<Option<(Rc<dyn Any>, ReadSet)>>,
    /// The last stopped computation was waiting to rerun.
    missed_change: Cell<bool>,
}

impl SiteState {
    fn new(identity: InstanceIdentity) -> Self {
        Self {
            identity,
            computation: RefCell::new(None),
            pending_error: RefCell::new(None),
            restarts: Cell::new(0),
            render_reads: RefCell::new(None),
            missed_change: Cell::new(false),
        }
    }

    fn stop_computation(&self) -> bool {
        let previous = self.computation.borrow_mut().take();
        match previous {
            Some(computation) => {
                self.missed_change.set(computation.is_invalidated());
                computation.stop();
                true
            }
            None => false,
        }
    }

    fn fail(&self, err: ReactiveError) {
        *self.pending_error.borrow_mut() = Some(err);
    }

    /// Whether the inputs behind `value` changed since it was computed.
    ///
    /// Decided by the render-time read set when `value` came from a render,
    /// otherwise by the computation that last kept it current.
    fn inputs_changed<T: Any>(&self, value: &Rc<T>) -> bool {
        let reads = self.render_reads.borrow_mut().take();
        let changed = match reads {
            Some((rendered, reads))
                if std::ptr::addr_eq(Rc::as_ptr(&rendered), Rc::as_ptr(value)) =>
            {
                reads.is_changed()
            }
            _ => self.missed_change.get(),
        };
        self.missed_change.set(false);
        changed
    }
}

/// Slot owner of a call site. Dropped when the instance unmounts, committed
/// or not, and releases the call site's cache entry.
struct SiteSlot {
    site: Rc<SiteState>,
    root: Weak<TrackerRoot>,
}

impl Drop for SiteSlot {
    fn drop(&mut self) {
        let identity = self.site.identity;
        *self.site.render_reads.borrow_mut() = None;
        let Some(root) = self.root.upgrade() else {
            return;
        };
        if self.site.stop_computation() {
            root.bump(|s| s.computations_stopped += 1);
        }
        if root.registry().evict(identity) {
            tracing::debug!(message = "binding.release", identity = identity.get());
        }
    }
}

/// The value a call site rendered with, plus a view of its live state.
pub struct Binding<T> {
    value: Rc<T>,
    site: Option<Rc<SiteState>>,
}

impl<T> Binding<T> {
    #[must_use]
    pub fn value(&self) -> &Rc<T> {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> Rc<T> {
        self.value
    }

    /// The call site's identity; `None` in [`BindingMode::Static`].
    #[must_use]
    pub fn identity(&self) -> Option<InstanceIdentity> {
        self.site.as_ref().map(|site| site.identity)
    }

    /// The live computation, if one is running.
    #[must_use]
    pub fn computation(&self) -> Option<Computation> {
        self.site.as_ref()?.computation.borrow().clone()
    }

    /// State of the call site's live subscription right now.
    #[must_use]
    pub fn subscription_state(&self) -> SubscriptionState {
        self.computation()
            .map_or(SubscriptionState::Absent, |c| c.state())
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
            site: self.site.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("value", &self.value)
            .field("identity", &self.identity())
            .field("subscription", &self.subscription_state())
            .finish()
    }
}

/// Give the render a value from `producer`, kept current by a live
/// computation while the instance is mounted.
///
/// `deps` decides when the cached value may be reused; `None` recomputes on
/// every render.
///
/// # Errors
///
/// See the module's failure modes, plus [`BindError::MissingRoot`] and hook
/// sequence errors.
pub fn use_tracker<T, F>(
    cx: &mut RenderCx<'_>,
    deps: Option<Deps>,
    producer: F,
) -> Result<Rc<T>, BindError>
where
    T: Any,
    F: Fn() -> Result<T, ReactiveError> + 'static,
{
    bind(cx, deps, Rc::new(producer)).map(Binding::into_value)
}

/// Like [`use_tracker`], returning the full [`Binding`].
///
/// # Errors
///
/// As [`use_tracker`].
pub fn use_binding<T, F>(
    cx: &mut RenderCx<'_>,
    deps: Option<Deps>,
    producer: F,
) -> Result<Binding<T>, BindError>
where
    T: Any,
    F: Fn() -> Result<T, ReactiveError> + 'static,
{
    bind(cx, deps, Rc::new(producer))
}

/// Like [`use_tracker`], and when
/// [`BindingConfig::consistency_check`](crate::BindingConfig) is on,
/// evaluates the producer again and warns if it disagrees with the value
/// about to be returned. A disagreement is never an error.
///
/// # Errors
///
/// As [`use_tracker`].
pub fn use_tracker_checked<T, F>(
    cx: &mut RenderCx<'_>,
    deps: Option<Deps>,
    producer: F,
) -> Result<Rc<T>, BindError>
where
    T: Any + PartialEq + fmt::Debug,
    F: Fn() -> Result<T, ReactiveError> + 'static,
{
    let producer: Producer<T> = Rc::new(producer);
    let binding = bind(cx, deps, Rc::clone(&producer))?;
    let root = TrackerRoot::from_cx(cx)?;
    if root.config().consistency_check
        && let Some(identity) = binding.identity()
    {
        match root.tracker().nonreactive(|| producer()) {
            Ok(fresh) if fresh != *binding.value => {
                root.bump(|s| s.stale_reads += 1);
                tracing::warn!(
                    message = "binding.stale_cache",
                    identity = identity.get(),
                    cached = ?binding.value,
                    fresh = ?fresh
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(
                    message = "binding.check_failed",
                    identity = identity.get(),
                    error = %err
                );
            }
        }
    }
    Ok(binding.into_value())
}

fn bind<T: Any>(
    cx: &mut RenderCx<'_>,
    deps: Option<Deps>,
    producer: Producer<T>,
) -> Result<Binding<T>, BindError> {
    let root = TrackerRoot::from_cx(cx)?;

    if root.config().mode == BindingMode::Static {
        let value = root
            .tracker()
            .nonreactive(|| producer())
            .map_err(BindError::Producer)?;
        return Ok(Binding {
            value: Rc::new(value),
            site: None,
        });
    }

    let slot = cx.use_slot(|| SiteSlot {
        site: Rc::new(SiteState::new(root.registry().create_identity())),
        root: Rc::downgrade(&root),
    })?;
    let site = Rc::clone(&slot.site);
    let identity = site.identity;

    let pending = site.pending_error.borrow_mut().take();
    if let Some(source) = pending {
        return Err(BindError::Rerun { identity, source });
    }

    let mut reads = None;
    let value = root
        .registry()
        .get_or_compute(identity, deps.as_ref(), || {
            let tracker = root.tracker();
            let (result, read_set) = tracker.nonreactive(|| tracker.track_reads(|| producer()));
            reads = Some(read_set);
            result
        })
        .map_err(BindError::Producer)?;
    if let Some(reads) = reads {
        *site.render_reads.borrow_mut() = Some((Rc::clone(&value) as Rc<dyn Any>, reads));
    }

    let effect_deps = deps.as_ref().map(|deps| {
        deps.iter()
            .cloned()
            .chain([Dep::from(site.restarts.get())])
            .collect::<Deps>()
    });
    let live = LiveSite {
        root: Rc::clone(&root),
        site: Rc::clone(&site),
        deps,
        producer,
        value: Rc::clone(&value),
        updater: cx.updater(),
    };
    cx.use_effect(effect_deps, move || live.start())?;

    Ok(Binding {
        value,
        site: Some(site),
    })
}

/// Everything the effect of one committed render needs.
struct LiveSite<T> {
    root: Rc<TrackerRoot>,
    site: Rc<SiteState>,
    deps: Option<Deps>,
    producer: Producer<T>,
    value: Rc<T>,
    updater: Updater,
}

impl<T: Any> LiveSite<T> {
    fn start(self) -> Cleanup {
        let Self {
            root,
            site,
            deps,
            producer,
            value,
            updater,
        } = self;
        let identity = site.identity;

        if site.stop_computation() {
            root.bump(|s| s.computations_stopped += 1);
        }
        let stale = site.inputs_changed(&value);
        root.registry().update(identity, deps.clone(), value);

        let body = rerun_body(
            Rc::downgrade(&root),
            Rc::downgrade(&site),
            deps,
            producer,
            updater.clone(),
        );
        let tracker = root.tracker().clone();
        match tracker.nonreactive(|| tracker.autorun(body)) {
            Ok(computation) => {
                tracing::debug!(
                    message = "binding.start",
                    identity = identity.get(),
                    computation = computation.id().get()
                );
                if stale {
                    tracing::debug!(
                        message = "binding.stale_on_start",
                        identity = identity.get()
                    );
                    computation.invalidate();
                }
                *site.computation.borrow_mut() = Some(computation);
                root.bump(|s| s.computations_started += 1);
            }
            Err(err) => {
                tracing::warn!(
                    message = "binding.start_failed",
                    identity = identity.get(),
                    error = %err
                );
                root.registry().evict(identity);
                site.restarts.set(site.restarts.get() + 1);
                site.fail(err);
                root.bump(|s| s.rerun_failures += 1);
                updater.request();
            }
        }

        Cleanup::new(move || {
            if site.stop_computation() {
                root.bump(|s| s.computations_stopped += 1);
            }
            root.registry().evict(identity);
            tracing::debug!(message = "binding.stop", identity = identity.get());
        })
    }
}

fn rerun_body<T: Any>(
    root: Weak<TrackerRoot>,
    site: Weak<SiteState>,
    deps: Option<Deps>,
    producer: Producer<T>,
    updater: Updater,
) -> impl FnMut(&Computation) -> Result<(), ReactiveError> + 'static {
    move |computation| {
        if computation.first_run() {
            producer()?;
            return Ok(());
        }
        let (Some(root), Some(site)) = (root.upgrade(), site.upgrade()) else {
            computation.stop();
            return Ok(());
        };
        match producer() {
            Ok(value) => {
                root.registry()
                    .update(site.identity, deps.clone(), Rc::new(value));
                root.bump(|s| s.reruns += 1);
                tracing::debug!(
                    message = "binding.rerun",
                    identity = site.identity.get(),
                    computation = computation.id().get()
                );
                updater.request();
                Ok(())
            }
            Err(err) => {
                root.bump(|s| s.rerun_failures += 1);
                site.fail(err.clone());
                updater.request();
                Err(err)
            }
        }
    }
}
