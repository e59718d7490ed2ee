#![forbid(unsafe_code)]

//! Live computations.
//!
//! # Design
//!
//! A [`Computation`] is a cheap handle to shared state holding the body, the
//! lifecycle state and the list of dependencies read during the last run.
//! Invalidation detaches the computation from every dependency it read and
//! queues it on its tracker; the next flush reruns the body, which captures
//! a fresh dependency set.
//!
//! # Failure Modes
//!
//! - **Body returns an error**: the run still counts, dependencies read
//!   before the failure stay captured. What happens next is the tracker's
//!   [`RerunErrorPolicy`](crate::RerunErrorPolicy).
//! - **Every handle dropped**: the computation is released; nothing can
//!   queue it again. `on_stop` callbacks still run.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::capture::{Frame, FrameGuard};
use super::dependency::DependencyInner;
use super::tracker::TrackerInner;
use crate::error::ReactiveError;

/// Process-unique computation identifier (per tracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(u64);

impl ComputationId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a live subscription.
///
/// ```text
///   Absent ──autorun──▶ Capturing ──▶ Live ──invalidate──▶ Pending
///                          ▲                                 │
///                          └──────────── flush ◀─────────────┘
///   any ──stop──▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No computation exists.
    Absent,
    /// The body is running and recording dependencies.
    Capturing,
    /// Waiting for a dependency to change.
    Live,
    /// Invalidated, queued for the next flush.
    Pending,
    /// Permanently stopped.
    Stopped,
}

type Body = Box<dyn FnMut(&Computation) -> Result<(), ReactiveError>>;
type Callback = Box<dyn FnOnce()>;

pub(crate) struct ComputationInner {
    pub(crate) id: ComputationId,
    tracker: Weak<TrackerInner>,
    /// Taken out while the body runs.
    body: RefCell<Option<Body>>,
    state: Cell<SubscriptionState>,
    first_run: Cell<bool>,
    invalidated: Cell<bool>,
    run_count: Cell<u64>,
    /// Monotonic count of dependency registrations.
    captures: Cell<u64>,
    sources: RefCell<Vec<Weak<DependencyInner>>>,
    on_invalidate: RefCell<Vec<Callback>>,
    on_stop: RefCell<Vec<Callback>>,
}

impl ComputationInner {
    pub(crate) fn new(id: ComputationId, tracker: Weak<TrackerInner>, body: Body) -> Self {
        Self {
            id,
            tracker,
            body: RefCell::new(Some(body)),
            state: Cell::new(SubscriptionState::Capturing),
            first_run: Cell::new(true),
            invalidated: Cell::new(false),
            run_count: Cell::new(0),
            captures: Cell::new(0),
            sources: RefCell::new(Vec::new()),
            on_invalidate: RefCell::new(Vec::new()),
            on_stop: RefCell::new(Vec::new()),
        }
    }

    /// Bodiless and unscheduled: invalidation only flips a flag.
    pub(crate) fn detached(id: ComputationId) -> Self {
        Self {
            id,
            tracker: Weak::new(),
            body: RefCell::new(None),
            state: Cell::new(SubscriptionState::Live),
            first_run: Cell::new(false),
            invalidated: Cell::new(false),
            run_count: Cell::new(0),
            captures: Cell::new(0),
            sources: RefCell::new(Vec::new()),
            on_invalidate: RefCell::new(Vec::new()),
            on_stop: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.get() == SubscriptionState::Stopped
    }

    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated.get()
    }

    pub(crate) fn captures(&self) -> u64 {
        self.captures.get()
    }

    pub(crate) fn record_source(&self, source: Weak<DependencyInner>) {
        self.sources.borrow_mut().push(source);
        self.captures.set(self.captures.get() + 1);
    }

    fn detach_sources(&self) {
        let sources = std::mem::take(&mut *self.sources.borrow_mut());
        for source in sources {
            if let Some(source) = source.upgrade() {
                source.remove(self.id);
            }
        }
    }

    fn run_invalidate_callbacks(&self) {
        let callbacks = std::mem::take(&mut *self.on_invalidate.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn invalidate(self: &Rc<Self>) {
        if self.invalidated.get() || self.is_stopped() {
            return;
        }
        self.invalidated.set(true);
        if self.state.get() != SubscriptionState::Capturing {
            self.state.set(SubscriptionState::Pending);
        }
        self.detach_sources();
        self.run_invalidate_callbacks();
        if !self.is_stopped()
            && let Some(tracker) = self.tracker.upgrade()
        {
            tracker.enqueue(Rc::clone(self));
        }
    }

    pub(crate) fn stop(self: &Rc<Self>) {
        if self.is_stopped() {
            return;
        }
        let was_invalidated = self.invalidated.replace(true);
        self.state.set(SubscriptionState::Stopped);
        if !was_invalidated {
            self.detach_sources();
            self.run_invalidate_callbacks();
        }
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.dequeue(self.id);
        }
        let callbacks = std::mem::take(&mut *self.on_stop.borrow_mut());
        for callback in callbacks {
            callback();
        }
        // Release whatever the body captured.
        let body = self.body.borrow_mut().take();
        drop(body);
        tracing::trace!(message = "computation.stop", computation = self.id.get());
    }

    pub(crate) fn run(self: &Rc<Self>) -> Result<(), ReactiveError> {
        let Some(mut body) = self.body.borrow_mut().take() else {
            return Ok(());
        };
        self.invalidated.set(false);
        self.state.set(SubscriptionState::Capturing);
        let handle = Computation {
            inner: Rc::clone(self),
        };
        let result = {
            let _frame = FrameGuard::push(Frame::Capture(Rc::clone(self)));
            body(&handle)
        };
        self.run_count.set(self.run_count.get() + 1);
        self.first_run.set(false);
        if self.is_stopped() {
            drop(body);
        } else {
            *self.body.borrow_mut() = Some(body);
            self.state.set(if self.invalidated.get() {
                SubscriptionState::Pending
            } else {
                SubscriptionState::Live
            });
        }
        result
    }
}

impl Drop for ComputationInner {
    fn drop(&mut self) {
        if self.state.get() != SubscriptionState::Stopped {
            for callback in self.on_stop.get_mut().drain(..) {
                callback();
            }
        }
    }
}

/// Handle to a live computation.
///
/// Cloning creates another handle to the **same** computation. The
/// computation stays alive while a handle exists or while it is queued for a
/// flush.
#[derive(Clone)]
pub struct Computation {
    pub(crate) inner: Rc<ComputationInner>,
}

impl Computation {
    /// Identifier, unique within its tracker.
    #[must_use]
    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// `true` only while the body runs for the first time.
    #[must_use]
    pub fn first_run(&self) -> bool {
        self.inner.first_run.get()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.inner.state.get()
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.is_stopped()
    }

    /// Whether the computation is waiting to rerun (or stopped).
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.inner.is_invalidated()
    }

    /// Number of completed runs, successful or not.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.inner.run_count.get()
    }

    /// Queue the computation for the next flush.
    ///
    /// No-op if already invalidated or stopped.
    pub fn invalidate(&self) {
        self.inner.invalidate();
    }

    /// Stop the computation. The body never runs again.
    ///
    /// Idempotent: calling it N times has the effect of calling it once.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Run `f` once when the computation is next invalidated or stopped.
    ///
    /// Runs immediately if that already happened.
    pub fn on_invalidate(&self, f: impl FnOnce() + 'static) {
        if self.inner.is_invalidated() {
            f();
        } else {
            self.inner.on_invalidate.borrow_mut().push(Box::new(f));
        }
    }

    /// Run `f` once when the computation stops.
    ///
    /// Runs immediately if it already stopped.
    pub fn on_stop(&self, f: impl FnOnce() + 'static) {
        if self.inner.is_stopped() {
            f();
        } else {
            self.inner.on_stop.borrow_mut().push(Box::new(f));
        }
    }

    /// Run `f` with this computation as the capture target, as if `f` were
    /// part of its body.
    pub fn run_captured<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = FrameGuard::push(Frame::Capture(Rc::clone(&self.inner)));
        f()
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("run_count", &self.inner.run_count.get())
            .finish()
    }
}

impl PartialEq for Computation {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Computation {}
