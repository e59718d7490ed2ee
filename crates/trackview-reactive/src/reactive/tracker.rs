#![forbid(unsafe_code)]

//! The tracker: autorun, isolation, and the flush loop.
//!
//! # Flush semantics
//!
//! A flush drains the pending queue in passes. Each pass reruns the
//! computations that were pending when it started, in invalidation order;
//! computations invalidated during the pass run in the next one. When the
//! queue is empty the `after_flush` callbacks run, and if they invalidate
//! anything another pass follows. A flush that needs more than
//! [`TrackerConfig::max_flush_passes`] passes stops with
//! [`ReactiveError::FlushLimit`] and leaves the remainder queued.
//!
//! # Failure isolation
//!
//! A failing rerun never aborts the flush: the failure is logged, recorded
//! in the [`FlushReport`], and handled per [`RerunErrorPolicy`]. Other
//! computations in the same flush are unaffected.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use super::capture::{self, Frame, FrameGuard};
use super::computation::{Computation, ComputationId, ComputationInner};
use super::read_set::ReadSet;
use crate::config::{RerunErrorPolicy, TrackerConfig, ViolationPolicy};
use crate::error::ReactiveError;

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Computations started with [`Tracker::autorun`].
    pub computations: u64,
    /// Reruns performed by flushes.
    pub reruns: u64,
    /// Reruns that returned an error.
    pub rerun_failures: u64,
    /// Reads that escaped a [`Tracker::nonreactive`] scope.
    pub isolation_violations: u64,
}

/// Outcome of one [`Tracker::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Drain passes taken (including after-flush passes).
    pub passes: usize,
    /// Computations rerun.
    pub reruns: usize,
    /// Reruns that failed, in the order they ran.
    pub failures: Vec<(ComputationId, ReactiveError)>,
}

impl FlushReport {
    /// Whether every rerun succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub(crate) struct TrackerInner {
    config: TrackerConfig,
    next_id: Cell<u64>,
    pending: RefCell<VecDeque<Rc<ComputationInner>>>,
    after_flush: RefCell<Vec<Box<dyn FnOnce()>>>,
    flushing: Cell<bool>,
    stats: Cell<TrackerStats>,
}

impl TrackerInner {
    pub(crate) fn enqueue(&self, computation: Rc<ComputationInner>) {
        self.pending.borrow_mut().push_back(computation);
    }

    pub(crate) fn dequeue(&self, id: ComputationId) {
        let removed = {
            let mut pending = self.pending.borrow_mut();
            pending
                .iter()
                .position(|c| c.id == id)
                .and_then(|index| pending.remove(index))
        };
        drop(removed);
    }

    fn bump(&self, f: impl FnOnce(&mut TrackerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

struct FlushingGuard<'a> {
    flushing: &'a Cell<bool>,
}

impl<'a> FlushingGuard<'a> {
    fn enter(flushing: &'a Cell<bool>) -> Self {
        flushing.set(true);
        Self { flushing }
    }
}

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.flushing.set(false);
    }
}

/// Owner of a reactive scheduling domain.
///
/// Cloning creates another handle to the **same** tracker.
#[derive(Clone)]
pub struct Tracker {
    inner: Rc<TrackerInner>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    /// Create a tracker with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    /// Create a tracker with an explicit configuration.
    #[must_use]
    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                config,
                next_id: Cell::new(1),
                pending: RefCell::new(VecDeque::new()),
                after_flush: RefCell::new(Vec::new()),
                flushing: Cell::new(false),
                stats: Cell::new(TrackerStats::default()),
            }),
        }
    }

    /// The configuration this tracker was built with.
    #[must_use]
    pub fn config(&self) -> TrackerConfig {
        self.inner.config
    }

    /// Diagnostic counters.
    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        self.inner.stats.get()
    }

    /// Start a computation.
    ///
    /// `body` runs once synchronously, capturing every dependency it reads,
    /// and again at each flush following a change to any of them, until the
    /// computation is stopped. If the first run fails the computation is
    /// stopped and the error returned.
    ///
    /// When called while another computation is capturing, the new one is
    /// stopped as soon as that outer computation is invalidated or stopped.
    /// Wrap the call in [`nonreactive`](Self::nonreactive) to prevent that.
    pub fn autorun<F>(&self, body: F) -> Result<Computation, ReactiveError>
    where
        F: FnMut(&Computation) -> Result<(), ReactiveError> + 'static,
    {
        let id = ComputationId::new(self.inner.next_id.get());
        self.inner.next_id.set(id.get() + 1);
        self.inner.bump(|s| s.computations += 1);

        let computation = Computation {
            inner: Rc::new(ComputationInner::new(
                id,
                Rc::downgrade(&self.inner),
                Box::new(body),
            )),
        };

        let parent = capture::current();
        if let Some(parent) = &parent {
            let child = Rc::downgrade(&computation.inner);
            Computation {
                inner: Rc::clone(parent),
            }
            .on_invalidate(move || {
                if let Some(child) = child.upgrade() {
                    child.stop();
                }
            });
        }
        tracing::trace!(
            message = "tracker.autorun",
            computation = id.get(),
            parent = parent.as_ref().map(|p| p.id.get())
        );

        match computation.inner.run() {
            Ok(()) => Ok(computation),
            Err(err) => {
                tracing::debug!(
                    message = "tracker.first_run_failed",
                    computation = id.get(),
                    error = %err
                );
                computation.stop();
                Err(err)
            }
        }
    }

    /// Run `f` so that nothing it reads registers on an enclosing
    /// computation, and computations it starts are not children of one.
    ///
    /// If the enclosing computation nevertheless gains dependencies while
    /// `f` runs, the read escaped the isolation; that is reported per
    /// [`ViolationPolicy`].
    pub fn nonreactive<R>(&self, f: impl FnOnce() -> R) -> R {
        let enclosing = capture::current();
        let before = enclosing.as_ref().map(|c| c.captures());
        let result = {
            let _frame = FrameGuard::push(Frame::Isolated);
            f()
        };
        if let (Some(enclosing), Some(before)) = (enclosing, before) {
            let leaked = enclosing.captures() - before;
            if leaked > 0 {
                self.report_violation(enclosing.id, leaked);
            }
        }
        result
    }

    /// Run `f` and record every dependency it reads into a [`ReadSet`].
    ///
    /// Reads do not register on an enclosing computation, and nothing is
    /// scheduled: the set only reports whether a recorded dependency has
    /// changed since.
    pub fn track_reads<R>(&self, f: impl FnOnce() -> R) -> (R, ReadSet) {
        let id = ComputationId::new(self.inner.next_id.get());
        self.inner.next_id.set(id.get() + 1);
        let set = ReadSet {
            inner: Rc::new(ComputationInner::detached(id)),
        };
        let result = {
            let _frame = FrameGuard::push(Frame::Record(Rc::clone(&set.inner)));
            f()
        };
        (result, set)
    }

    fn report_violation(&self, id: ComputationId, leaked: u64) {
        self.inner.bump(|s| s.isolation_violations += 1);
        tracing::error!(
            message = "tracker.isolation_violation",
            computation = id.get(),
            leaked
        );
        if self.inner.config.isolation_violations == ViolationPolicy::Panic {
            panic!("{leaked} read(s) escaped a nonreactive scope into computation {id}");
        }
    }

    /// The computation reads currently register on, if any.
    #[must_use]
    pub fn current(&self) -> Option<Computation> {
        capture::current().map(|inner| Computation { inner })
    }

    /// Whether a computation is capturing right now.
    #[must_use]
    pub fn is_active(&self) -> bool {
        capture::current().is_some()
    }

    /// Whether any computation is waiting for a flush.
    #[must_use]
    pub fn needs_flush(&self) -> bool {
        !self.inner.pending.borrow().is_empty()
    }

    /// Number of computations waiting for a flush.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Run `f` once after the pending queue of the next flush is empty.
    pub fn after_flush(&self, f: impl FnOnce() + 'static) {
        self.inner.after_flush.borrow_mut().push(Box::new(f));
    }

    /// Rerun every invalidated computation.
    ///
    /// # Errors
    ///
    /// - [`ReactiveError::ReentrantFlush`] if called while flushing.
    /// - [`ReactiveError::FlushInsideComputation`] if called from a body.
    /// - [`ReactiveError::FlushLimit`] if the queue does not settle.
    ///
    /// Individual rerun failures are not errors; see [`FlushReport::failures`].
    pub fn flush(&self) -> Result<FlushReport, ReactiveError> {
        if self.inner.flushing.get() {
            return Err(ReactiveError::ReentrantFlush);
        }
        if let Some(current) = capture::current() {
            return Err(ReactiveError::FlushInsideComputation(current.id));
        }
        let _flushing = FlushingGuard::enter(&self.inner.flushing);
        let limit = self.inner.config.max_flush_passes;
        let mut report = FlushReport::default();

        loop {
            let batch: Vec<_> = self.inner.pending.borrow_mut().drain(..).collect();
            let callbacks: Vec<_> = if batch.is_empty() {
                self.inner.after_flush.borrow_mut().drain(..).collect()
            } else {
                Vec::new()
            };
            if batch.is_empty() && callbacks.is_empty() {
                break;
            }
            report.passes += 1;
            if report.passes > limit {
                tracing::warn!(message = "tracker.flush_limit", limit);
                self.inner.pending.borrow_mut().extend(batch);
                self.inner.after_flush.borrow_mut().extend(callbacks);
                return Err(ReactiveError::FlushLimit { limit });
            }
            for computation in batch {
                self.rerun(&computation, &mut report);
            }
            for callback in callbacks {
                callback();
            }
        }

        tracing::debug!(
            message = "tracker.flush",
            passes = report.passes,
            reruns = report.reruns,
            failures = report.failures.len()
        );
        Ok(report)
    }

    fn rerun(&self, computation: &Rc<ComputationInner>, report: &mut FlushReport) {
        if computation.is_stopped() || !computation.is_invalidated() {
            return;
        }
        report.reruns += 1;
        self.inner.bump(|s| s.reruns += 1);
        if let Err(err) = computation.run() {
            self.inner.bump(|s| s.rerun_failures += 1);
            tracing::warn!(
                message = "tracker.rerun_failed",
                computation = computation.id.get(),
                error = %err
            );
            if self.inner.config.rerun_errors == RerunErrorPolicy::Stop {
                computation.stop();
            }
            report.failures.push((computation.id, err));
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_count())
            .field("flushing", &self.inner.flushing.get())
            .field("stats", &self.inner.stats.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Dependency, Observable, SubscriptionState};

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0u32));
        (Rc::clone(&count), count)
    }

    #[test]
    fn first_run_is_synchronous() {
        let tracker = Tracker::new();
        let (runs, runs_clone) = counter();
        let c = tracker
            .autorun(move |c| {
                assert!(c.first_run());
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            })
            .expect("autorun");
        assert_eq!(runs.get(), 1);
        assert!(!c.first_run());
        assert_eq!(c.state(), SubscriptionState::Live);
        assert_eq!(c.run_count(), 1);
    }

    #[test]
    fn reruns_only_at_flush() {
        let tracker = Tracker::new();
        let source = Observable::new(1);
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        let source_clone = source.clone();
        let c = tracker
            .autorun(move |_| {
                seen_clone.set(source_clone.get());
                Ok(())
            })
            .expect("autorun");

        source.set(2);
        assert_eq!(seen.get(), 1, "no rerun before flush");
        assert_eq!(c.state(), SubscriptionState::Pending);
        assert!(tracker.needs_flush());

        let report = tracker.flush().expect("flush");
        assert_eq!(report.reruns, 1);
        assert!(report.is_clean());
        assert_eq!(seen.get(), 2);
        assert_eq!(c.state(), SubscriptionState::Live);
    }

    #[test]
    fn multiple_invalidations_coalesce() {
        let tracker = Tracker::new();
        let source = Observable::new(0);
        let (runs, runs_clone) = counter();
        let source_clone = source.clone();
        let _c = tracker
            .autorun(move |_| {
                let _ = source_clone.get();
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            })
            .expect("autorun");
        for i in 1..=5 {
            source.set(i);
        }
        assert_eq!(tracker.pending_count(), 1);
        tracker.flush().expect("flush");
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn stop_is_idempotent_and_final() {
        let tracker = Tracker::new();
        let source = Observable::new(0);
        let (runs, runs_clone) = counter();
        let (stops, stops_clone) = counter();
        let source_clone = source.clone();
        let c = tracker
            .autorun(move |_| {
                let _ = source_clone.get();
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            })
            .expect("autorun");
        c.on_stop(move || stops_clone.set(stops_clone.get() + 1));

        source.set(1);
        c.stop();
        c.stop();
        c.stop();
        assert!(!tracker.needs_flush(), "stop dequeues");
        tracker.flush().expect("flush");
        source.set(2);
        tracker.flush().expect("flush");

        assert_eq!(runs.get(), 1);
        assert_eq!(stops.get(), 1);
        assert_eq!(c.state(), SubscriptionState::Stopped);
    }

    #[test]
    fn first_run_failure_stops_and_returns_error() {
        let tracker = Tracker::new();
        let source = Observable::new(0);
        let source_clone = source.clone();
        let err = tracker
            .autorun(move |_| {
                let _ = source_clone.get();
                Err(ReactiveError::failed("boom"))
            })
            .expect_err("first run fails");
        assert_eq!(err, ReactiveError::failed("boom"));
        source.set(1);
        assert!(!tracker.needs_flush());
    }

    #[test]
    fn rerun_failure_keeps_computation_alive_by_default() {
        let tracker = Tracker::new();
        let source = Observable::new(0);
        let source_clone = source.clone();
        let c = tracker
            .autorun(move |_| {
                if source_clone.get() == 1 {
                    return Err(ReactiveError::failed("odd state"));
                }
                Ok(())
            })
            .expect("autorun");

        source.set(1);
        let report = tracker.flush().expect("flush");
        assert_eq!(report.failures, vec![(c.id(), ReactiveError::failed("odd state"))]);
        assert_eq!(c.state(), SubscriptionState::Live);

        source.set(2);
        let report = tracker.flush().expect("flush");
        assert!(report.is_clean());
        assert_eq!(c.run_count(), 3);
        assert_eq!(tracker.stats().rerun_failures, 1);
    }

    #[test]
    fn rerun_failure_stops_under_stop_policy() {
        let tracker =
            Tracker::with_config(TrackerConfig::default().with_rerun_errors(RerunErrorPolicy::Stop));
        let source = Observable::new(0);
        let source_clone = source.clone();
        let c = tracker
            .autorun(move |_| {
                if source_clone.get() > 0 {
                    return Err(ReactiveError::failed("no"));
                }
                Ok(())
            })
            .expect("autorun");
        source.set(1);
        tracker.flush().expect("flush");
        assert!(c.is_stopped());
    }

    #[test]
    fn failure_is_isolated_per_computation() {
        let tracker = Tracker::new();
        let source = Observable::new(0);
        let seen = Rc::new(Cell::new(0));

        let failing_source = source.clone();
        let _failing = tracker
            .autorun(move |c| {
                let v = failing_source.get();
                if !c.first_run() {
                    return Err(ReactiveError::failed(format!("cannot handle {v}")));
                }
                Ok(())
            })
            .expect("autorun");

        let healthy_source = source.clone();
        let seen_clone = Rc::clone(&seen);
        let _healthy = tracker
            .autorun(move |_| {
                seen_clone.set(healthy_source.get());
                Ok(())
            })
            .expect("autorun");

        source.set(7);
        let report = tracker.flush().expect("flush");
        assert_eq!(report.reruns, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn nested_autorun_stops_with_parent() {
        let tracker = Tracker::new();
        let outer_source = Observable::new(0);
        let inner_runs = Rc::new(Cell::new(0u32));
        let children: Rc<RefCell<Vec<Computation>>> = Rc::new(RefCell::new(Vec::new()));

        let tracker_clone = tracker.clone();
        let outer_clone = outer_source.clone();
        let inner_runs_clone = Rc::clone(&inner_runs);
        let children_clone = Rc::clone(&children);
        let _outer = tracker
            .autorun(move |_| {
                let _ = outer_clone.get();
                let runs = Rc::clone(&inner_runs_clone);
                let child = tracker_clone.autorun(move |_| {
                    runs.set(runs.get() + 1);
                    Ok(())
                })?;
                children_clone.borrow_mut().push(child);
                Ok(())
            })
            .expect("autorun");

        outer_source.set(1);
        tracker.flush().expect("flush");
        let children = children.borrow();
        assert_eq!(children.len(), 2);
        assert!(children[0].is_stopped(), "first child torn down by parent");
        assert!(!children[1].is_stopped());
        assert_eq!(inner_runs.get(), 2);
    }

    #[test]
    fn nonreactive_autorun_survives_parent_invalidation() {
        let tracker = Tracker::new();
        let outer_source = Observable::new(0);
        let children: Rc<RefCell<Vec<Computation>>> = Rc::new(RefCell::new(Vec::new()));

        let tracker_clone = tracker.clone();
        let outer_clone = outer_source.clone();
        let children_clone = Rc::clone(&children);
        let _outer = tracker
            .autorun(move |_| {
                let _ = outer_clone.get();
                let child = tracker_clone.nonreactive(|| tracker_clone.autorun(|_| Ok(())))?;
                children_clone.borrow_mut().push(child);
                Ok(())
            })
            .expect("autorun");

        outer_source.set(1);
        tracker.flush().expect("flush");
        assert!(children.borrow().iter().all(|c| !c.is_stopped()));
    }

    #[test]
    fn nonreactive_reads_do_not_register() {
        let tracker = Tracker::new();
        let tracked = Observable::new(0);
        let hidden = Observable::new(0);
        let (runs, runs_clone) = counter();

        let tracker_clone = tracker.clone();
        let tracked_clone = tracked.clone();
        let hidden_clone = hidden.clone();
        let _c = tracker
            .autorun(move |_| {
                let _ = tracked_clone.get();
                let _ = tracker_clone.nonreactive(|| hidden_clone.get());
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            })
            .expect("autorun");

        hidden.set(1);
        assert!(!tracker.needs_flush());
        tracked.set(1);
        tracker.flush().expect("flush");
        assert_eq!(runs.get(), 2);
        assert_eq!(tracker.stats().isolation_violations, 0);
    }

    #[test]
    fn escaped_read_is_reported() {
        let tracker = Tracker::new();
        let hidden = Dependency::new();

        let tracker_clone = tracker.clone();
        let hidden_clone = hidden.clone();
        let _c = tracker
            .autorun(move |c| {
                let c = c.clone();
                tracker_clone.nonreactive(|| c.run_captured(|| hidden_clone.depend()));
                Ok(())
            })
            .expect("autorun");
        assert_eq!(tracker.stats().isolation_violations, 1);
    }

    #[test]
    #[should_panic(expected = "escaped a nonreactive scope")]
    fn escaped_read_panics_under_strict_policy() {
        let tracker = Tracker::with_config(
            TrackerConfig::default().with_isolation_violations(ViolationPolicy::Panic),
        );
        let hidden = Dependency::new();
        let tracker_clone = tracker.clone();
        let _ = tracker.autorun(move |c| {
            let c = c.clone();
            tracker_clone.nonreactive(|| c.run_captured(|| hidden.depend()));
            Ok(())
        });
    }

    #[test]
    fn flush_inside_computation_is_rejected() {
        let tracker = Tracker::new();
        let tracker_clone = tracker.clone();
        let result = Rc::new(RefCell::new(None));
        let result_clone = Rc::clone(&result);
        let c = tracker
            .autorun(move |_| {
                *result_clone.borrow_mut() = Some(tracker_clone.flush());
                Ok(())
            })
            .expect("autorun");
        assert_eq!(
            result.borrow_mut().take(),
            Some(Err(ReactiveError::FlushInsideComputation(c.id())))
        );
    }

    #[test]
    fn reentrant_flush_is_rejected() {
        let tracker = Tracker::new();
        let tracker_clone = tracker.clone();
        let result = Rc::new(RefCell::new(None));
        let result_clone = Rc::clone(&result);
        tracker.after_flush(move || {
            *result_clone.borrow_mut() = Some(tracker_clone.flush());
        });
        tracker.flush().expect("flush");
        assert_eq!(
            result.borrow_mut().take(),
            Some(Err(ReactiveError::ReentrantFlush))
        );
    }

    #[test]
    fn after_flush_runs_once_queue_is_empty() {
        let tracker = Tracker::new();
        let source = Observable::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        let source_clone = source.clone();
        let order_clone = Rc::clone(&order);
        let _c = tracker
            .autorun(move |c| {
                let _ = source_clone.get();
                if !c.first_run() {
                    order_clone.borrow_mut().push("rerun");
                }
                Ok(())
            })
            .expect("autorun");

        let order_clone = Rc::clone(&order);
        tracker.after_flush(move || order_clone.borrow_mut().push("after"));
        source.set(1);
        let report = tracker.flush().expect("flush");
        assert_eq!(*order.borrow(), vec!["rerun", "after"]);
        assert_eq!(report.passes, 2);
    }

    #[test]
    fn self_invalidating_loop_hits_flush_limit() {
        let tracker =
            Tracker::with_config(TrackerConfig::default().with_max_flush_passes(5));
        let source = Observable::new(0u64);
        let source_clone = source.clone();
        let _c = tracker
            .autorun(move |_| {
                let v = source_clone.get();
                source_clone.set(v + 1);
                Ok(())
            })
            .expect("autorun");
        assert_eq!(
            tracker.flush(),
            Err(ReactiveError::FlushLimit { limit: 5 })
        );
        assert!(tracker.needs_flush(), "remainder stays queued");
    }

    #[test]
    fn on_invalidate_fires_immediately_when_already_invalid() {
        let tracker = Tracker::new();
        let c = tracker.autorun(|_| Ok(())).expect("autorun");
        c.invalidate();
        let (fired, fired_clone) = counter();
        c.on_invalidate(move || fired_clone.set(1));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn current_reports_capturing_computation() {
        let tracker = Tracker::new();
        assert!(!tracker.is_active());
        let tracker_clone = tracker.clone();
        let seen = Rc::new(Cell::new(None));
        let seen_clone = Rc::clone(&seen);
        let c = tracker
            .autorun(move |_| {
                seen_clone.set(tracker_clone.current().map(|c| c.id()));
                assert!(tracker_clone.nonreactive(|| !tracker_clone.is_active()));
                Ok(())
            })
            .expect("autorun");
        assert_eq!(seen.get(), Some(c.id()));
    }
}
