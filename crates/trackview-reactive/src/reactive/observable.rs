#![forbid(unsafe_code)]

//! Shared, version-tracked values.
//!
//! # Design
//!
//! [`Observable<T>`] wraps a value in `Rc<RefCell<..>>` together with a
//! [`Dependency`]. Reading through [`get`](Observable::get) or
//! [`with`](Observable::with) registers the capturing computation;
//! writing through [`set`](Observable::set) notifies subscriber callbacks
//! and invalidates every dependent computation.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op.
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//!
//! # Failure Modes
//!
//! - **Subscriber writes the same observable**: allowed; callbacks receive
//!   a snapshot, so the nested write starts a fresh notification cycle.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::dependency::Dependency;

type Callback<T> = dyn Fn(&T);

struct ObservableInner<T> {
    value: T,
    version: u64,
    /// Held weakly; the strong side lives in the [`Subscription`].
    subscribers: Vec<Weak<Callback<T>>>,
}

/// A shared value whose reads are tracked and whose writes invalidate.
///
/// Cloning an `Observable` creates a new handle to the **same** value.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
    dependency: Dependency,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            dependency: self.dependency.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("dependents", &self.dependency.dependent_count())
            .finish()
    }
}

/// RAII guard for an [`Observable::subscribe`] callback.
///
/// Dropping it unsubscribes.
pub struct Subscription {
    _callback: Box<dyn Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Wrap `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
            dependency: Dependency::new(),
        }
    }

    /// Current value, registering the capturing computation as a dependent.
    #[must_use]
    pub fn get(&self) -> T {
        self.dependency.depend();
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value, registering the capturing computation.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.dependency.depend();
        f(&self.inner.borrow().value)
    }

    /// Current value without registering any dependency.
    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Replace the value.
    ///
    /// If it differs from the current one: bump the version, notify
    /// subscribers in registration order, then invalidate dependents.
    pub fn set(&self, value: T) {
        let (snapshot, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version += 1;
            inner.subscribers.retain(|sub| sub.strong_count() > 0);
            let callbacks: Vec<_> = inner.subscribers.iter().filter_map(Weak::upgrade).collect();
            (inner.value.clone(), callbacks)
        };
        for callback in callbacks {
            callback(&snapshot);
        }
        self.dependency.changed();
    }

    /// Modify the value in place; same notification rules as [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get_untracked();
        f(&mut next);
        self.set(next);
    }

    /// Number of effective mutations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Call `callback` with the new value after every effective mutation.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let callback: Rc<Callback<T>> = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&callback));
        Subscription {
            _callback: Box::new(callback),
        }
    }

    /// The invalidation edge behind this value.
    #[must_use]
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }
}
