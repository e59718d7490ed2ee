#![forbid(unsafe_code)]

//! Invalidation edges.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::capture;
use super::computation::{ComputationId, ComputationInner};

#[derive(Default)]
pub(crate) struct DependencyInner {
    dependents: RefCell<Vec<(ComputationId, Weak<ComputationInner>)>>,
}

impl DependencyInner {
    pub(crate) fn remove(&self, id: ComputationId) {
        self.dependents.borrow_mut().retain(|(dep_id, _)| *dep_id != id);
    }
}

/// A data source's set of dependent computations.
///
/// Call [`depend`](Self::depend) when the data is read and
/// [`changed`](Self::changed) when it is written. Cloning shares the set.
#[derive(Clone, Default)]
pub struct Dependency {
    inner: Rc<DependencyInner>,
}

impl Dependency {
    /// Create a dependency with no dependents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the capturing computation, if any, as a dependent.
    ///
    /// Returns `true` if a new dependent was registered.
    pub fn depend(&self) -> bool {
        let Some(computation) = capture::target() else {
            return false;
        };
        if computation.is_stopped() {
            return false;
        }
        {
            let mut dependents = self.inner.dependents.borrow_mut();
            if dependents.iter().any(|(id, _)| *id == computation.id) {
                return false;
            }
            dependents.push((computation.id, Rc::downgrade(&computation)));
        }
        computation.record_source(Rc::downgrade(&self.inner));
        true
    }

    /// Invalidate every dependent computation.
    pub fn changed(&self) {
        let dependents = std::mem::take(&mut *self.inner.dependents.borrow_mut());
        for (_, dependent) in dependents {
            if let Some(computation) = dependent.upgrade() {
                computation.invalidate();
            }
        }
    }

    /// Whether at least one live computation depends on this source.
    #[must_use]
    pub fn has_dependents(&self) -> bool {
        self.dependent_count() > 0
    }

    /// Number of live dependent computations.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.inner
            .dependents
            .borrow()
            .iter()
            .filter(|(_, dependent)| dependent.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("dependents", &self.dependent_count())
            .finish()
    }
}
