#![forbid(unsafe_code)]

//! Read sets: what a function read, and whether any of it changed since.
//!
//! A [`ReadSet`] records dependencies like a computation does but has no body
//! and is never scheduled. A change to anything it recorded only marks it
//! changed. Recording is not capturing: [`Tracker::current`] and
//! [`Tracker::is_active`] report nothing while a read set records, and
//! computations started meanwhile have no parent.
//!
//! [`Tracker::current`]: crate::Tracker::current
//! [`Tracker::is_active`]: crate::Tracker::is_active

use std::fmt;
use std::rc::Rc;

use super::computation::ComputationInner;

/// Dependencies read by one call of [`Tracker::track_reads`](crate::Tracker::track_reads).
///
/// Dropping it detaches it from every dependency.
pub struct ReadSet {
    pub(crate) inner: Rc<ComputationInner>,
}

impl ReadSet {
    /// Whether a recorded dependency changed after it was read.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.inner.is_invalidated()
    }

    /// Number of dependency registrations recorded.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.inner.captures()
    }
}

impl Drop for ReadSet {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl fmt::Debug for ReadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSet")
            .field("reads", &self.reads())
            .field("changed", &self.is_changed())
            .finish()
    }
}
