#![forbid(unsafe_code)]

//! Thread-local capture frames.

use std::cell::RefCell;
use std::rc::Rc;

use super::computation::ComputationInner;

pub(crate) enum Frame {
    /// Reads register on this computation.
    Capture(Rc<ComputationInner>),
    /// Reads register on a read set that never reruns.
    Record(Rc<ComputationInner>),
    /// Reads register nowhere.
    Isolated,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops its frame on drop, including during unwinding.
pub(crate) struct FrameGuard {
    _private: (),
}

impl FrameGuard {
    pub(crate) fn push(frame: Frame) -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(frame));
        Self { _private: () }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        // Dropped outside the borrow: releasing the last handle of a
        // computation may run callbacks that push frames of their own.
        let frame = FRAMES.with(|frames| frames.borrow_mut().pop());
        drop(frame);
    }
}

/// The computation reads currently register on, if any.
///
/// A read set being recorded is not a computation and is never returned.
pub(crate) fn current() -> Option<Rc<ComputationInner>> {
    FRAMES.with(|frames| match frames.borrow().last() {
        Some(Frame::Capture(inner)) => Some(Rc::clone(inner)),
        _ => None,
    })
}

/// Where a read registers: the capturing computation or a recording read set.
pub(crate) fn target() -> Option<Rc<ComputationInner>> {
    FRAMES.with(|frames| match frames.borrow().last() {
        Some(Frame::Capture(inner) | Frame::Record(inner)) => Some(Rc::clone(inner)),
        _ => None,
    })
}
