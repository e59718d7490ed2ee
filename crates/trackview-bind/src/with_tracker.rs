#![forbid(unsafe_code)]

//! Wrapping a view function with tracker data.
//!
//! [`with_tracker`] turns a view function of `(props, data)` into a render
//! function of `props`, where `data` comes from a [`TrackerSpec`] producer
//! bound through [`use_tracker`](crate::use_tracker).
//!
//! A pure spec (the default) reuses the previous output when the props are
//! equal to the last rendered props and the data has not been replaced by a
//! live rerun. An impure spec evaluates the producer and the view on every
//! render.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use trackview_core::deps;
use trackview_host::{HostError, RenderCx};
use trackview_reactive::ReactiveError;

use crate::binding::use_tracker;

type SpecProducer<P, D> = Rc<dyn Fn(&P) -> Result<D, ReactiveError>>;

/// How a wrapped view gets its data.
pub struct TrackerSpec<P, D> {
    producer: SpecProducer<P, D>,
    pure: bool,
}

impl<P, D> TrackerSpec<P, D> {
    /// A pure spec around `producer`.
    pub fn new(producer: impl Fn(&P) -> Result<D, ReactiveError> + 'static) -> Self {
        Self {
            producer: Rc::new(producer),
            pure: true,
        }
    }

    #[must_use]
    pub fn pure(mut self, pure: bool) -> Self {
        self.pure = pure;
        self
    }

    #[must_use]
    pub fn is_pure(&self) -> bool {
        self.pure
    }
}

impl<P, D, F> From<F> for TrackerSpec<P, D>
where
    F: Fn(&P) -> Result<D, ReactiveError> + 'static,
{
    fn from(producer: F) -> Self {
        Self::new(producer)
    }
}

impl<P, D> Clone for TrackerSpec<P, D> {
    fn clone(&self) -> Self {
        Self {
            producer: Rc::clone(&self.producer),
            pure: self.pure,
        }
    }
}

impl<P, D> fmt::Debug for TrackerSpec<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerSpec")
            .field("pure", &self.pure)
            .finish_non_exhaustive()
    }
}

struct Memo<P, D, V> {
    /// Bumped whenever the props change; doubles as the binding's deps.
    generation: Cell<u64>,
    props: RefCell<Option<P>>,
    data: RefCell<Option<Rc<D>>>,
    output: RefCell<Option<V>>,
}

impl<P, D, V> Memo<P, D, V> {
    fn new() -> Self {
        Self {
            generation: Cell::new(0),
            props: RefCell::new(None),
            data: RefCell::new(None),
            output: RefCell::new(None),
        }
    }
}

/// Build a render function that feeds `view` with data from `spec`.
///
/// `spec` is either a [`TrackerSpec`] or a bare producer closure, which
/// becomes a pure spec.
pub fn with_tracker<P, D, V, C>(
    spec: impl Into<TrackerSpec<P, D>>,
    mut view: C,
) -> impl FnMut(&mut RenderCx<'_>, &P) -> Result<V, HostError> + 'static
where
    P: Clone + PartialEq + 'static,
    D: 'static,
    V: Clone + 'static,
    C: FnMut(&P, &D) -> Result<V, HostError> + 'static,
{
    let spec = spec.into();
    move |cx, props| {
        if !spec.pure {
            let producer = Rc::clone(&spec.producer);
            let owned = props.clone();
            let data = use_tracker(cx, None, move || producer(&owned))?;
            return view(props, &data);
        }

        let memo = cx.use_slot(Memo::<P, D, V>::new)?;
        let same_props = memo.props.borrow().as_ref() == Some(props);
        if !same_props {
            memo.generation.set(memo.generation.get() + 1);
            *memo.props.borrow_mut() = Some(props.clone());
        }

        let producer = Rc::clone(&spec.producer);
        let owned = props.clone();
        let data = use_tracker(cx, Some(deps![memo.generation.get()]), move || {
            producer(&owned)
        })?;

        let unchanged = same_props
            && memo
                .data
                .borrow()
                .as_ref()
                .is_some_and(|previous| Rc::ptr_eq(previous, &data));
        if unchanged && let Some(output) = memo.output.borrow().clone() {
            tracing::trace!(message = "with_tracker.memo_hit", instance = cx.key().get());
            return Ok(output);
        }

        let output = view(props, &data)?;
        *memo.data.borrow_mut() = Some(data);
        *memo.output.borrow_mut() = Some(output.clone());
        Ok(output)
    }
}
