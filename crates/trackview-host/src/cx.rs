#![forbid(unsafe_code)]

//! Per-render hook context.
//!
//! Hooks are addressed by call order. The first successful render of an
//! instance fixes the sequence; later renders must call the same kinds of
//! hook in the same order, or the render fails with
//! [`HostError::HookOrderMismatch`].

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use trackview_core::{Deps, deps_equal};

use crate::error::{HookKind, HostError};
use crate::host::{Host, InstanceKey, Updater};

/// Teardown returned by an effect body.
///
/// Runs before the effect runs again and when the instance unmounts.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce()>>);

impl Cleanup {
    /// Run `f` on cleanup.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A cleanup that does nothing.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Returns `true` if there was something to run.
    pub(crate) fn run(self) -> bool {
        match self.0 {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cleanup").field(&self.0.is_some()).finish()
    }
}

pub(crate) struct EffectHook {
    /// Deps of the last committed run.
    pub(crate) deps: Option<Deps>,
    pub(crate) cleanup: Cleanup,
    pub(crate) ran: bool,
}

pub(crate) enum Hook {
    Slot(Rc<dyn Any>),
    Effect(EffectHook),
}

impl Hook {
    pub(crate) fn kind(&self) -> HookKind {
        match self {
            Self::Slot(_) => HookKind::Slot,
            Self::Effect(_) => HookKind::Effect,
        }
    }
}

/// An effect collected by a render, run only if that render commits.
pub(crate) struct PendingEffect {
    pub(crate) index: usize,
    pub(crate) deps: Option<Deps>,
    pub(crate) create: Box<dyn FnOnce() -> Cleanup>,
}

impl fmt::Debug for PendingEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEffect")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Context handed to a render function.
pub struct RenderCx<'a> {
    key: InstanceKey,
    host: &'a Host,
    hooks: &'a mut Vec<Hook>,
    cursor: usize,
    initializing: bool,
    effects: Vec<PendingEffect>,
}

impl<'a> RenderCx<'a> {
    pub(crate) fn new(
        key: InstanceKey,
        host: &'a Host,
        hooks: &'a mut Vec<Hook>,
        initializing: bool,
    ) -> Self {
        Self {
            key,
            host,
            hooks,
            cursor: 0,
            initializing,
            effects: Vec::new(),
        }
    }

    /// The instance being rendered.
    #[must_use]
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    /// A context value provided on the host, if any.
    #[must_use]
    pub fn context<T: Any>(&self) -> Option<Rc<T>> {
        self.host.context::<T>()
    }

    /// Forced-update handle for this instance.
    #[must_use]
    pub fn updater(&self) -> Updater {
        self.host.updater(self.key)
    }

    /// Persistent per-call-site value, created by `init` on first use.
    ///
    /// The same `Rc` comes back on every render until the instance
    /// unmounts. Use interior mutability to change it.
    ///
    /// # Errors
    ///
    /// Fails if the hook sequence changed or the slot holds another type.
    pub fn use_slot<S: Any>(&mut self, init: impl FnOnce() -> S) -> Result<Rc<S>, HostError> {
        let index = self.advance(HookKind::Slot)?;
        if index == self.hooks.len() {
            self.hooks.push(Hook::Slot(Rc::new(init())));
        }
        let Hook::Slot(value) = &self.hooks[index] else {
            return Err(self.mismatch(index, HookKind::Slot));
        };
        Rc::clone(value)
            .downcast::<S>()
            .map_err(|_| HostError::SlotTypeMismatch {
                key: self.key,
                index,
            })
    }

    /// Run `create` after commit.
    ///
    /// With `Some(deps)` the effect runs on the first commit and on every
    /// commit whose deps differ from the last run's (see
    /// [`deps_equal`]). With `None` it runs on every commit. Before
    /// running again, and on unmount, the previous [`Cleanup`] runs.
    ///
    /// # Errors
    ///
    /// Fails if the hook sequence changed.
    pub fn use_effect(
        &mut self,
        deps: Option<Deps>,
        create: impl FnOnce() -> Cleanup + 'static,
    ) -> Result<(), HostError> {
        let index = self.advance(HookKind::Effect)?;
        if index == self.hooks.len() {
            self.hooks.push(Hook::Effect(EffectHook {
                deps: None,
                cleanup: Cleanup::none(),
                ran: false,
            }));
        }
        let Hook::Effect(hook) = &self.hooks[index] else {
            return Err(self.mismatch(index, HookKind::Effect));
        };
        if hook.ran && deps_equal(deps.as_ref(), hook.deps.as_ref()) {
            return Ok(());
        }
        self.effects.push(PendingEffect {
            index,
            deps,
            create: Box::new(create),
        });
        Ok(())
    }

    fn advance(&mut self, kind: HookKind) -> Result<usize, HostError> {
        let index = self.cursor;
        match self.hooks.get(index) {
            Some(hook) if hook.kind() != kind => {
                return Err(HostError::HookOrderMismatch {
                    key: self.key,
                    index,
                    expected: hook.kind(),
                    found: kind,
                });
            }
            Some(_) => {}
            None if !self.initializing => {
                return Err(HostError::HookOrderMismatch {
                    key: self.key,
                    index,
                    expected: HookKind::Missing,
                    found: kind,
                });
            }
            None => {}
        }
        self.cursor += 1;
        Ok(index)
    }

    fn mismatch(&self, index: usize, found: HookKind) -> HostError {
        HostError::HookOrderMismatch {
            key: self.key,
            index,
            expected: self.hooks.get(index).map_or(HookKind::Missing, Hook::kind),
            found,
        }
    }

    /// Check the hook count and hand back the collected effects.
    pub(crate) fn finish(self) -> Result<Vec<PendingEffect>, HostError> {
        if !self.initializing && self.cursor < self.hooks.len() {
            return Err(HostError::HookOrderMismatch {
                key: self.key,
                index: self.cursor,
                expected: self.hooks[self.cursor].kind(),
                found: HookKind::Missing,
            });
        }
        Ok(self.effects)
    }
}

impl fmt::Debug for RenderCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCx")
            .field("key", &self.key)
            .field("cursor", &self.cursor)
            .field("initializing", &self.initializing)
            .field("pending_effects", &self.effects.len())
            .finish()
    }
}
