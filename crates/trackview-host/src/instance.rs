#![forbid(unsafe_code)]

//! Component instances and the render/commit state machine.
//!
//! ```text
//!   Idle ──render──▶ Computing ──commit──▶ Committed
//!                     ▲     │                 │
//!                     └─────┘ render again    │ render
//!                     ◀───────────────────────┘
//! ```
//!
//! Renders are speculative: only the latest uncommitted render's effects
//! survive, and they run only when that render is committed.

use std::fmt;

use crate::cx::{Hook, PendingEffect, RenderCx};
use crate::error::HostError;
use crate::host::{Host, InstanceKey};

type RenderFn<P, V> = Box<dyn FnMut(&mut RenderCx<'_>, &P) -> Result<V, HostError>>;

/// Render state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Nothing rendered and nothing committed.
    Idle,
    /// A render finished and awaits commit.
    Computing,
    /// The latest render has been committed.
    Committed,
}

struct WorkInProgress<V> {
    output: V,
    effects: Vec<PendingEffect>,
}

/// One mounted component.
pub struct Instance<P, V> {
    key: InstanceKey,
    host: Host,
    render: RenderFn<P, V>,
    hooks: Vec<Hook>,
    hooks_ready: bool,
    phase: RenderPhase,
    wip: Option<WorkInProgress<V>>,
    committed: Option<V>,
    mounted: bool,
}

impl<P, V> Instance<P, V> {
    pub(crate) fn new(key: InstanceKey, host: Host, render: RenderFn<P, V>) -> Self {
        Self {
            key,
            host,
            render,
            hooks: Vec::new(),
            hooks_ready: false,
            phase: RenderPhase::Idle,
            wip: None,
            committed: None,
            mounted: true,
        }
    }

    #[must_use]
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[must_use]
    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Output of the last committed render.
    #[must_use]
    pub fn committed(&self) -> Option<&V> {
        self.committed.as_ref()
    }

    /// Whether a render is waiting for [`commit`](Self::commit).
    #[must_use]
    pub fn has_pending_commit(&self) -> bool {
        self.wip.is_some()
    }

    fn render_pass(&mut self, props: &P) -> Result<WorkInProgress<V>, HostError> {
        self.host.bump(|s| s.renders += 1);
        let mut cx = RenderCx::new(self.key, &self.host, &mut self.hooks, !self.hooks_ready);
        let output = (self.render)(&mut cx, props)?;
        let effects = cx.finish()?;
        self.hooks_ready = true;
        Ok(WorkInProgress { output, effects })
    }

    /// Commit the latest render: run the cleanups of every effect that
    /// changed, in hook order, then the effect bodies in hook order.
    ///
    /// # Errors
    ///
    /// [`HostError::Unmounted`] or [`HostError::NothingToCommit`].
    pub fn commit(&mut self) -> Result<(), HostError> {
        if !self.mounted {
            return Err(HostError::Unmounted(self.key));
        }
        let Some(wip) = self.wip.take() else {
            return Err(HostError::NothingToCommit(self.key));
        };

        let mut cleanups = 0;
        for effect in &wip.effects {
            if let Some(Hook::Effect(hook)) = self.hooks.get_mut(effect.index)
                && std::mem::take(&mut hook.cleanup).run()
            {
                cleanups += 1;
            }
        }
        let mut effects_run = 0;
        for effect in wip.effects {
            let cleanup = (effect.create)();
            effects_run += 1;
            if let Some(Hook::Effect(hook)) = self.hooks.get_mut(effect.index) {
                hook.cleanup = cleanup;
                hook.deps = effect.deps;
                hook.ran = true;
            }
        }

        self.committed = Some(wip.output);
        self.phase = RenderPhase::Committed;
        self.host.bump(|s| {
            s.commits += 1;
            s.effects_run += effects_run;
            s.cleanups_run += cleanups;
        });
        tracing::trace!(
            message = "host.commit",
            instance = self.key.get(),
            effects = effects_run,
            cleanups
        );
        Ok(())
    }

    /// Run every remaining cleanup in hook order and detach from the host.
    ///
    /// Idempotent. Also runs on drop.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.wip = None;
        let mut cleanups = 0;
        for hook in &mut self.hooks {
            if let Hook::Effect(effect) = hook
                && std::mem::take(&mut effect.cleanup).run()
            {
                cleanups += 1;
            }
        }
        self.hooks.clear();
        self.phase = RenderPhase::Idle;
        self.host.retire(self.key);
        self.host.bump(|s| s.cleanups_run += cleanups);
        tracing::debug!(message = "host.unmount", instance = self.key.get(), cleanups);
    }
}

impl<P, V: Clone> Instance<P, V> {
    /// Render with `props` without committing.
    ///
    /// Replaces any earlier uncommitted render. When
    /// [`HostConfig::double_render`](crate::HostConfig) is set, the render
    /// function runs twice and the first result is discarded.
    ///
    /// # Errors
    ///
    /// [`HostError::Unmounted`], hook sequence errors, or whatever the
    /// render function returns. A failed render leaves nothing to commit.
    pub fn render(&mut self, props: &P) -> Result<V, HostError> {
        if !self.mounted {
            return Err(HostError::Unmounted(self.key));
        }
        self.wip = None;
        self.phase = RenderPhase::Computing;
        let passes = if self.host.config().double_render { 2 } else { 1 };
        let mut result = None;
        for _ in 0..passes {
            match self.render_pass(props) {
                Ok(wip) => result = Some(wip),
                Err(err) => {
                    self.phase = if self.committed.is_some() {
                        RenderPhase::Committed
                    } else {
                        RenderPhase::Idle
                    };
                    tracing::debug!(
                        message = "host.render_failed",
                        instance = self.key.get(),
                        error = %err
                    );
                    return Err(err);
                }
            }
        }
        let Some(wip) = result else {
            return Err(HostError::NothingToCommit(self.key));
        };
        let output = wip.output.clone();
        self.wip = Some(wip);
        Ok(output)
    }

    /// [`render`](Self::render) then [`commit`](Self::commit).
    ///
    /// # Errors
    ///
    /// Either step's error.
    pub fn render_and_commit(&mut self, props: &P) -> Result<V, HostError> {
        let output = self.render(props)?;
        self.commit()?;
        Ok(output)
    }
}

impl<P, V> Drop for Instance<P, V> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<P, V: fmt::Debug> fmt::Debug for Instance<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("key", &self.key)
            .field("phase", &self.phase)
            .field("hooks", &self.hooks.len())
            .field("committed", &self.committed)
            .field("mounted", &self.mounted)
            .finish()
    }
}
