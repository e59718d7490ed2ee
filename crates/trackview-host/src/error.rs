#![forbid(unsafe_code)]

//! Host errors.

use std::fmt;

use thiserror::Error;

use crate::host::InstanceKey;

pub type Result<T> = std::result::Result<T, HostError>;

/// Kind of hook found at a call-order position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Slot,
    Effect,
    /// No hook at this position.
    Missing,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Slot => "slot",
            Self::Effect => "effect",
            Self::Missing => "nothing",
        })
    }
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("instance {0} is unmounted")]
    Unmounted(InstanceKey),

    #[error("instance {0} has no rendered output to commit")]
    NothingToCommit(InstanceKey),

    #[error("hook {index} of instance {key} changed between renders: expected {expected}, found {found}")]
    HookOrderMismatch {
        key: InstanceKey,
        index: usize,
        expected: HookKind,
        found: HookKind,
    },

    #[error("slot {index} of instance {key} holds a value of another type")]
    SlotTypeMismatch { key: InstanceKey, index: usize },

    #[error("{0}")]
    Component(#[source] Box<dyn std::error::Error + 'static>),
}

impl HostError {
    /// Wrap an error raised by a component's render function.
    #[must_use]
    pub fn component(err: impl std::error::Error + 'static) -> Self {
        Self::Component(Box::new(err))
    }
}
