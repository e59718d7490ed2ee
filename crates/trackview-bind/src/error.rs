#![forbid(unsafe_code)]

//! Binding errors.

use thiserror::Error;
use trackview_host::HostError;
use trackview_reactive::ReactiveError;

use crate::registry::InstanceIdentity;

pub type Result<T> = std::result::Result<T, BindError>;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("no TrackerRoot is installed on this host")]
    MissingRoot,

    /// The producer failed while computing a render-time value.
    #[error(transparent)]
    Producer(ReactiveError),

    /// The live computation failed after the last render.
    #[error("live computation for {identity} failed: {source}")]
    Rerun {
        identity: InstanceIdentity,
        source: ReactiveError,
    },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<BindError> for HostError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Host(inner) => inner,
            other => HostError::component(other),
        }
    }
}
