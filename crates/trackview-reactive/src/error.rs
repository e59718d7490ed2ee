#![forbid(unsafe_code)]

//! Errors raised by reactive functions and by the flush scheduler.

use thiserror::Error;

use crate::reactive::ComputationId;

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("reactive function failed: {message}")]
    Failed { message: String },

    #[error("flush requested while the tracker is already flushing")]
    ReentrantFlush,

    #[error("flush requested from inside computation {0}")]
    FlushInsideComputation(ComputationId),

    #[error("flush did not settle within {limit} passes")]
    FlushLimit { limit: usize },
}

impl ReactiveError {
    /// Failure raised by a user-supplied reactive function.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
