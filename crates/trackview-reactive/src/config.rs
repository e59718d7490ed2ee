#![forbid(unsafe_code)]

//! Tracker configuration.
//!
//! Defaults can be overridden from the environment via [`TrackerConfig::from_env`]:
//!
//! | Variable | Effect |
//! |---|---|
//! | `TRACKVIEW_MAX_FLUSH_PASSES` | Upper bound on drain passes per flush |
//! | `TRACKVIEW_RERUN_ERRORS` | `keep-alive` or `stop` |
//! | `TRACKVIEW_STRICT_ISOLATION` | `1`/`true` panics on isolation violations |

use std::env;

/// What happens to a live computation whose rerun fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RerunErrorPolicy {
    /// Log the failure and keep the computation; it reruns on the next
    /// invalidation of anything it read before failing.
    #[default]
    KeepAlive,
    /// Stop the computation.
    Stop,
}

impl RerunErrorPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep-alive" | "keepalive" | "keep" => Some(Self::KeepAlive),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// What happens when a read escapes a [`nonreactive`](crate::Tracker::nonreactive)
/// scope into the enclosing computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// Emit an `error` event and count the violation.
    #[default]
    Log,
    /// Emit the event, then panic.
    Panic,
}

/// Tracker tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Maximum number of drain passes a single flush may take before it
    /// gives up with [`ReactiveError::FlushLimit`](crate::ReactiveError::FlushLimit).
    pub max_flush_passes: usize,
    /// Rerun failure handling.
    pub rerun_errors: RerunErrorPolicy,
    /// Isolation violation handling.
    pub isolation_violations: ViolationPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: 100,
            rerun_errors: RerunErrorPolicy::KeepAlive,
            isolation_violations: ViolationPolicy::Log,
        }
    }
}

impl TrackerConfig {
    /// Set the flush pass bound (clamped to at least 1).
    #[must_use]
    pub fn with_max_flush_passes(mut self, passes: usize) -> Self {
        self.max_flush_passes = passes.max(1);
        self
    }

    /// Set the rerun failure policy.
    #[must_use]
    pub fn with_rerun_errors(mut self, policy: RerunErrorPolicy) -> Self {
        self.rerun_errors = policy;
        self
    }

    /// Set the isolation violation policy.
    #[must_use]
    pub fn with_isolation_violations(mut self, policy: ViolationPolicy) -> Self {
        self.isolation_violations = policy;
        self
    }

    /// Defaults overridden by `TRACKVIEW_*` environment variables.
    ///
    /// Unparseable values are ignored.
    ///
    /// Nothing else reads the environment; `Default` never does.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var("TRACKVIEW_MAX_FLUSH_PASSES")
            && let Ok(n) = val.parse::<usize>()
        {
            config = config.with_max_flush_passes(n);
        }
        if let Ok(val) = env::var("TRACKVIEW_RERUN_ERRORS")
            && let Some(policy) = RerunErrorPolicy::parse(&val)
        {
            config.rerun_errors = policy;
        }
        if let Ok(val) = env::var("TRACKVIEW_STRICT_ISOLATION") {
            let strict = val == "1" || val.eq_ignore_ascii_case("true");
            config.isolation_violations = if strict {
                ViolationPolicy::Panic
            } else {
                ViolationPolicy::Log
            };
        }
        config
    }
}
