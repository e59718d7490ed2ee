#![forbid(unsafe_code)]

//! Binding configuration.
//!
//! | Variable | Effect |
//! |---|---|
//! | `TRACKVIEW_MODE` | `live` (default) or `static` |
//! | `TRACKVIEW_CONSISTENCY_CHECK` | `1`/`true` re-evaluates cached results and warns on mismatch |

use std::env;

/// How bindings obtain their values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingMode {
    /// Cache per call site and keep a live computation while mounted.
    #[default]
    Live,
    /// Call the producer on every render; never cache, never subscribe.
    /// For one-shot renders such as snapshots.
    Static,
}

impl BindingMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Some(Self::Live),
            "static" => Some(Self::Static),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingConfig {
    pub mode: BindingMode,
    /// Re-run the producer after a cached read and warn if it disagrees.
    /// Only honored by [`use_tracker_checked`](crate::use_tracker_checked).
    pub consistency_check: bool,
}

impl BindingConfig {
    #[must_use]
    pub fn with_mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_consistency_check(mut self, enabled: bool) -> Self {
        self.consistency_check = enabled;
        self
    }

    /// Defaults overridden by `TRACKVIEW_*` environment variables.
    ///
    /// Nothing else reads the environment; `Default` never does.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var("TRACKVIEW_MODE")
            && let Some(mode) = BindingMode::parse(&val)
        {
            config.mode = mode;
        }
        if let Ok(val) = env::var("TRACKVIEW_CONSISTENCY_CHECK") {
            config.consistency_check = val == "1" || val.eq_ignore_ascii_case("true");
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_live_and_unchecked() {
        let config = BindingConfig::default();
        assert_eq!(config.mode, BindingMode::Live);
        assert!(!config.consistency_check);
    }

    #[test]
    fn mode_parse() {
        assert_eq!(BindingMode::parse("Static"), Some(BindingMode::Static));
        assert_eq!(BindingMode::parse(" live "), Some(BindingMode::Live));
        assert_eq!(BindingMode::parse("server"), None);
    }

    #[test]
    fn builders() {
        let config = BindingConfig::default()
            .with_mode(BindingMode::Static)
            .with_consistency_check(true);
        assert_eq!(config.mode, BindingMode::Static);
        assert!(config.consistency_check);
    }
}
