#![forbid(unsafe_code)]

//! Host configuration.

use std::env;

/// Host tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostConfig {
    /// Run every render function twice per render pass and keep only the
    /// second result. Surfaces renders that are not idempotent.
    pub double_render: bool,
}

impl HostConfig {
    /// Enable or disable double rendering.
    #[must_use]
    pub fn with_double_render(mut self, enabled: bool) -> Self {
        self.double_render = enabled;
        self
    }

    /// Defaults overridden by `TRACKVIEW_DOUBLE_RENDER` (`1`/`true`).
    ///
    /// Nothing else reads the environment; `Default` never does.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var("TRACKVIEW_DOUBLE_RENDER") {
            config.double_render = val == "1" || val.eq_ignore_ascii_case("true");
        }
        config
    }
}
