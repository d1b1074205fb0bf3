//! Host capabilities, resolved once per session.
//!
//! Each capability is an explicit optional with a documented fallback, so the
//! detectors branch on presence instead of probing the host repeatedly:
//!
//! | capability | fallback when absent |
//! |------------|----------------------|
//! | rendering backend | fingerprint with confidence 20 and `no-rendering-context` |
//! | trap host (decoy mounting) | hidden-field and invisible-link decoys are not mounted |
//! | clock | monotonic wall clock starting at session creation |
//! | benchmark clock | the session clock |

use crate::clock::{Clock, MonotonicClock};
use crate::detectors::RenderBackend;
use crate::traps::TrapHost;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Coarse environment descriptors used for fingerprinting and challenges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentDescriptor {
    pub locale: Option<String>,
    pub logical_cores: Option<u32>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

impl EnvironmentDescriptor {
    /// Stable textual summary; absent values render as `?`.
    pub fn summary(&self) -> String {
        fn or_unknown<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
        }

        format!(
            "{}|{}|{}x{}",
            or_unknown(&self.locale),
            or_unknown(&self.logical_cores),
            or_unknown(&self.screen_width),
            or_unknown(&self.screen_height)
        )
    }
}

/// Everything the Shield takes from its host.
pub struct Environment {
    pub descriptor: EnvironmentDescriptor,
    pub render: Option<Arc<dyn RenderBackend>>,
    pub host: Option<Box<dyn TrapHost>>,
    pub clock: Arc<dyn Clock>,
    pub benchmark_clock: Option<Arc<dyn Clock>>,
}

impl Environment {
    /// No host capabilities; every signal falls back to its neutral default.
    pub fn headless() -> Self {
        Self {
            descriptor: EnvironmentDescriptor::default(),
            render: None,
            host: None,
            clock: Arc::new(MonotonicClock::new()),
            benchmark_clock: None,
        }
    }

    pub fn with_descriptor(mut self, descriptor: EnvironmentDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_render_backend(mut self, backend: Arc<dyn RenderBackend>) -> Self {
        self.render = Some(backend);
        self
    }

    pub fn with_trap_host(mut self, host: Box<dyn TrapHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Time the rendering benchmark with a separate clock.
    pub fn with_benchmark_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.benchmark_clock = Some(clock);
        self
    }

    /// Presence flags for logging and diagnostics.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            rendering: self.render.is_some(),
            trap_host: self.host.is_some(),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::headless()
    }
}

/// Which optional host capabilities were provided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub rendering: bool,
    pub trap_host: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let descriptor = EnvironmentDescriptor {
            locale: Some("en-US".to_string()),
            logical_cores: Some(8),
            screen_width: Some(2560),
            screen_height: Some(1440),
        };
        assert_eq!(descriptor.summary(), "en-US|8|2560x1440");
        assert_eq!(EnvironmentDescriptor::default().summary(), "?|?|?x?");
    }

    #[test]
    fn test_headless_capabilities() {
        let env = Environment::headless();
        assert_eq!(env.capabilities(), Capabilities::default());
    }

    #[test]
    fn test_descriptor_wire_names() {
        let json = r#"{"locale": "de-DE", "logicalCores": 4, "screenWidth": 1920}"#;
        let descriptor: EnvironmentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.logical_cores, Some(4));
        assert_eq!(descriptor.screen_height, None);
    }
}
