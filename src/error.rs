//! Error taxonomy for the Shield.
//!
//! None of these are fatal to the host: signal-level errors are caught where
//! they happen and turned into a neutral score plus an anomaly tag.

use thiserror::Error;

/// Errors raised inside the Shield.
#[derive(Debug, Error)]
pub enum ShieldError {
    /// A sub-probe could not execute (e.g. no rendering context).
    #[error("signal unavailable: {0}")]
    SignalUnavailable(String),

    /// Too few timing samples to say anything.
    #[error("insufficient samples: have {have}, need {need}")]
    InsufficientSamples { have: usize, need: usize },

    /// The host page could not receive a decoy element.
    #[error("trap injection failed: {0}")]
    TrapInjection(String),

    /// The rendering backend failed part-way through the benchmark.
    #[error("rendering backend error: {0}")]
    Render(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ShieldError {
    /// Anomaly tag recorded when this error degrades a signal.
    pub fn anomaly(&self) -> &'static str {
        match self {
            ShieldError::SignalUnavailable(_) => "no-rendering-context",
            ShieldError::InsufficientSamples { .. } => "insufficient-timing-data",
            ShieldError::TrapInjection(_) => "trap-injection-failed",
            ShieldError::Render(_) => "benchmark-failed",
            ShieldError::Io(_) | ShieldError::Json(_) | ShieldError::Yaml(_) => "config-error",
        }
    }
}
