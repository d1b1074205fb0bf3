//! Configuration types for the Shield.
//!
//! Every section defaults to the calibrated values, so an empty document is a
//! valid configuration.

use crate::error::ShieldError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a Shield session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    /// Category weights for the overall score
    pub weights: FusionWeights,

    /// Overall score thresholds for each verdict
    pub thresholds: VerdictThresholds,

    /// Temporal entropy analysis settings
    pub entropy: EntropyConfig,

    /// Rendering benchmark settings
    pub hardware: HardwareConfig,

    /// Honeypot trap settings
    pub traps: TrapConfig,

    /// Behavioral score adjustments
    pub behavior: BehaviorConfig,

    /// Synchronous fast-path settings
    pub quick_check: QuickCheckConfig,
}

impl ShieldConfig {
    /// Load configuration from a JSON or YAML file, chosen by extension.
    pub fn from_path(path: &Path) -> Result<Self, ShieldError> {
        let content = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(serde_json::from_str(&content)?)
        }
    }
}

/// Weights for each category in the overall score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub temporal: f64,
    pub hardware: f64,
    pub behavioral: f64,
    pub honeypot: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            temporal: 0.25,
            hardware: 0.20,
            behavioral: 0.25,
            honeypot: 0.30,
        }
    }
}

/// Overall score thresholds (0-100).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictThresholds {
    /// At or above: human
    pub human: f64,
    /// At or above (and below `human`): suspicious
    pub suspicious: f64,
    /// At or above (and below `suspicious`): bot; below: unknown
    pub bot: f64,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            human: 70.0,
            suspicious: 45.0,
            bot: 30.0,
        }
    }
}

/// Temporal entropy analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    /// Ring buffer capacity (events)
    pub buffer_capacity: usize,

    /// Minimum events before any confidence is reported
    pub min_samples: usize,

    /// Histogram bucket width for inter-arrival deltas (ms)
    pub bucket_ms: f64,

    /// Deltas beyond this many buckets share the last bucket
    pub max_buckets: usize,

    /// CV below this is mechanically uniform timing
    pub uniform_cv: f64,

    /// CV above this is noise rather than human rhythm
    pub noise_cv: f64,

    /// Delta count at which confidence stops growing
    pub saturation_samples: usize,

    /// Entropy (bits) below which a long series is flagged
    pub low_entropy_bits: f64,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 500,
            min_samples: 3,
            bucket_ms: 5.0,
            max_buckets: 200,
            uniform_cv: 0.05,
            noise_cv: 2.0,
            saturation_samples: 20,
            low_entropy_bits: 0.5,
        }
    }
}

/// Rendering benchmark settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Number of timed batches
    pub batches: usize,

    /// Rendering operations per batch
    pub iterations_per_batch: usize,

    /// Timing CV below this is characteristic of emulated backends
    pub uniform_cv: f64,

    /// Mean per-iteration duration above this is slow rendering (ms)
    pub slow_iteration_ms: f64,

    /// Mean per-iteration duration below this means calls are not executing (ms)
    pub fast_iteration_ms: f64,

    /// Confidence reported when no rendering context is available
    pub no_context_confidence: u8,

    /// Extra software renderer signatures (case-insensitive substrings)
    pub software_signatures: Vec<String>,

    /// Extra virtualization signatures (case-insensitive substrings)
    pub vm_signatures: Vec<String>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            batches: 5,
            iterations_per_batch: 100,
            uniform_cv: 0.005,
            slow_iteration_ms: 5.0,
            fast_iteration_ms: 0.01,
            no_context_confidence: 20,
            software_signatures: vec![],
            vm_signatures: vec![],
        }
    }
}

/// Honeypot trap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    /// Minimum plausible time from page load to first interaction (ms)
    pub interaction_floor_ms: f64,

    /// Minimum plausible time between navigation steps (ms)
    pub min_step_interval_ms: f64,

    /// Navigation steps kept for sequence matching
    pub sequence_history: usize,

    /// Step transitions no human can produce through the UI
    pub impossible_sequences: Vec<Vec<String>>,

    /// Pointer movement below this distance is jitter (px)
    pub min_movement_px: f64,

    /// Clicks where both coordinates are multiples of this are suspicious
    pub round_coordinate_modulus: u32,

    /// Distance from a target's center still counted as "exact" (px)
    pub center_tolerance_px: f64,

    /// Aggregate honeypot confidence at which the session is a bot
    pub bot_threshold: u8,

    /// Name of the off-screen decoy form field
    pub hidden_field_name: String,

    /// Autocomplete hint used to bait form fillers
    pub hidden_field_autocomplete: String,

    /// Path prefix of the invisible-link endpoint
    pub link_path_prefix: String,

    /// Secret for JS-execution challenge keys
    pub challenge_secret: String,

    /// Challenge validity in seconds
    pub challenge_validity_seconds: u64,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            interaction_floor_ms: 500.0,
            min_step_interval_ms: 50.0,
            sequence_history: 20,
            impossible_sequences: vec![vec!["catalog".to_string(), "playback".to_string()]],
            min_movement_px: 3.0,
            round_coordinate_modulus: 100,
            center_tolerance_px: 0.0,
            bot_threshold: 50,
            hidden_field_name: "contact_email_confirm".to_string(),
            hidden_field_autocomplete: "email".to_string(),
            link_path_prefix: "/_shield/t/".to_string(),
            challenge_secret: "change-me-in-production".to_string(),
            challenge_validity_seconds: 300,
        }
    }
}

/// Behavioral category score adjustments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Movements at which the strong bonus applies
    pub strong_movement_count: u32,
    pub strong_movement_bonus: f64,

    /// Movements at which the weak bonus applies
    pub weak_movement_count: u32,
    pub weak_movement_bonus: f64,

    /// Events recorded without any pointer movement before penalizing
    pub no_movement_min_events: usize,
    pub no_movement_penalty: f64,

    /// Penalty per timing trap violation
    pub timing_violation_penalty: f64,

    /// Penalty per sequence trap violation
    pub sequence_violation_penalty: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            strong_movement_count: 20,
            strong_movement_bonus: 30.0,
            weak_movement_count: 5,
            weak_movement_bonus: 15.0,
            no_movement_min_events: 10,
            no_movement_penalty: 20.0,
            timing_violation_penalty: 25.0,
            sequence_violation_penalty: 25.0,
        }
    }
}

/// Synchronous fast-path settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickCheckConfig {
    /// Blend score at or above which the session passes as human
    pub threshold: u8,

    /// Confidence reported when a trap has fired
    pub bot_confidence: u8,

    /// Points for any pointer movement
    pub movement_points: u8,

    /// Points for a saturated event count
    pub event_points: u8,

    /// Events needed for full event points
    pub event_saturation: usize,

    /// Points for a cached real-GPU fingerprint
    pub hardware_points: u8,
}

impl Default for QuickCheckConfig {
    fn default() -> Self {
        Self {
            threshold: 60,
            bot_confidence: 90,
            movement_points: 40,
            event_points: 30,
            event_saturation: 10,
            hardware_points: 30,
        }
    }
}
