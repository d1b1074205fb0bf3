//! Leaf signal producers.
//!
//! Each detector owns its own state and produces an immutable result that the
//! fusion layer reads at analysis time.

pub mod hardware;
pub mod temporal;

pub use hardware::{
    HardwareFingerprint, HardwareProbe, HardwareStatus, RenderBackend, RenderContext,
    RenderLimits, TimingAnalysis,
};
pub use temporal::{
    EntropyResult, EventPayload, EventRecorder, InteractionEvent, InteractionKind, KeyPhase, Point,
};

use serde::{Deserialize, Serialize};

/// Summary statistics of a timing series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingStats {
    pub mean: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
}

impl TimingStats {
    /// Population statistics over `samples`. Non-finite samples are skipped.
    ///
    /// Computed on samples scaled by their largest magnitude, so every field
    /// stays finite for any finite input.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }

        let scale = finite.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        if scale == 0.0 {
            // Identical zero-length intervals are perfectly regular
            return Some(Self::default());
        }

        let n = finite.len() as f64;
        let scaled_mean = finite.iter().map(|x| x / scale).sum::<f64>() / n;
        let scaled_variance = finite
            .iter()
            .map(|x| (x / scale - scaled_mean).powi(2))
            .sum::<f64>()
            / n;
        let scaled_std_dev = scaled_variance.sqrt();

        let coefficient_of_variation = if scaled_mean.abs() > f64::EPSILON {
            scaled_std_dev / scaled_mean
        } else {
            0.0
        };

        let stats = Self {
            mean: scaled_mean * scale,
            std_dev: scaled_std_dev * scale,
            coefficient_of_variation,
        };
        stats.is_finite().then_some(stats)
    }

    pub fn is_finite(&self) -> bool {
        self.mean.is_finite()
            && self.std_dev.is_finite()
            && self.coefficient_of_variation.is_finite()
    }
}

/// Round and clamp a confidence value into 0-100.
pub fn clamp_confidence(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = TimingStats::from_samples(&[10.0, 20.0, 30.0]).unwrap();
        assert!((stats.mean - 20.0).abs() < 1e-9);
        assert!((stats.std_dev - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert!((stats.coefficient_of_variation - stats.std_dev / 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_stats_zero_mean() {
        let stats = TimingStats::from_samples(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(stats.coefficient_of_variation, 0.0);
    }

    #[test]
    fn test_stats_skip_non_finite() {
        assert!(TimingStats::from_samples(&[]).is_none());
        assert!(TimingStats::from_samples(&[f64::NAN]).is_none());
        let stats = TimingStats::from_samples(&[5.0, f64::INFINITY, 5.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
    }

    #[test]
    fn test_stats_huge_gaps_stay_finite() {
        let stats = TimingStats::from_samples(&[1e200, 3e200, 1e200, 2e200]).unwrap();
        assert!(stats.is_finite());
        assert!((stats.mean / 1.75e200 - 1.0).abs() < 1e-9);
        assert!(stats.coefficient_of_variation > 0.4 && stats.coefficient_of_variation < 0.5);

        let stats = TimingStats::from_samples(&[f64::MAX, f64::MAX, -f64::MAX]).unwrap();
        assert!(stats.is_finite());

        let json = serde_json::to_string(&stats).unwrap();
        let back: TimingStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(-12.0), 0);
        assert_eq!(clamp_confidence(110.0), 100);
        assert_eq!(clamp_confidence(49.6), 50);
        assert_eq!(clamp_confidence(f64::NAN), 0);
    }
}
