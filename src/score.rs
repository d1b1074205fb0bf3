//! Verdict types and score fusion.

use crate::config::{BehaviorConfig, FusionWeights, ShieldConfig, VerdictThresholds};
use crate::detectors::{clamp_confidence, EntropyResult, HardwareFingerprint, HardwareStatus};
use crate::traps::{HoneypotState, TrapType};
use serde::{Deserialize, Serialize};

/// Score every category starts from.
pub const BASELINE: f64 = 50.0;

/// Final classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Human,
    Bot,
    Suspicious,
    #[default]
    Unknown,
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::Human => "human",
            VerdictKind::Bot => "bot",
            VerdictKind::Suspicious => "suspicious",
            VerdictKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category scores (0-100, higher is more human).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub temporal: f64,
    pub hardware: f64,
    pub behavioral: f64,
    pub honeypot: f64,
}

impl Default for CategoryScores {
    fn default() -> Self {
        Self {
            temporal: BASELINE,
            hardware: BASELINE,
            behavioral: BASELINE,
            honeypot: 100.0,
        }
    }
}

/// Full result of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_human: bool,

    /// Confidence in `verdict` (0-100)
    pub confidence: u8,

    pub verdict: VerdictKind,

    pub entropy: EntropyResult,

    /// None while the hardware probe is pending
    pub hardware: Option<HardwareFingerprint>,

    pub honeypot: HoneypotState,

    pub scores: CategoryScores,

    /// Namespaced by source: `entropy:`, `gpu:`, `behavior:`, `honeypot:`
    pub anomalies: Vec<String>,

    pub fingerprint: String,

    /// Unix milliseconds
    pub analyzed_at: u64,
}

/// Result of the synchronous fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickVerdict {
    pub is_human: bool,
    pub verdict: VerdictKind,
    pub confidence: u8,
}

/// Behavioral inputs read from the traps and the recorder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BehaviorSignals {
    pub movement_count: u32,
    pub event_count: usize,
    pub timing_violations: usize,
    pub sequence_violations: usize,
}

impl BehaviorSignals {
    pub fn new(movement_count: u32, event_count: usize, honeypot: &HoneypotState) -> Self {
        Self {
            movement_count,
            event_count,
            timing_violations: honeypot.count(TrapType::Timing),
            sequence_violations: honeypot.count(TrapType::Sequence),
        }
    }
}

/// Combines category scores with weights into a verdict.
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    pub weights: FusionWeights,
    pub thresholds: VerdictThresholds,
    pub behavior: BehaviorConfig,
}

impl ScoreCalculator {
    pub fn new(
        weights: FusionWeights,
        thresholds: VerdictThresholds,
        behavior: BehaviorConfig,
    ) -> Self {
        Self {
            weights,
            thresholds,
            behavior,
        }
    }

    pub fn from_config(config: &ShieldConfig) -> Self {
        Self::new(
            config.weights.clone(),
            config.thresholds.clone(),
            config.behavior.clone(),
        )
    }

    /// Move away from the baseline by half the entropy confidence, toward
    /// human or bot according to the classification.
    pub fn temporal(&self, entropy: &EntropyResult) -> f64 {
        let shift = f64::from(entropy.confidence) / 2.0;
        let score = if entropy.is_human {
            BASELINE + shift
        } else {
            BASELINE - shift
        };
        score.clamp(0.0, 100.0)
    }

    /// The probe's own confidence once ready; baseline while pending.
    pub fn hardware(&self, status: &HardwareStatus) -> f64 {
        match status {
            HardwareStatus::Ready(fp) => f64::from(fp.confidence),
            HardwareStatus::Pending => BASELINE,
        }
    }

    pub fn behavioral(&self, signals: &BehaviorSignals) -> f64 {
        let cfg = &self.behavior;
        let mut score = BASELINE;

        if signals.movement_count >= cfg.strong_movement_count {
            score += cfg.strong_movement_bonus;
        } else if signals.movement_count >= cfg.weak_movement_count {
            score += cfg.weak_movement_bonus;
        } else if signals.movement_count == 0 && signals.event_count >= cfg.no_movement_min_events {
            score -= cfg.no_movement_penalty;
        }

        score -= cfg.timing_violation_penalty * signals.timing_violations as f64;
        score -= cfg.sequence_violation_penalty * signals.sequence_violations as f64;

        score.clamp(0.0, 100.0)
    }

    pub fn honeypot(&self, state: &HoneypotState) -> f64 {
        (100.0 - f64::from(state.confidence)).max(0.0)
    }

    /// Weighted average of the category scores, normalized by total weight.
    pub fn overall(&self, scores: &CategoryScores) -> f64 {
        let w = &self.weights;
        let parts = [
            (scores.temporal, w.temporal),
            (scores.hardware, w.hardware),
            (scores.behavioral, w.behavioral),
            (scores.honeypot, w.honeypot),
        ];

        let mut total_weight = 0.0;
        let mut weighted = 0.0;
        for (score, weight) in parts {
            if weight > 0.0 {
                weighted += score * weight;
                total_weight += weight;
            }
        }

        if total_weight > 0.0 {
            (weighted / total_weight).clamp(0.0, 100.0)
        } else {
            BASELINE
        }
    }

    /// Threshold classification of an overall score.
    pub fn classify(&self, overall: f64) -> VerdictKind {
        let t = &self.thresholds;
        if overall >= t.human {
            VerdictKind::Human
        } else if overall >= t.suspicious {
            VerdictKind::Suspicious
        } else if overall >= t.bot {
            VerdictKind::Bot
        } else {
            VerdictKind::Unknown
        }
    }

    /// Verdict and its confidence. Any triggered trap forces `bot`.
    ///
    /// `interacted` is false when the session produced neither usable timing
    /// data nor pointer movement; such a session is never classified `human`.
    pub fn decide(
        &self,
        overall: f64,
        honeypot: &HoneypotState,
        interacted: bool,
    ) -> (VerdictKind, u8) {
        if honeypot.has_triggered() {
            let confidence = f64::from(honeypot.confidence).max(100.0 - overall);
            return (VerdictKind::Bot, clamp_confidence(confidence));
        }

        let mut verdict = self.classify(overall);
        if verdict == VerdictKind::Human && !interacted {
            verdict = VerdictKind::Suspicious;
        }
        let confidence = match verdict {
            VerdictKind::Human | VerdictKind::Unknown => overall,
            VerdictKind::Bot | VerdictKind::Suspicious => 100.0 - overall,
        };
        (verdict, clamp_confidence(confidence))
    }
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::from_config(&ShieldConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::TimingStats;
    use crate::traps::TrapEvent;

    fn entropy(is_human: bool, confidence: u8) -> EntropyResult {
        EntropyResult {
            entropy: 3.0,
            stats: TimingStats::default(),
            is_human,
            confidence,
            anomalies: vec![],
            sample_count: 30,
        }
    }

    fn trap(trap_type: TrapType, confidence: u8) -> TrapEvent {
        TrapEvent {
            trap_type,
            confidence,
            details: String::new(),
            timestamp: 0.0,
        }
    }

    #[test]
    fn test_verdict_kind_as_str() {
        assert_eq!(VerdictKind::Human.as_str(), "human");
        assert_eq!(VerdictKind::Suspicious.to_string(), "suspicious");
        assert_eq!(serde_json::to_string(&VerdictKind::Bot).unwrap(), "\"bot\"");
    }

    #[test]
    fn test_temporal_direction() {
        let calc = ScoreCalculator::default();
        assert_eq!(calc.temporal(&entropy(true, 80)), 90.0);
        assert_eq!(calc.temporal(&entropy(false, 80)), 10.0);
        assert_eq!(calc.temporal(&EntropyResult::default()), 50.0);
    }

    #[test]
    fn test_hardware_pending_is_baseline() {
        let calc = ScoreCalculator::default();
        assert_eq!(calc.hardware(&HardwareStatus::Pending), 50.0);
    }

    #[test]
    fn test_behavioral_thresholds() {
        let calc = ScoreCalculator::default();
        let score = |movement_count, event_count| {
            calc.behavioral(&BehaviorSignals {
                movement_count,
                event_count,
                ..Default::default()
            })
        };
        assert_eq!(score(25, 40), 80.0);
        assert_eq!(score(7, 40), 65.0);
        assert_eq!(score(2, 40), 50.0);
        assert_eq!(score(0, 5), 50.0);
        assert_eq!(score(0, 15), 30.0);
    }

    #[test]
    fn test_behavioral_violations_clamped() {
        let calc = ScoreCalculator::default();
        let score = calc.behavioral(&BehaviorSignals {
            movement_count: 0,
            event_count: 50,
            timing_violations: 1,
            sequence_violations: 2,
        });
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_overall_weighting() {
        let calc = ScoreCalculator::default();
        assert_eq!(calc.overall(&CategoryScores::default()), 65.0);

        let scores = CategoryScores {
            temporal: 90.0,
            hardware: 100.0,
            behavioral: 80.0,
            honeypot: 100.0,
        };
        assert!((calc.overall(&scores) - 92.5).abs() < 1e-9);
    }

    #[test]
    fn test_overall_normalizes_weights() {
        let mut calc = ScoreCalculator::default();
        calc.weights = FusionWeights {
            temporal: 2.0,
            hardware: 0.0,
            behavioral: 0.0,
            honeypot: 2.0,
        };
        let scores = CategoryScores {
            temporal: 40.0,
            hardware: 0.0,
            behavioral: 0.0,
            honeypot: 100.0,
        };
        assert_eq!(calc.overall(&scores), 70.0);

        calc.weights = FusionWeights {
            temporal: 0.0,
            hardware: 0.0,
            behavioral: 0.0,
            honeypot: 0.0,
        };
        assert_eq!(calc.overall(&scores), 50.0);
    }

    #[test]
    fn test_classify_boundaries() {
        let calc = ScoreCalculator::default();
        assert_eq!(calc.classify(70.0), VerdictKind::Human);
        assert_eq!(calc.classify(69.9), VerdictKind::Suspicious);
        assert_eq!(calc.classify(45.0), VerdictKind::Suspicious);
        assert_eq!(calc.classify(44.9), VerdictKind::Bot);
        assert_eq!(calc.classify(30.0), VerdictKind::Bot);
        assert_eq!(calc.classify(29.9), VerdictKind::Unknown);
    }

    #[test]
    fn test_honeypot_override() {
        let calc = ScoreCalculator::default();
        let mut state = HoneypotState::default();
        state.record(trap(TrapType::ClickPosition, 40), 50);

        let (verdict, confidence) = calc.decide(95.0, &state, true);
        assert_eq!(verdict, VerdictKind::Bot);
        assert_eq!(confidence, 40);

        let (verdict, confidence) = calc.decide(20.0, &state, true);
        assert_eq!(verdict, VerdictKind::Bot);
        assert_eq!(confidence, 80);
    }

    #[test]
    fn test_decide_confidence() {
        let calc = ScoreCalculator::default();
        let clean = HoneypotState::default();
        assert_eq!(calc.decide(92.5, &clean, true), (VerdictKind::Human, 93));
        assert_eq!(calc.decide(65.0, &clean, true), (VerdictKind::Suspicious, 35));
        assert_eq!(calc.decide(35.0, &clean, true), (VerdictKind::Bot, 65));
        assert_eq!(calc.decide(10.0, &clean, true), (VerdictKind::Unknown, 10));
    }

    #[test]
    fn test_no_interaction_never_human() {
        let calc = ScoreCalculator::default();
        let clean = HoneypotState::default();
        assert_eq!(calc.decide(75.0, &clean, false), (VerdictKind::Suspicious, 25));
        assert_eq!(calc.decide(65.0, &clean, false), (VerdictKind::Suspicious, 35));
        assert_eq!(calc.decide(20.0, &clean, false), (VerdictKind::Unknown, 20));
        assert_eq!(calc.decide(75.0, &clean, true), (VerdictKind::Human, 75));
    }

    #[test]
    fn test_honeypot_score() {
        let calc = ScoreCalculator::default();
        let mut state = HoneypotState::default();
        assert_eq!(calc.honeypot(&state), 100.0);
        state.record(trap(TrapType::HiddenField, 80), 50);
        state.record(trap(TrapType::InvisibleLink, 100), 50);
        assert_eq!(calc.honeypot(&state), 0.0);
    }
}
