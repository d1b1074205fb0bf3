//! Temporal entropy analysis.
//!
//! Records interaction events into a bounded ring buffer and measures how the
//! gaps between them are distributed:
//! - Shannon entropy over quantized inter-arrival buckets
//! - Mean, standard deviation and coefficient of variation (CV)
//!
//! Scripts tend to fire events on a fixed cadence (CV near zero). People do
//! not.

use super::{clamp_confidence, TimingStats};
use crate::clock::Clock;
use crate::config::EntropyConfig;
use crate::error::ShieldError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Kind of interaction event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    KeyDown,
    KeyUp,
    PointerMove,
    Click,
    Scroll,
    Touch,
}

/// Key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPhase {
    Down,
    Up,
}

/// Page coordinates in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One recorded interaction. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(rename = "type")]
    pub kind: InteractionKind,

    /// Monotonic milliseconds since session start
    pub timestamp: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Point>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<u8>,
}

/// Optional event attributes for [`EventRecorder::record_event`].
#[derive(Debug, Clone, Default)]
pub struct EventPayload {
    pub coordinates: Option<Point>,
    pub key: Option<String>,
    pub button: Option<u8>,
}

/// Result of a temporal analysis. Produced fresh on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntropyResult {
    /// Shannon entropy (bits) of the bucketed inter-arrival distribution
    pub entropy: f64,

    pub stats: TimingStats,

    pub is_human: bool,

    /// 0-100; zero until the minimum sample count is reached
    pub confidence: u8,

    pub anomalies: Vec<String>,

    /// Events the analysis was computed over
    #[serde(default)]
    pub sample_count: usize,
}

impl EntropyResult {
    /// Neutral result used when no judgement is possible.
    pub fn insufficient(sample_count: usize, anomaly: &str) -> Self {
        Self {
            entropy: 0.0,
            stats: TimingStats::default(),
            is_human: false,
            confidence: 0,
            anomalies: vec![anomaly.to_string()],
            sample_count,
        }
    }
}

impl Default for EntropyResult {
    fn default() -> Self {
        Self::insufficient(0, "insufficient-timing-data")
    }
}

/// Bounded interaction recorder and timing analyzer.
pub struct EventRecorder {
    events: VecDeque<InteractionEvent>,
    config: EntropyConfig,
    clock: Arc<dyn Clock>,
    last_timestamp: f64,
}

impl EventRecorder {
    /// Create a recorder reading timestamps from `clock`.
    pub fn new(config: EntropyConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = config.buffer_capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            config,
            clock,
            last_timestamp: 0.0,
        }
    }

    pub fn record_keystroke(&mut self, key: &str, phase: KeyPhase) {
        let kind = match phase {
            KeyPhase::Down => InteractionKind::KeyDown,
            KeyPhase::Up => InteractionKind::KeyUp,
        };
        self.record_event(
            kind,
            EventPayload {
                key: Some(key.to_string()),
                ..Default::default()
            },
        );
    }

    pub fn record_mouse_move(&mut self, x: f64, y: f64) {
        self.record_event(
            InteractionKind::PointerMove,
            EventPayload {
                coordinates: Some(Point::new(x, y)),
                ..Default::default()
            },
        );
    }

    pub fn record_click(&mut self, x: f64, y: f64, button: u8) {
        self.record_event(
            InteractionKind::Click,
            EventPayload {
                coordinates: Some(Point::new(x, y)),
                button: Some(button),
                ..Default::default()
            },
        );
    }

    pub fn record_scroll(&mut self, y: f64) {
        self.record_event(
            InteractionKind::Scroll,
            EventPayload {
                coordinates: Some(Point::new(0.0, y)),
                ..Default::default()
            },
        );
    }

    /// Append one event stamped with the current monotonic time.
    pub fn record_event(&mut self, kind: InteractionKind, payload: EventPayload) {
        let now = self.clock.now_ms();
        // Never let a misbehaving clock produce negative deltas
        let timestamp = if now.is_finite() {
            now.max(self.last_timestamp)
        } else {
            self.last_timestamp
        };
        self.last_timestamp = timestamp;

        if self.events.len() >= self.config.buffer_capacity.max(1) {
            self.events.pop_front();
        }
        self.events.push_back(InteractionEvent {
            kind,
            timestamp,
            coordinates: payload.coordinates,
            key: payload.key,
            button: payload.button,
        });
    }

    /// Number of events currently buffered.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Buffered events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &InteractionEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.last_timestamp = 0.0;
    }

    /// Inter-arrival deltas, or an error when there are too few events.
    pub fn deltas(&self) -> Result<Vec<f64>, ShieldError> {
        let need = self.config.min_samples.max(3);
        if self.events.len() < need {
            return Err(ShieldError::InsufficientSamples {
                have: self.events.len(),
                need,
            });
        }

        Ok(self
            .events
            .iter()
            .zip(self.events.iter().skip(1))
            .map(|(prev, next)| next.timestamp - prev.timestamp)
            .collect())
    }

    /// Analyze the timing distribution of everything recorded so far.
    pub fn analyze(&self) -> EntropyResult {
        let count = self.events.len();
        let deltas = match self.deltas() {
            Ok(deltas) => deltas,
            Err(err) => return EntropyResult::insufficient(count, err.anomaly()),
        };
        let Some(stats) = TimingStats::from_samples(&deltas) else {
            return EntropyResult::insufficient(count, "insufficient-timing-data");
        };

        let cfg = &self.config;
        let entropy = shannon_entropy(&deltas, cfg.bucket_ms, cfg.max_buckets);
        let cv = stats.coefficient_of_variation;
        let mut anomalies = Vec::new();

        let (is_human, certainty) = if cv < cfg.uniform_cv {
            anomalies.push("mechanical-timing".to_string());
            // The flatter the cadence, the surer we are
            (false, 0.6 + 0.4 * (1.0 - cv / cfg.uniform_cv))
        } else if cv > cfg.noise_cv {
            anomalies.push("erratic-timing".to_string());
            (false, 0.3)
        } else {
            (true, 0.8)
        };

        let saturation = cfg.saturation_samples.max(1);
        if deltas.len() >= saturation && entropy < cfg.low_entropy_bits {
            anomalies.push("low-timing-entropy".to_string());
        }

        let sample_factor = (deltas.len() as f64 / saturation as f64).min(1.0);

        EntropyResult {
            entropy,
            stats,
            is_human,
            confidence: clamp_confidence(100.0 * certainty * sample_factor),
            anomalies,
            sample_count: count,
        }
    }
}

/// Shannon entropy (bits) of `deltas` quantized into `bucket_ms` wide buckets.
pub fn shannon_entropy(deltas: &[f64], bucket_ms: f64, max_buckets: usize) -> f64 {
    if deltas.is_empty() || !(bucket_ms > 0.0) {
        return 0.0;
    }

    let mut histogram: HashMap<usize, usize> = HashMap::new();
    let mut total = 0usize;
    for delta in deltas.iter().filter(|d| d.is_finite()) {
        let bucket = ((delta.max(0.0) / bucket_ms).floor() as usize).min(max_buckets);
        *histogram.entry(bucket).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    histogram
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    const HUMAN_GAPS: [f64; 21] = [
        120.0, 80.0, 200.0, 150.0, 95.0, 310.0, 140.0, 60.0, 180.0, 220.0, 130.0, 170.0, 90.0,
        260.0, 110.0, 75.0, 190.0, 145.0, 230.0, 105.0, 165.0,
    ];

    fn recorder() -> (EventRecorder, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0.0));
        let recorder = EventRecorder::new(EntropyConfig::default(), clock.clone());
        (recorder, clock)
    }

    #[test]
    fn test_no_events() {
        let (recorder, _) = recorder();
        let result = recorder.analyze();
        assert_eq!(result.confidence, 0);
        assert!(!result.is_human);
        assert!(result.anomalies.contains(&"insufficient-timing-data".to_string()));
    }

    #[test]
    fn test_two_events_insufficient() {
        let (mut recorder, clock) = recorder();
        recorder.record_mouse_move(1.0, 1.0);
        clock.advance(40.0);
        recorder.record_mouse_move(9.0, 4.0);

        let result = recorder.analyze();
        assert_eq!(result.confidence, 0);
        assert_eq!(result.sample_count, 2);
        assert_eq!(result.anomalies, vec!["insufficient-timing-data".to_string()]);
    }

    #[test]
    fn test_uniform_timing_is_mechanical() {
        let (mut recorder, clock) = recorder();
        for i in 0..30 {
            let phase = if i % 2 == 0 {
                KeyPhase::Down
            } else {
                KeyPhase::Up
            };
            recorder.record_keystroke("a", phase);
            clock.advance(100.0);
        }

        let result = recorder.analyze();
        assert!(!result.is_human);
        assert!(result.stats.coefficient_of_variation < 1e-9);
        assert!(result.anomalies.contains(&"mechanical-timing".to_string()));
        assert_eq!(result.confidence, 100);
        assert_eq!(result.entropy, 0.0);
        assert!(result.anomalies.contains(&"low-timing-entropy".to_string()));
    }

    #[test]
    fn test_human_like_timing() {
        let (mut recorder, clock) = recorder();
        recorder.record_click(10.0, 10.0, 0);
        for gap in HUMAN_GAPS {
            clock.advance(gap);
            recorder.record_keystroke("k", KeyPhase::Down);
        }

        let result = recorder.analyze();
        assert!(result.is_human, "anomalies: {:?}", result.anomalies);
        assert!(result.stats.coefficient_of_variation > 0.3);
        assert!(result.entropy > 2.0);
        assert_eq!(result.confidence, 80);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_confidence_grows_with_samples() {
        let (mut recorder, clock) = recorder();
        recorder.record_scroll(0.0);
        for gap in &HUMAN_GAPS[..5] {
            clock.advance(*gap);
            recorder.record_scroll(100.0);
        }
        let few = recorder.analyze().confidence;

        for gap in &HUMAN_GAPS[5..] {
            clock.advance(*gap);
            recorder.record_scroll(200.0);
        }
        let many = recorder.analyze().confidence;

        assert!(few > 0);
        assert!(many > few);
    }

    #[test]
    fn test_ring_buffer_eviction() {
        let clock = Arc::new(ManualClock::new(0.0));
        let config = EntropyConfig {
            buffer_capacity: 10,
            ..Default::default()
        };
        let mut recorder = EventRecorder::new(config, clock.clone());
        for i in 0..25 {
            clock.advance(10.0);
            recorder.record_mouse_move(i as f64, 0.0);
        }

        assert_eq!(recorder.event_count(), 10);
        let first = recorder.events().next().unwrap();
        assert_eq!(first.coordinates, Some(Point::new(15.0, 0.0)));
    }

    #[test]
    fn test_clear() {
        let (mut recorder, _) = recorder();
        recorder.record_event(InteractionKind::Touch, EventPayload::default());
        recorder.record_event(InteractionKind::Touch, EventPayload::default());
        assert_eq!(recorder.event_count(), 2);
        recorder.clear();
        assert_eq!(recorder.event_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let (mut recorder, clock) = recorder();
        clock.advance(12.25);
        recorder.record_keystroke("Enter", KeyPhase::Down);

        let event = recorder.events().next().unwrap();
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "keydown");
        assert_eq!(json["timestamp"], 12.25);
        assert_eq!(json["key"], "Enter");
        assert!(json.get("coordinates").is_none());
    }

    #[test]
    fn test_shannon_entropy() {
        assert_eq!(shannon_entropy(&[], 5.0, 10), 0.0);
        assert_eq!(shannon_entropy(&[1.0, 2.0, 3.0], 5.0, 10), 0.0);
        // Two equally likely buckets
        let bits = shannon_entropy(&[1.0, 7.0, 2.0, 8.0], 5.0, 10);
        assert!((bits - 1.0).abs() < 1e-12);
        // Overflow lands in the last bucket
        let bits = shannon_entropy(&[1000.0, 5000.0], 5.0, 10);
        assert_eq!(bits, 0.0);
    }

    proptest! {
        #[test]
        fn test_analysis_bounded_for_any_gaps(
            gaps in proptest::collection::vec(
                prop_oneof![0.0f64..2000.0, 0.0f64..1e300],
                0..120,
            ),
        ) {
            let (mut recorder, clock) = recorder();
            for (i, gap) in gaps.iter().enumerate() {
                clock.advance(*gap);
                match i % 4 {
                    0 => recorder.record_keystroke("k", KeyPhase::Down),
                    1 => recorder.record_mouse_move(i as f64, 0.0),
                    2 => recorder.record_click(0.0, i as f64, 0),
                    _ => recorder.record_scroll(i as f64),
                }
            }

            let result = recorder.analyze();
            prop_assert!(result.confidence <= 100);
            prop_assert!(result.entropy.is_finite() && result.entropy >= 0.0);
            prop_assert!(result.stats.is_finite());
            if gaps.len() < 3 {
                prop_assert_eq!(result.confidence, 0);
            }

            let json = serde_json::to_string(&result).unwrap();
            let back: EntropyResult = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, result);
        }
    }
}
