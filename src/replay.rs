//! Deterministic replay of recorded sessions.
//!
//! A recording carries everything a live session would have seen: environment
//! descriptors, the rendering backend's identity and measured batch timings,
//! timed input events, navigation steps and trap activity. Replay drives a
//! fresh [`Shield`] on manual clocks, so the same recording always yields the
//! same scores.

use crate::clock::ManualClock;
use crate::config::ShieldConfig;
use crate::detectors::{RenderBackend, RenderContext, RenderLimits};
use crate::environment::{Environment, EnvironmentDescriptor};
use crate::error::ShieldError;
use crate::score::{Verdict, VerdictKind};
use crate::shield::{InputEvent, Shield};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One recorded session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionRecording {
    /// Ground truth, when known
    pub label: Option<VerdictKind>,

    pub environment: EnvironmentDescriptor,

    /// None when the session had no rendering backend
    pub hardware: Option<HardwareRecording>,

    pub events: Vec<TimedInput>,

    pub navigation: Vec<TimedStep>,

    /// Value found in the decoy field at submit time
    pub hidden_field_value: Option<String>,

    /// Requests seen on the session's invisible-link endpoint
    pub link_hits: usize,
}

impl SessionRecording {
    /// Load a recording from JSON or YAML, chosen by extension.
    pub fn from_path(path: &Path) -> Result<Self, ShieldError> {
        let content = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(serde_json::from_str(&content)?)
        }
    }
}

/// Rendering backend as observed during the recorded session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardwareRecording {
    pub vendor: Option<String>,
    pub renderer: Option<String>,
    pub limits: RenderLimits,

    /// Measured per-iteration duration of each benchmark batch (ms)
    pub batch_ms: Vec<f64>,
}

/// Input event at a time offset from page load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedInput {
    pub at_ms: f64,
    #[serde(flatten)]
    pub event: InputEvent,
}

/// Navigation step at a time offset from page load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedStep {
    pub at_ms: f64,
    pub step: String,
}

/// Plays back recorded benchmark timings on its own clock.
pub struct RecordedBackend {
    recording: HardwareRecording,
    clock: Arc<ManualClock>,
}

impl RecordedBackend {
    pub fn new(recording: HardwareRecording, clock: Arc<ManualClock>) -> Self {
        Self { recording, clock }
    }
}

impl RenderBackend for RecordedBackend {
    fn acquire(&self) -> Result<Box<dyn RenderContext>, ShieldError> {
        Ok(Box::new(RecordedContext {
            recording: self.recording.clone(),
            clock: self.clock.clone(),
            batch: 0,
            draws: 0,
        }))
    }
}

struct RecordedContext {
    recording: HardwareRecording,
    clock: Arc<ManualClock>,
    batch: usize,
    draws: usize,
}

impl RenderContext for RecordedContext {
    fn vendor(&self) -> Option<String> {
        self.recording.vendor.clone()
    }

    fn renderer(&self) -> Option<String> {
        self.recording.renderer.clone()
    }

    fn limits(&self) -> RenderLimits {
        self.recording.limits.clone()
    }

    fn draw(&mut self) -> Result<(), ShieldError> {
        self.draws += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ShieldError> {
        let per_iteration = self.recording.batch_ms.get(self.batch).copied().ok_or_else(|| {
            ShieldError::Render(format!("no recorded timing for batch {}", self.batch))
        })?;
        self.clock.advance(per_iteration * self.draws as f64);
        self.batch += 1;
        self.draws = 0;
        Ok(())
    }

    fn release(&mut self) {}
}

enum Step<'a> {
    Input(&'a InputEvent),
    Navigate(&'a str),
}

/// Replay `recording` through a fresh session and analyze it.
pub async fn replay(recording: &SessionRecording, config: &ShieldConfig) -> Verdict {
    let clock = Arc::new(ManualClock::new(0.0));
    let bench_clock = Arc::new(ManualClock::new(0.0));

    let mut env = Environment::headless()
        .with_descriptor(recording.environment.clone())
        .with_clock(clock.clone())
        .with_benchmark_clock(bench_clock.clone());
    if let Some(hardware) = &recording.hardware {
        env = env.with_render_backend(Arc::new(RecordedBackend::new(
            hardware.clone(),
            bench_clock,
        )));
    }

    let mut shield = Shield::new(config.clone(), env);
    shield.initialize();

    let mut timeline: Vec<(f64, Step<'_>)> = recording
        .events
        .iter()
        .map(|e| (e.at_ms, Step::Input(&e.event)))
        .chain(
            recording
                .navigation
                .iter()
                .map(|n| (n.at_ms, Step::Navigate(n.step.as_str()))),
        )
        .collect();
    // Stable, so simultaneous entries keep their recorded order
    timeline.sort_by(|a, b| a.0.total_cmp(&b.0));

    for (at_ms, step) in timeline {
        clock.set(at_ms);
        match step {
            Step::Input(event) => shield.handle_input(event.clone()),
            Step::Navigate(name) => {
                shield.record_navigation(name);
            }
        }
    }

    shield.check_hidden_field_value(recording.hidden_field_value.as_deref());
    let link = shield.link_path();
    for _ in 0..recording.link_hits {
        shield.report_link_hit(&link);
    }

    shield.await_hardware().await;
    debug!(
        events = recording.events.len(),
        steps = recording.navigation.len(),
        "Recording replayed"
    );
    shield.analyze().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn human_recording() -> SessionRecording {
        let mut events = Vec::new();
        let mut t = 900.0;
        for i in 0..30 {
            t += [92.0, 118.0, 104.0, 87.0, 131.0, 99.0][i % 6];
            events.push(TimedInput {
                at_ms: t,
                event: InputEvent::PointerMove {
                    x: 40.0 + 13.0 * i as f64,
                    y: 300.0 - 7.0 * i as f64,
                },
            });
        }

        SessionRecording {
            label: Some(VerdictKind::Human),
            environment: EnvironmentDescriptor {
                locale: Some("en-GB".to_string()),
                logical_cores: Some(8),
                screen_width: Some(1920),
                screen_height: Some(1080),
            },
            hardware: Some(HardwareRecording {
                vendor: Some("Intel Inc.".to_string()),
                renderer: Some("Intel(R) Iris(TM) Plus Graphics 655".to_string()),
                limits: RenderLimits::default(),
                batch_ms: vec![0.21, 0.19, 0.23, 0.20, 0.22],
            }),
            events,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_replay_human() {
        let verdict = replay(&human_recording(), &ShieldConfig::default()).await;
        assert_eq!(verdict.verdict, VerdictKind::Human);
        let hardware = verdict.hardware.unwrap();
        assert!(hardware.is_real_gpu);
        assert_eq!(hardware.timing_signature.len(), 5);
        assert!((hardware.timing_signature[0] - 0.21).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_replay_deterministic() {
        let recording = human_recording();
        let a = replay(&recording, &ShieldConfig::default()).await;
        let b = replay(&recording, &ShieldConfig::default()).await;
        assert_eq!(a.scores, b.scores);
        assert_eq!(a.entropy, b.entropy);
        assert_eq!(a.hardware.map(|h| h.hash), b.hardware.map(|h| h.hash));
    }

    #[tokio::test]
    async fn test_replay_traps() {
        let mut recording = human_recording();
        recording.link_hits = 1;
        let verdict = replay(&recording, &ShieldConfig::default()).await;
        assert_eq!(verdict.verdict, VerdictKind::Bot);
        assert!(verdict
            .anomalies
            .contains(&"honeypot:invisible-link".to_string()));
    }

    #[tokio::test]
    async fn test_short_recording_fails_benchmark() {
        let mut recording = human_recording();
        if let Some(hw) = recording.hardware.as_mut() {
            hw.batch_ms.truncate(2);
        }
        let verdict = replay(&recording, &ShieldConfig::default()).await;
        assert!(verdict
            .anomalies
            .contains(&"gpu:benchmark-failed".to_string()));
    }

    #[tokio::test]
    async fn test_replay_huge_offsets_round_trip() {
        let events = [0.0, 1e200, 4e200, 5e200, 7e200]
            .into_iter()
            .enumerate()
            .map(|(i, at_ms)| TimedInput {
                at_ms,
                event: InputEvent::PointerMove {
                    x: 10.0 * i as f64,
                    y: 20.0 * i as f64,
                },
            })
            .collect();
        let recording = SessionRecording {
            events,
            ..Default::default()
        };

        let verdict = replay(&recording, &ShieldConfig::default()).await;
        let stats = verdict.entropy.stats;
        assert!(stats.std_dev.is_finite());
        assert!(stats.coefficient_of_variation.is_finite());

        let json = serde_json::to_string(&verdict).unwrap();
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, verdict);
    }

    #[test]
    fn test_recording_wire_format() {
        let json = r#"{
            "label": "bot",
            "environment": {"locale": "en-US"},
            "events": [
                {"atMs": 120, "type": "click", "x": 100, "y": 200},
                {"atMs": 150.5, "type": "keydown", "key": "Enter"}
            ],
            "navigation": [{"atMs": 200, "step": "catalog"}],
            "hiddenFieldValue": "spam@example.com"
        }"#;
        let recording: SessionRecording = serde_json::from_str(json).unwrap();
        assert_eq!(recording.label, Some(VerdictKind::Bot));
        assert_eq!(recording.events.len(), 2);
        assert_eq!(recording.events[1].at_ms, 150.5);
        assert!(matches!(recording.events[0].event, InputEvent::Click { .. }));
        assert!(recording.hardware.is_none());
        assert_eq!(recording.link_hits, 0);
    }
}
