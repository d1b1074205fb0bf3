//! Navigation sequence trap.
//!
//! Keeps a bounded history of navigation steps and flags:
//! - Transitions the UI cannot produce (an impossible run of steps)
//! - Steps following each other faster than anyone can click

use super::TrapHit;
use std::collections::VecDeque;

/// Confidence of an impossible step sequence.
pub const IMPOSSIBLE_SEQUENCE_CONFIDENCE: u8 = 90;

/// Confidence of two steps closer together than the minimum interval.
pub const RAPID_STEP_CONFIDENCE: u8 = 75;

#[derive(Debug, Clone)]
struct Step {
    name: String,
    at: f64,
}

/// Sequence trap.
#[derive(Debug, Clone)]
pub struct SequenceTrap {
    history: VecDeque<Step>,
    capacity: usize,
    min_interval_ms: f64,
    impossible: Vec<Vec<String>>,
}

impl SequenceTrap {
    pub fn new(capacity: usize, min_interval_ms: f64, impossible: Vec<Vec<String>>) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            min_interval_ms,
            impossible: impossible.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    /// Record `step` at `now` and return whatever it tripped.
    ///
    /// An impossible sequence is matched as a contiguous run ending at the
    /// newest step, so each occurrence is reported exactly once.
    pub fn record(&mut self, step: &str, now: f64) -> Vec<TrapHit> {
        let mut hits = Vec::new();

        if let Some(prev) = self.history.back() {
            let gap = now - prev.at;
            if gap < self.min_interval_ms {
                hits.push(TrapHit::new(
                    RAPID_STEP_CONFIDENCE,
                    format!("{} -> {} after {:.0}ms", prev.name, step, gap),
                ));
            }
        }

        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Step {
            name: step.to_string(),
            at: now,
        });

        for pattern in &self.impossible {
            if self.ends_with(pattern) {
                hits.push(TrapHit::new(
                    IMPOSSIBLE_SEQUENCE_CONFIDENCE,
                    format!("impossible sequence {}", pattern.join(" -> ")),
                ));
            }
        }

        hits
    }

    fn ends_with(&self, pattern: &[String]) -> bool {
        if pattern.len() > self.history.len() {
            return false;
        }
        self.history
            .iter()
            .skip(self.history.len() - pattern.len())
            .zip(pattern)
            .all(|(step, expected)| step.name == *expected)
    }

    /// Recorded step names, oldest first.
    pub fn steps(&self) -> Vec<String> {
        self.history.iter().map(|s| s.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trap() -> SequenceTrap {
        SequenceTrap::new(
            20,
            50.0,
            vec![vec!["catalog".to_string(), "playback".to_string()]],
        )
    }

    #[test]
    fn test_normal_navigation() {
        let mut trap = trap();
        assert!(trap.record("catalog", 0.0).is_empty());
        assert!(trap.record("details", 1200.0).is_empty());
        assert!(trap.record("playback", 2500.0).is_empty());
    }

    #[test]
    fn test_impossible_sequence() {
        let mut trap = trap();
        trap.record("catalog", 0.0);
        let hits = trap.record("playback", 900.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].confidence, 90);
        assert_eq!(hits[0].details, "impossible sequence catalog -> playback");

        // Already reported; the next step does not repeat it
        assert!(trap.record("details", 2000.0).is_empty());
    }

    #[test]
    fn test_rapid_steps() {
        let mut trap = trap();
        trap.record("catalog", 0.0);
        let hits = trap.record("details", 20.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].confidence, 75);
    }

    #[test]
    fn test_rapid_and_impossible_together() {
        let mut trap = trap();
        trap.record("catalog", 0.0);
        let hits = trap.record("playback", 10.0);
        let confidences: Vec<u8> = hits.iter().map(|h| h.confidence).collect();
        assert_eq!(confidences, vec![75, 90]);
    }

    #[test]
    fn test_bounded_history() {
        let mut trap = SequenceTrap::new(3, 0.0, vec![]);
        for (i, step) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            trap.record(step, i as f64 * 100.0);
        }
        assert_eq!(trap.steps(), vec!["c", "d", "e"]);
    }
}
