//! Minimum reaction time trap.

use super::TrapHit;

/// Confidence of an action completed faster than a person could.
pub const TIMING_CONFIDENCE: u8 = 70;

/// Flags an action completed faster than the configured floor.
#[derive(Debug, Clone)]
pub struct TimingTrap {
    min_ms: f64,
    started_at: Option<f64>,
}

impl TimingTrap {
    pub fn new(min_ms: f64) -> Self {
        Self {
            min_ms,
            started_at: None,
        }
    }

    /// Mark the baseline. Restarting replaces the previous baseline.
    pub fn start(&mut self, now: f64, min_ms: f64) {
        self.min_ms = min_ms;
        self.started_at = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.started_at.is_some()
    }

    /// Complete the action. Disarms the trap whether or not it fires.
    pub fn check(&mut self, now: f64, action: &str) -> Option<TrapHit> {
        let start = self.started_at.take()?;
        let elapsed = now - start;
        (elapsed < self.min_ms).then(|| {
            TrapHit::new(
                TIMING_CONFIDENCE,
                format!(
                    "{} completed in {:.0}ms (floor {:.0}ms)",
                    action, elapsed, self.min_ms
                ),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_started() {
        let mut trap = TimingTrap::new(500.0);
        assert!(!trap.is_pending());
        assert!(trap.check(10.0, "submit").is_none());
    }

    #[test]
    fn test_too_fast() {
        let mut trap = TimingTrap::new(500.0);
        trap.start(1000.0, 500.0);
        let hit = trap.check(1150.0, "submit").unwrap();
        assert_eq!(hit.confidence, 70);
        assert_eq!(hit.details, "submit completed in 150ms (floor 500ms)");
        assert!(!trap.is_pending());
    }

    #[test]
    fn test_at_floor_passes() {
        let mut trap = TimingTrap::new(500.0);
        trap.start(0.0, 500.0);
        assert!(trap.check(500.0, "submit").is_none());
    }

    #[test]
    fn test_restart_moves_baseline() {
        let mut trap = TimingTrap::new(200.0);
        trap.start(0.0, 200.0);
        trap.start(1000.0, 200.0);
        assert!(trap.check(1100.0, "step").is_some());
    }
}
