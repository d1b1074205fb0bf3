//! Pointer traps: passive movement counting and click placement.

use super::TrapHit;
use crate::detectors::Point;
use serde::{Deserialize, Serialize};

/// Confidence of a click on the exact center of its target.
pub const CENTER_CLICK_CONFIDENCE: u8 = 60;

/// Confidence of a click on round coordinates.
pub const ROUND_CLICK_CONFIDENCE: u8 = 40;

/// Counts pointer movements longer than a jitter threshold. Never fires;
/// the count feeds the behavioral score.
#[derive(Debug, Clone)]
pub struct MouseMovementTrap {
    min_px: f64,
    last: Option<Point>,
    count: u32,
}

impl MouseMovementTrap {
    pub fn new(min_px: f64) -> Self {
        Self {
            min_px,
            last: None,
            count: 0,
        }
    }

    /// Returns true if the movement counted.
    pub fn record(&mut self, x: f64, y: f64) -> bool {
        let point = Point::new(x, y);
        let counted = match self.last {
            Some(last) if last.distance(&point) < self.min_px => return false,
            Some(_) => true,
            None => false,
        };
        self.last = Some(point);
        if counted {
            self.count = self.count.saturating_add(1);
        }
        counted
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn has_movement(&self) -> bool {
        self.count > 0
    }
}

/// Bounding box of a click target in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl TargetRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Flags clicks placed the way scripts place them.
#[derive(Debug, Clone)]
pub struct ClickPositionTrap {
    center_tolerance_px: f64,
    modulus: u32,
}

impl ClickPositionTrap {
    pub fn new(center_tolerance_px: f64, modulus: u32) -> Self {
        Self {
            center_tolerance_px: center_tolerance_px.max(0.0),
            modulus,
        }
    }

    pub fn check(&self, x: f64, y: f64, target: Option<&TargetRect>) -> Option<TrapHit> {
        let click = Point::new(x, y);

        if let Some(rect) = target {
            let center = rect.center();
            if click.distance(&center) <= self.center_tolerance_px + f64::EPSILON {
                return Some(TrapHit::new(
                    CENTER_CLICK_CONFIDENCE,
                    format!("click at exact target center ({}, {})", x, y),
                ));
            }
        }

        self.is_round(x, y).then(|| {
            TrapHit::new(
                ROUND_CLICK_CONFIDENCE,
                format!("click at round coordinates ({}, {})", x, y),
            )
        })
    }

    // (0, 0) comes from keyboard activation, not a pointer
    fn is_round(&self, x: f64, y: f64) -> bool {
        if self.modulus < 2 || (x == 0.0 && y == 0.0) {
            return false;
        }
        let m = f64::from(self.modulus);
        [x, y]
            .iter()
            .all(|v| v.is_finite() && v.fract() == 0.0 && v.rem_euclid(m) == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_threshold() {
        let mut trap = MouseMovementTrap::new(3.0);
        assert!(!trap.record(10.0, 10.0));
        assert!(!trap.record(11.0, 11.0));
        assert!(trap.record(20.0, 10.0));
        assert!(trap.record(20.0, 30.0));
        assert_eq!(trap.count(), 2);
        assert!(trap.has_movement());
    }

    #[test]
    fn test_jitter_accumulates() {
        // Sub-threshold steps keep the anchor, so slow drags still count
        let mut trap = MouseMovementTrap::new(3.0);
        trap.record(0.0, 0.0);
        assert!(!trap.record(2.0, 0.0));
        assert!(trap.record(4.0, 0.0));
    }

    #[test]
    fn test_center_click() {
        let trap = ClickPositionTrap::new(0.0, 100);
        let rect = TargetRect::new(10.0, 20.0, 100.0, 40.0);
        let hit = trap.check(60.0, 40.0, Some(&rect)).unwrap();
        assert_eq!(hit.confidence, 60);
        assert!(trap.check(61.5, 40.0, Some(&rect)).is_none());
    }

    #[test]
    fn test_center_tolerance() {
        let trap = ClickPositionTrap::new(2.0, 100);
        let rect = TargetRect::new(0.0, 0.0, 10.0, 10.0);
        assert!(trap.check(6.0, 6.0, Some(&rect)).is_some());
        assert!(trap.check(8.0, 8.0, Some(&rect)).is_none());
    }

    #[test]
    fn test_round_coordinates() {
        let trap = ClickPositionTrap::new(0.0, 100);
        assert_eq!(trap.check(100.0, 200.0, None).unwrap().confidence, 40);
        assert!(trap.check(100.0, 201.0, None).is_none());
        assert!(trap.check(100.5, 200.0, None).is_none());
        assert!(trap.check(0.0, 0.0, None).is_none());
    }

    #[test]
    fn test_center_wins_over_round() {
        let trap = ClickPositionTrap::new(0.0, 100);
        let rect = TargetRect::new(0.0, 0.0, 200.0, 200.0);
        assert_eq!(trap.check(100.0, 100.0, Some(&rect)).unwrap().confidence, 60);
    }

    #[test]
    fn test_modulus_disabled() {
        let trap = ClickPositionTrap::new(0.0, 1);
        assert!(trap.check(100.0, 200.0, None).is_none());
    }
}
