//! Pure geometry primitives shared by the resolver and every tactic
//!
//! Headings are degrees, normalized to `(-180, 180]`, with 0° pointing along
//! +x and positive angles turning toward +y.

use serde::{Deserialize, Serialize};

/// A position plus facing on the battlefield
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading_deg: f64) -> Self {
        Self {
            x,
            y,
            heading_deg: normalize_deg(heading_deg),
        }
    }

    /// The pose moved `dist` units along its own heading
    pub fn advanced(&self, dist: f64) -> Self {
        let rad = self.heading_deg.to_radians();
        Self {
            x: self.x + rad.cos() * dist,
            y: self.y + rad.sin() * dist,
            heading_deg: self.heading_deg,
        }
    }

    /// The same position with a new (normalized) heading
    pub fn with_heading(&self, heading_deg: f64) -> Self {
        Self {
            x: self.x,
            y: self.y,
            heading_deg: normalize_deg(heading_deg),
        }
    }
}

/// Euclidean distance between two poses
pub fn distance(a: Pose, b: Pose) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Bearing from one pose to another, in degrees
pub fn bearing_deg(from: Pose, to: Pose) -> f64 {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    dy.atan2(dx).to_degrees()
}

/// Fold an angle into `(-180, 180]`
///
/// Uses a modular fold rather than repeated adjustment, so it completes in
/// constant time for any magnitude. Non-finite inputs fold to 0 so callers
/// always see a valid angle.
pub fn normalize_deg(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let folded = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if folded == -180.0 {
        180.0
    } else {
        folded
    }
}

/// Signed angular delta from `heading_deg` to the bearing toward `to`,
/// positive meaning a clockwise (rightward) turn is shorter
pub fn aim_delta_deg(from: Pose, to: Pose) -> f64 {
    normalize_deg(bearing_deg(from, to) - from.heading_deg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_into_half_open_range() {
        assert_eq!(normalize_deg(0.0), 0.0);
        assert_eq!(normalize_deg(180.0), 180.0);
        assert_eq!(normalize_deg(-180.0), 180.0);
        assert_eq!(normalize_deg(190.0), -170.0);
        assert_eq!(normalize_deg(-190.0), 170.0);
        assert_eq!(normalize_deg(540.0), 180.0);
        assert_eq!(normalize_deg(720.0), 0.0);
    }

    #[test]
    fn normalize_terminates_on_huge_and_non_finite_inputs() {
        let folded = normalize_deg(1.0e18);
        assert!(folded > -180.0 && folded <= 180.0);
        assert_eq!(normalize_deg(f64::NAN), 0.0);
        assert_eq!(normalize_deg(f64::INFINITY), 0.0);
    }

    #[test]
    fn bearing_matches_quadrants() {
        let origin = Pose::new(0.0, 0.0, 0.0);
        assert_eq!(bearing_deg(origin, Pose::new(10.0, 0.0, 0.0)), 0.0);
        assert_eq!(bearing_deg(origin, Pose::new(0.0, 10.0, 0.0)), 90.0);
        assert_eq!(bearing_deg(origin, Pose::new(-10.0, 0.0, 0.0)), 180.0);
        assert_eq!(bearing_deg(origin, Pose::new(0.0, -10.0, 0.0)), -90.0);
    }

    #[test]
    fn aim_delta_always_in_range() {
        let headings = [-540.0, -180.0, -37.5, 0.0, 90.0, 179.0, 400.0];
        let targets = [
            Pose::new(5.0, 3.0, 0.0),
            Pose::new(-2.0, 700.0, 0.0),
            Pose::new(-90.0, -0.1, 0.0),
        ];
        for h in headings {
            let me = Pose::new(100.0, 100.0, h);
            for t in targets {
                let delta = aim_delta_deg(me, t);
                assert!(delta > -180.0 && delta <= 180.0, "delta = {delta}");
            }
        }
    }

    #[test]
    fn advanced_moves_along_heading() {
        let p = Pose::new(10.0, 10.0, 90.0).advanced(5.0);
        assert!((p.x - 10.0).abs() < 1e-9);
        assert!((p.y - 15.0).abs() < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Pose::new(100.0, 100.0, 0.0);
        let b = Pose::new(700.0, 500.0, 180.0);
        assert_eq!(distance(a, b), distance(b, a));
        assert!((distance(a, b) - 721.110255).abs() < 1e-5);
    }
}
