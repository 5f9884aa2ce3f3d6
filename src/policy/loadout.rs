//! Stat allocation for a vehicle
//!
//! A policy distributes a fixed point budget across shooting range,
//! movement speed and fire rate. The allocation scales the engine's base
//! stats; an invalid allocation falls back to the default rather than
//! failing the match.

use crate::config::EngineConfig;
use crate::game::entity::VehicleStats;

pub const MAX_POINTS: u8 = 10;
pub const MIN_STAT: u8 = 1;
pub const MAX_STAT: u8 = 5;

/// Extra top speed per movement-speed point
const SPEED_STEP: f64 = 1.5;
/// Extra acceleration per movement-speed point
const ACCEL_STEP: f64 = 0.1;
/// Extra projectile lifetime per shooting-range point, in ms
const LIFETIME_STEP_MS: u64 = 750;
/// Cooldown reduction per fire-rate point, in ms
const COOLDOWN_STEP_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loadout {
    /// Projectile reach, 1-5
    pub shooting_range: u8,
    /// Top speed and acceleration, 1-5
    pub movement_speed: u8,
    /// Reload rate, 1-5
    pub fire_rate: u8,
}

impl Default for Loadout {
    fn default() -> Self {
        Self {
            shooting_range: 1,
            movement_speed: 1,
            fire_rate: 1,
        }
    }
}

impl Loadout {
    pub fn new(shooting_range: u8, movement_speed: u8, fire_rate: u8) -> Self {
        Self {
            shooting_range,
            movement_speed,
            fire_rate,
        }
    }

    /// Each stat within bounds and the total within the point budget
    pub fn is_valid(&self) -> bool {
        let in_range = |s: u8| (MIN_STAT..=MAX_STAT).contains(&s);
        in_range(self.shooting_range)
            && in_range(self.movement_speed)
            && in_range(self.fire_rate)
            && self.total_points() <= MAX_POINTS
    }

    pub fn total_points(&self) -> u8 {
        self.shooting_range + self.movement_speed + self.fire_rate
    }

    /// Scale the engine's base stats by this allocation
    pub fn apply(&self, cfg: &EngineConfig) -> VehicleStats {
        let mut stats = VehicleStats::base(cfg);
        let range = u64::from(self.shooting_range - MIN_STAT);
        let speed = f64::from(self.movement_speed - MIN_STAT);
        let rate = u64::from(self.fire_rate - MIN_STAT);

        stats.max_speed += speed * SPEED_STEP;
        stats.acceleration += speed * ACCEL_STEP;
        stats.projectile_lifetime_ms += range * LIFETIME_STEP_MS;
        stats.shoot_cooldown_ms = stats
            .shoot_cooldown_ms
            .saturating_sub(rate * COOLDOWN_STEP_MS)
            .max(COOLDOWN_STEP_MS);
        stats
    }
}

impl std::fmt::Display for Loadout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "range {}/5, speed {}/5, fire rate {}/5 ({}/{} points)",
            self.shooting_range,
            self.movement_speed,
            self.fire_rate,
            self.total_points(),
            MAX_POINTS
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_minimum() {
        let l = Loadout::default();
        assert!(l.is_valid());
        assert_eq!(l.total_points(), 3);
    }

    #[test]
    fn budget_overflow_is_invalid() {
        assert!(Loadout::new(5, 4, 1).is_valid());
        assert!(!Loadout::new(5, 5, 5).is_valid());
        assert!(!Loadout::new(0, 5, 5).is_valid());
        assert!(!Loadout::new(6, 1, 1).is_valid());
    }

    #[test]
    fn apply_scales_base_stats() {
        let cfg = EngineConfig::default();
        let stats = Loadout::new(3, 3, 4).apply(&cfg);
        assert!((stats.max_speed - 6.0).abs() < 1e-9);
        assert!((stats.acceleration - 0.35).abs() < 1e-9);
        assert_eq!(stats.projectile_lifetime_ms, 3500);
        assert_eq!(stats.shoot_cooldown_ms, 400);
    }

    #[test]
    fn apply_of_default_is_base() {
        let cfg = EngineConfig::default();
        let stats = Loadout::default().apply(&cfg);
        assert_eq!(stats.max_speed, cfg.base_max_speed);
        assert_eq!(stats.shoot_cooldown_ms, cfg.shoot_cooldown_ms);
        assert_eq!(stats.projectile_lifetime_ms, cfg.projectile_lifetime_ms);
    }
}
