//! Configuration module - environment variable parsing
//!
//! Every numeric constant of the simulation lives here so that tuning is a
//! deployment concern, not a code change.

use std::env;

/// Engine configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Battlefield width in world units
    pub field_width: f64,
    /// Battlefield height in world units
    pub field_height: f64,
    /// Fixed tick period in milliseconds
    pub tick_interval_ms: u64,

    /// Vehicle body radius (boundary clamp and vehicle-vehicle collision)
    pub vehicle_radius: f64,
    /// Projectile-vehicle hit distance
    pub hit_radius: f64,
    /// Projectile travel per tick
    pub projectile_speed: f64,
    /// Damage applied per projectile hit
    pub projectile_damage: i32,
    /// Base projectile lifetime in ms (shooting range 1; loadout scales up)
    pub projectile_lifetime_ms: u64,

    /// Vehicle health at spawn
    pub max_health: i32,
    /// Rounds available at spawn
    pub initial_ammo: u32,
    /// Base top speed in units per tick (movement speed 1; loadout scales up)
    pub base_max_speed: f64,
    /// Base speed gained per tick at full throttle
    pub base_acceleration: f64,
    /// Heading change in degrees per tick at full turn power
    pub rotation_speed: f64,
    /// Base cooldown between shots in ms (fire rate 1; loadout scales down)
    pub shoot_cooldown_ms: u64,
    /// Speed lost per tick while no throttle action is issued
    pub passive_decel: f64,

    /// Wall-clock budget for one untrusted policy decision, in ms
    pub decision_budget_ms: u64,
    /// How long stop_match waits for the loop task before aborting it, in ms
    pub stop_timeout_ms: u64,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        cfg.log_level = env::var("LOG_LEVEL").unwrap_or(cfg.log_level);

        read_var("FIELD_WIDTH", &mut cfg.field_width)?;
        read_var("FIELD_HEIGHT", &mut cfg.field_height)?;
        read_var("TICK_INTERVAL_MS", &mut cfg.tick_interval_ms)?;
        read_var("VEHICLE_RADIUS", &mut cfg.vehicle_radius)?;
        read_var("HIT_RADIUS", &mut cfg.hit_radius)?;
        read_var("PROJECTILE_SPEED", &mut cfg.projectile_speed)?;
        read_var("PROJECTILE_DAMAGE", &mut cfg.projectile_damage)?;
        read_var("PROJECTILE_LIFETIME_MS", &mut cfg.projectile_lifetime_ms)?;
        read_var("MAX_HEALTH", &mut cfg.max_health)?;
        read_var("INITIAL_AMMO", &mut cfg.initial_ammo)?;
        read_var("BASE_MAX_SPEED", &mut cfg.base_max_speed)?;
        read_var("BASE_ACCELERATION", &mut cfg.base_acceleration)?;
        read_var("ROTATION_SPEED", &mut cfg.rotation_speed)?;
        read_var("SHOOT_COOLDOWN_MS", &mut cfg.shoot_cooldown_ms)?;
        read_var("PASSIVE_DECEL", &mut cfg.passive_decel)?;
        read_var("DECISION_BUDGET_MS", &mut cfg.decision_budget_ms)?;
        read_var("STOP_TIMEOUT_MS", &mut cfg.stop_timeout_ms)?;

        if cfg.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("TICK_INTERVAL_MS"));
        }
        if cfg.field_width <= 2.0 * cfg.vehicle_radius
            || cfg.field_height <= 2.0 * cfg.vehicle_radius
        {
            return Err(ConfigError::Invalid("FIELD_WIDTH/FIELD_HEIGHT"));
        }

        Ok(cfg)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            field_width: 800.0,
            field_height: 600.0,
            tick_interval_ms: 50,
            vehicle_radius: 20.0,
            hit_radius: 20.0,
            projectile_speed: 8.0,
            projectile_damage: 25,
            projectile_lifetime_ms: 2000,
            max_health: 100,
            initial_ammo: 50,
            base_max_speed: 3.0,
            base_acceleration: 0.15,
            rotation_speed: 4.0,
            shoot_cooldown_ms: 1000,
            passive_decel: 0.1,
            decision_budget_ms: 10,
            stop_timeout_ms: 500,
        }
    }
}

/// Parse an env var into `target` if set, leaving the default otherwise
fn read_var<T: std::str::FromStr>(
    name: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    match env::var(name) {
        Ok(raw) => {
            *target = raw.parse().map_err(|_| ConfigError::Invalid(name))?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_parameters() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.field_width, 800.0);
        assert_eq!(cfg.field_height, 600.0);
        assert_eq!(cfg.tick_interval_ms, 50);
        assert_eq!(cfg.projectile_damage, 25);
        assert_eq!(cfg.shoot_cooldown_ms, 1000);
    }

    #[test]
    fn env_override_parses() {
        let mut width = 800.0_f64;
        std::env::set_var("TEST_FIELD_WIDTH_OVERRIDE", "1024");
        read_var("TEST_FIELD_WIDTH_OVERRIDE", &mut width).unwrap();
        assert_eq!(width, 1024.0);
        std::env::remove_var("TEST_FIELD_WIDTH_OVERRIDE");
    }
}
