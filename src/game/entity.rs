//! Entity model - vehicles and projectiles

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::policy::{ProjectileView, VehicleView};

use super::geom::Pose;

/// Per-vehicle physical stats, fixed for the duration of a match
///
/// Produced from the engine defaults and the owning policy's loadout at
/// match start.
#[derive(Debug, Clone, Copy)]
pub struct VehicleStats {
    /// Top forward speed in units per tick
    pub max_speed: f64,
    /// Speed gained per tick at full throttle
    pub acceleration: f64,
    /// Heading change in degrees per tick at full turn power
    pub rotation_speed: f64,
    /// Cooldown between shots
    pub shoot_cooldown_ms: u64,
    /// How long this vehicle's projectiles stay live
    pub projectile_lifetime_ms: u64,
    pub max_health: i32,
    pub initial_ammo: u32,
}

impl VehicleStats {
    /// Baseline stats, equivalent to a 1/1/1 loadout
    pub fn base(cfg: &EngineConfig) -> Self {
        Self {
            max_speed: cfg.base_max_speed,
            acceleration: cfg.base_acceleration,
            rotation_speed: cfg.rotation_speed,
            shoot_cooldown_ms: cfg.shoot_cooldown_ms,
            projectile_lifetime_ms: cfg.projectile_lifetime_ms,
            max_health: cfg.max_health,
            initial_ammo: cfg.initial_ammo,
        }
    }
}

/// One combatant, mutated in place by the resolver every tick
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: Uuid,
    pub pose: Pose,
    /// Signed speed in units per tick; reverse is capped at half forward
    pub speed: f64,
    pub stats: VehicleStats,
    pub health: i32,
    pub alive: bool,
    pub ammo: u32,
    pub last_shot_at_ms: u64,
    /// Projectile hits landed by this vehicle
    pub score: i32,
}

impl Vehicle {
    pub fn new(spawn: Pose, stats: VehicleStats) -> Self {
        Self {
            id: Uuid::new_v4(),
            pose: spawn,
            speed: 0.0,
            stats,
            health: stats.max_health,
            alive: true,
            ammo: stats.initial_ammo,
            last_shot_at_ms: 0,
            score: 0,
        }
    }

    /// Whether a shot fired now would leave the barrel
    pub fn can_shoot(&self, now_ms: u64) -> bool {
        self.alive
            && self.ammo > 0
            && now_ms.saturating_sub(self.last_shot_at_ms) >= self.stats.shoot_cooldown_ms
    }

    /// Apply damage, flooring health at zero. Death is permanent: once
    /// health reaches zero the vehicle stays dead with zero speed.
    pub fn apply_damage(&mut self, damage: i32) {
        if !self.alive {
            return;
        }
        self.health = (self.health - damage.max(0)).max(0);
        if self.health == 0 {
            self.alive = false;
            self.speed = 0.0;
        }
    }

    /// Plain-data copy handed to decision policies
    pub fn view(&self, now_ms: u64) -> VehicleView {
        VehicleView {
            id: self.id,
            x: self.pose.x,
            y: self.pose.y,
            heading_deg: self.pose.heading_deg,
            speed: self.speed,
            health: self.health,
            max_health: self.stats.max_health,
            alive: self.alive,
            can_shoot: self.can_shoot(now_ms),
            ammo: self.ammo,
        }
    }
}

/// A projectile in flight
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    /// Identity of the shooter; used only for hit exclusion, never
    /// re-resolved to a vehicle
    pub owner_id: Uuid,
    pub pose: Pose,
    pub speed: f64,
    pub damage: i32,
    pub lifetime_ms: u64,
    pub created_at_ms: u64,
    pub active: bool,
}

impl Projectile {
    /// Spawn a projectile from `shooter`, nudged forward past the shooter's
    /// own body so it cannot hit its owner on the spawn tick
    pub fn fired_by(shooter: &Vehicle, cfg: &EngineConfig, now_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: shooter.id,
            pose: shooter.pose.advanced(cfg.vehicle_radius + 5.0),
            speed: cfg.projectile_speed,
            damage: cfg.projectile_damage,
            lifetime_ms: shooter.stats.projectile_lifetime_ms,
            created_at_ms: now_ms,
            active: true,
        }
    }

    /// Move one tick along the travel heading
    pub fn advance(&mut self) {
        self.pose = self.pose.advanced(self.speed);
    }

    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) >= self.lifetime_ms
    }

    pub fn in_bounds(&self, cfg: &EngineConfig) -> bool {
        self.pose.x >= 0.0
            && self.pose.x <= cfg.field_width
            && self.pose.y >= 0.0
            && self.pose.y <= cfg.field_height
    }

    pub fn view(&self) -> ProjectileView {
        ProjectileView {
            owner_id: self.owner_id,
            x: self.pose.x,
            y: self.pose.y,
            heading_deg: self.pose.heading_deg,
            speed: self.speed,
        }
    }
}
