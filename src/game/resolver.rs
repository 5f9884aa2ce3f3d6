//! Combat resolution - applies one tick's movement, collision and damage
//!
//! The resolver is deliberately total: malformed powers are clamped,
//! actions for dead vehicles are no-ops, and nothing in here can fail.

use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;

use super::entity::{Projectile, Vehicle};
use super::geom;
use super::Action;

/// Outcome of a projectile connecting with a vehicle, collected during the
/// hit pass and applied afterwards
#[derive(Debug, Clone)]
struct HitResult {
    shooter_id: Uuid,
    target_slot: usize,
    damage: i32,
}

/// Advance the whole battlefield by one tick.
///
/// Order is fixed: projectile advance, projectile-vehicle hits, action
/// application, position integration with passive deceleration, boundary
/// clamp, vehicle-vehicle collision rollback.
pub fn resolve_tick(
    vehicles: &mut [Vehicle; 2],
    projectiles: &mut Vec<Projectile>,
    actions: &[Action; 2],
    cfg: &EngineConfig,
    now_ms: u64,
) {
    let pre_tick_poses = [vehicles[0].pose, vehicles[1].pose];

    advance_projectiles(projectiles, cfg, now_ms);
    apply_projectile_hits(vehicles, projectiles, cfg);
    projectiles.retain(|p| p.active);

    for slot in 0..2 {
        apply_action(&mut vehicles[slot], actions[slot], projectiles, cfg, now_ms);
    }

    integrate_positions(vehicles, actions, cfg);
    clamp_to_field(vehicles, cfg);
    resolve_vehicle_collision(vehicles, pre_tick_poses, cfg);
}

/// Step 1: move every live projectile and cull the expired or escaped ones
fn advance_projectiles(projectiles: &mut [Projectile], cfg: &EngineConfig, now_ms: u64) {
    for p in projectiles.iter_mut().filter(|p| p.active) {
        p.advance();
        if p.expired(now_ms) || !p.in_bounds(cfg) {
            p.active = false;
        }
    }
}

/// Step 2: hit test in deterministic order - projectiles in insertion
/// order, vehicles in slot order. A projectile hits at most one vehicle
/// and never its owner.
fn apply_projectile_hits(
    vehicles: &mut [Vehicle; 2],
    projectiles: &mut [Projectile],
    cfg: &EngineConfig,
) {
    let mut hits: Vec<HitResult> = Vec::new();

    for p in projectiles.iter_mut().filter(|p| p.active) {
        for (slot, vehicle) in vehicles.iter().enumerate() {
            if !vehicle.alive || vehicle.id == p.owner_id {
                continue;
            }
            if geom::distance(p.pose, vehicle.pose) < cfg.hit_radius {
                hits.push(HitResult {
                    shooter_id: p.owner_id,
                    target_slot: slot,
                    damage: p.damage,
                });
                p.active = false;
                break;
            }
        }
    }

    for hit in hits {
        vehicles[hit.target_slot].apply_damage(hit.damage);
        debug!(
            target_health = vehicles[hit.target_slot].health,
            "projectile hit"
        );
        if let Some(shooter) = vehicles.iter_mut().find(|v| v.id == hit.shooter_id) {
            shooter.score += 1;
        }
    }
}

/// Step 3: apply the policy-chosen action. Dead vehicles ignore actions.
fn apply_action(
    vehicle: &mut Vehicle,
    action: Action,
    projectiles: &mut Vec<Projectile>,
    cfg: &EngineConfig,
    now_ms: u64,
) {
    if !vehicle.alive {
        return;
    }

    match action {
        Action::MoveForward { power } => {
            let power = power.clamp(0.0, 1.0);
            vehicle.speed = (vehicle.speed + vehicle.stats.acceleration * power)
                .min(vehicle.stats.max_speed);
        }
        Action::MoveBackward { power } => {
            let power = power.clamp(0.0, 1.0);
            vehicle.speed = (vehicle.speed - vehicle.stats.acceleration * power)
                .max(-vehicle.stats.max_speed * 0.5);
        }
        Action::TurnLeft { power } => {
            let power = power.clamp(0.0, 1.0);
            vehicle.pose = vehicle
                .pose
                .with_heading(vehicle.pose.heading_deg - vehicle.stats.rotation_speed * power);
        }
        Action::TurnRight { power } => {
            let power = power.clamp(0.0, 1.0);
            vehicle.pose = vehicle
                .pose
                .with_heading(vehicle.pose.heading_deg + vehicle.stats.rotation_speed * power);
        }
        Action::Shoot => {
            if vehicle.can_shoot(now_ms) {
                projectiles.push(Projectile::fired_by(vehicle, cfg, now_ms));
                vehicle.ammo -= 1;
                vehicle.last_shot_at_ms = now_ms;
            }
        }
        Action::Idle => {}
    }
}

/// Step 4: advance live vehicles along their heading; bleed off speed when
/// no throttle was applied this tick
fn integrate_positions(vehicles: &mut [Vehicle; 2], actions: &[Action; 2], cfg: &EngineConfig) {
    for (vehicle, action) in vehicles.iter_mut().zip(actions.iter()) {
        if !vehicle.alive {
            continue;
        }
        vehicle.pose = vehicle.pose.advanced(vehicle.speed);
        if !action.is_throttle() {
            let decayed = vehicle.speed.abs() - cfg.passive_decel;
            vehicle.speed = vehicle.speed.signum() * decayed.max(0.0);
        }
    }
}

/// Step 5: keep each vehicle's collision radius fully inside the field
fn clamp_to_field(vehicles: &mut [Vehicle; 2], cfg: &EngineConfig) {
    for vehicle in vehicles.iter_mut() {
        let r = cfg.vehicle_radius;
        let x = vehicle.pose.x.clamp(r, cfg.field_width - r);
        let y = vehicle.pose.y.clamp(r, cfg.field_height - r);
        if x != vehicle.pose.x || y != vehicle.pose.y {
            vehicle.pose = geom::Pose::new(x, y, vehicle.pose.heading_deg);
        }
    }
}

/// Step 6: conservative vehicle-vehicle collision - both vehicles roll
/// back to their pre-tick poses and stop
fn resolve_vehicle_collision(
    vehicles: &mut [Vehicle; 2],
    pre_tick_poses: [geom::Pose; 2],
    cfg: &EngineConfig,
) {
    let gap = geom::distance(vehicles[0].pose, vehicles[1].pose);
    if gap < 2.0 * cfg.vehicle_radius {
        debug!(gap, "vehicle collision, rolling back");
        for (vehicle, pose) in vehicles.iter_mut().zip(pre_tick_poses) {
            vehicle.pose = pose;
            vehicle.speed = 0.0;
        }
    }
}
