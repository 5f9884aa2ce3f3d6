//! Free helper functions shared by the built-in tactics
//!
//! Tactics stay independent variants over [`Policy`](super::Policy); the
//! common vocabulary lives here as plain functions instead of a base type.

use crate::game::geom::{self, Pose};
use crate::game::Action;

use super::{ProjectileView, VehicleView};

/// Distance between two vehicles
pub fn distance_to(me: &VehicleView, other: &VehicleView) -> f64 {
    geom::distance(me.pose(), other.pose())
}

/// Signed angular delta from my heading to the opponent, positive meaning
/// a rightward turn is shorter
pub fn aim_delta(me: &VehicleView, other: &VehicleView) -> f64 {
    geom::aim_delta_deg(me.pose(), other.pose())
}

pub fn distance_to_projectile(me: &VehicleView, shot: &ProjectileView) -> f64 {
    geom::distance(me.pose(), shot.pose())
}

/// The closest projectile not fired by `me`, if any
pub fn nearest_hostile_projectile<'a>(
    me: &VehicleView,
    projectiles: &'a [ProjectileView],
) -> Option<&'a ProjectileView> {
    projectiles
        .iter()
        .filter(|p| p.owner_id != me.id)
        .min_by(|a, b| {
            distance_to_projectile(me, a)
                .total_cmp(&distance_to_projectile(me, b))
        })
}

/// Turn toward the shorter angular delta
pub fn turn_toward(delta_deg: f64, power: f64) -> Action {
    if delta_deg > 0.0 {
        Action::TurnRight { power }
    } else {
        Action::TurnLeft { power }
    }
}

/// Hard turn away from an incoming projectile
pub fn evade(me: &VehicleView, shot: &ProjectileView) -> Action {
    let to_shot = geom::aim_delta_deg(me.pose(), shot.pose());
    if to_shot > 0.0 {
        Action::TurnLeft { power: 1.0 }
    } else {
        Action::TurnRight { power: 1.0 }
    }
}

/// Whether the mandatory dead/absent preconditions force an idle decision
pub fn must_idle(me: &VehicleView, opponent: Option<&VehicleView>) -> bool {
    !me.alive || !opponent.map(|o| o.alive).unwrap_or(false)
}

/// Convenience for tactics working in pose terms
pub fn pose_of(view: &VehicleView) -> Pose {
    view.pose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn view(x: f64, y: f64, heading: f64) -> VehicleView {
        VehicleView {
            id: Uuid::new_v4(),
            x,
            y,
            heading_deg: heading,
            speed: 0.0,
            health: 100,
            max_health: 100,
            alive: true,
            can_shoot: true,
            ammo: 50,
        }
    }

    fn shot(owner: Uuid, x: f64, y: f64) -> ProjectileView {
        ProjectileView {
            owner_id: owner,
            x,
            y,
            heading_deg: 0.0,
            speed: 8.0,
        }
    }

    #[test]
    fn nearest_hostile_skips_own_shots() {
        let me = view(100.0, 100.0, 0.0);
        let shots = [
            shot(me.id, 101.0, 100.0),
            shot(Uuid::new_v4(), 300.0, 100.0),
        ];
        let nearest = nearest_hostile_projectile(&me, &shots).unwrap();
        assert_eq!(nearest.x, 300.0);
    }

    #[test]
    fn nearest_hostile_is_none_when_all_are_mine() {
        let me = view(100.0, 100.0, 0.0);
        let shots = [shot(me.id, 101.0, 100.0)];
        assert!(nearest_hostile_projectile(&me, &shots).is_none());
    }

    #[test]
    fn turn_toward_picks_shorter_side() {
        assert!(matches!(
            turn_toward(30.0, 0.8),
            Action::TurnRight { .. }
        ));
        assert!(matches!(
            turn_toward(-30.0, 0.8),
            Action::TurnLeft { .. }
        ));
    }

    #[test]
    fn must_idle_on_dead_self_or_opponent() {
        let mut me = view(0.0, 0.0, 0.0);
        let mut opp = view(10.0, 0.0, 0.0);
        assert!(!must_idle(&me, Some(&opp)));
        assert!(must_idle(&me, None));
        opp.alive = false;
        assert!(must_idle(&me, Some(&opp)));
        opp.alive = true;
        me.alive = false;
        assert!(must_idle(&me, Some(&opp)));
    }
}
