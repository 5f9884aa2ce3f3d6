//! Built-in tactics
//!
//! All variants over the same [`Policy`](super::Policy) contract,
//! differing only in thresholds and priorities. Shared conventions: turn
//! toward the shorter angular delta, and evade an incoming projectile
//! before considering the attack.

use crate::game::Action;

use super::helpers::{
    aim_delta, distance_to, distance_to_projectile, evade, must_idle,
    nearest_hostile_projectile, turn_toward,
};
use super::{Loadout, Policy, ProjectileView, VehicleView};

/// Name of the tactic used when a requested policy cannot be resolved
pub const DEFAULT_TACTIC: &str = "simple";

/// All built-in tactic names, resolvable by [`builtin`]
pub const BUILTIN_TACTICS: [&str; 5] =
    ["simple", "aggressive", "defensive", "sniper", "adaptive"];

/// Construct a fresh instance of a built-in tactic by name
pub fn builtin(name: &str) -> Option<Box<dyn Policy>> {
    match name {
        "simple" => Some(Box::new(SimpleTactic)),
        "aggressive" => Some(Box::new(AggressiveTactic)),
        "defensive" => Some(Box::new(DefensiveTactic)),
        "sniper" => Some(Box::new(SniperTactic)),
        "adaptive" => Some(Box::new(AdaptiveTactic)),
        _ => None,
    }
}

/// Balanced default: evade, keep clear of ramming range, shoot when lined
/// up, otherwise close in
pub struct SimpleTactic;

impl SimpleTactic {
    const SAFE_DISTANCE: f64 = 60.0;
    const BULLET_DANGER_DISTANCE: f64 = 60.0;
    const SHOOTING_DISTANCE: f64 = 300.0;
    const AIM_TOLERANCE: f64 = 25.0;
    const TURN_THRESHOLD: f64 = 15.0;
}

impl Policy for SimpleTactic {
    fn name(&self) -> &str {
        "simple"
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        projectiles: &[ProjectileView],
    ) -> Action {
        if must_idle(me, opponent) {
            return Action::Idle;
        }
        let Some(opponent) = opponent else {
            return Action::Idle;
        };

        // incoming fire beats everything else
        if let Some(shot) = nearest_hostile_projectile(me, projectiles) {
            if distance_to_projectile(me, shot) < Self::BULLET_DANGER_DISTANCE {
                return evade(me, shot);
            }
        }

        let dist = distance_to(me, opponent);
        let delta = aim_delta(me, opponent);

        if dist < Self::SAFE_DISTANCE {
            return evade_collision(delta);
        }

        if dist < Self::SHOOTING_DISTANCE
            && me.can_shoot
            && delta.abs() < Self::AIM_TOLERANCE
        {
            return Action::Shoot;
        }

        if delta.abs() > Self::TURN_THRESHOLD {
            return turn_toward(delta, 0.8);
        }

        // slow down on approach
        let power = if dist > 150.0 { 0.8 } else { 0.4 };
        Action::MoveForward { power }
    }
}

/// Too close for comfort: back straight out if the opponent is ahead,
/// otherwise turn to slip around them
fn evade_collision(delta: f64) -> Action {
    if delta.abs() < 60.0 {
        Action::MoveBackward { power: 0.8 }
    } else if delta > 0.0 {
        Action::TurnLeft { power: 1.0 }
    } else {
        Action::TurnRight { power: 1.0 }
    }
}

/// Closes distance relentlessly and fires on any acceptable aim
pub struct AggressiveTactic;

impl AggressiveTactic {
    const SHOOTING_DISTANCE: f64 = 250.0;
    const CLOSE_DISTANCE: f64 = 80.0;
    const AIM_TOLERANCE: f64 = 30.0;
}

impl Policy for AggressiveTactic {
    fn name(&self) -> &str {
        "aggressive"
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        _projectiles: &[ProjectileView],
    ) -> Action {
        if must_idle(me, opponent) {
            return Action::Idle;
        }
        let Some(opponent) = opponent else {
            return Action::Idle;
        };

        let dist = distance_to(me, opponent);
        let delta = aim_delta(me, opponent);

        if me.can_shoot && delta.abs() < Self::AIM_TOLERANCE && dist < Self::SHOOTING_DISTANCE {
            return Action::Shoot;
        }

        if dist > Self::CLOSE_DISTANCE {
            if delta.abs() > 10.0 {
                return turn_toward(delta, 1.0);
            }
            Action::MoveForward { power: 1.0 }
        } else {
            // knife-fight range: jink, then open up again
            if delta.abs() > 45.0 {
                return turn_toward(delta, 0.5);
            }
            Action::MoveBackward { power: 0.7 }
        }
    }
}

/// Holds a comfortable band, prioritizing projectile evasion
pub struct DefensiveTactic;

impl DefensiveTactic {
    const OPTIMAL_DISTANCE: f64 = 150.0;
    const DANGER_DISTANCE: f64 = 100.0;
    const BULLET_SAFE_DISTANCE: f64 = 120.0;
    const AIM_TOLERANCE: f64 = 20.0;
}

impl Policy for DefensiveTactic {
    fn name(&self) -> &str {
        "defensive"
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        projectiles: &[ProjectileView],
    ) -> Action {
        if must_idle(me, opponent) {
            return Action::Idle;
        }
        let Some(opponent) = opponent else {
            return Action::Idle;
        };

        if let Some(shot) = nearest_hostile_projectile(me, projectiles) {
            if distance_to_projectile(me, shot) < Self::BULLET_SAFE_DISTANCE {
                return evade(me, shot);
            }
        }

        let dist = distance_to(me, opponent);
        let delta = aim_delta(me, opponent);

        if dist < Self::DANGER_DISTANCE {
            Action::MoveBackward { power: 0.8 }
        } else if dist > Self::OPTIMAL_DISTANCE + 50.0 {
            if delta.abs() > 15.0 {
                return turn_toward(delta, 0.6);
            }
            Action::MoveForward { power: 0.5 }
        } else {
            if me.can_shoot && delta.abs() < Self::AIM_TOLERANCE {
                return Action::Shoot;
            }
            // gentle orbit keeps us a moving target
            Action::TurnRight { power: 0.3 }
        }
    }
}

/// Long-range duelist: strict aim discipline, proportional turn power
pub struct SniperTactic;

impl SniperTactic {
    const PREFERRED_DISTANCE: f64 = 300.0;
    const BAND: f64 = 50.0;
    const AIM_THRESHOLD: f64 = 5.0;
}

impl Policy for SniperTactic {
    fn name(&self) -> &str {
        "sniper"
    }

    fn loadout(&self) -> Loadout {
        Loadout::new(3, 3, 4)
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        _projectiles: &[ProjectileView],
    ) -> Action {
        if must_idle(me, opponent) {
            return Action::Idle;
        }
        let Some(opponent) = opponent else {
            return Action::Idle;
        };

        let dist = distance_to(me, opponent);
        let delta = aim_delta(me, opponent);

        if dist < Self::PREFERRED_DISTANCE - Self::BAND {
            return Action::MoveBackward { power: 0.6 };
        }
        if dist > Self::PREFERRED_DISTANCE + Self::BAND {
            if delta.abs() > 20.0 {
                return turn_toward(delta, 0.5);
            }
            return Action::MoveForward { power: 0.4 };
        }

        if delta.abs() < Self::AIM_THRESHOLD {
            if me.can_shoot {
                return Action::Shoot;
            }
        } else {
            // fine-grained aim correction, proportional to the error
            let power = (delta.abs() / 90.0).min(0.3);
            return turn_toward(delta, power);
        }

        Action::Idle
    }
}

/// Switches posture with its own health: snipes when hurt, pushes when
/// healthy, plays a neutral mid game otherwise
pub struct AdaptiveTactic;

impl AdaptiveTactic {
    const SAFE_DISTANCE: f64 = 150.0;
    const ATTACK_DISTANCE: f64 = 250.0;
    const BULLET_DANGER_DISTANCE: f64 = 100.0;
    const LOW_HEALTH: i32 = 30;
    const HIGH_HEALTH: i32 = 70;
}

impl Policy for AdaptiveTactic {
    fn name(&self) -> &str {
        "adaptive"
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        projectiles: &[ProjectileView],
    ) -> Action {
        if must_idle(me, opponent) {
            return Action::Idle;
        }
        let Some(opponent) = opponent else {
            return Action::Idle;
        };

        let dist = distance_to(me, opponent);
        let delta = aim_delta(me, opponent);

        if let Some(shot) = nearest_hostile_projectile(me, projectiles) {
            if distance_to_projectile(me, shot) < Self::BULLET_DANGER_DISTANCE {
                let to_shot = aim_delta(
                    me,
                    &VehicleView {
                        x: shot.x,
                        y: shot.y,
                        ..*opponent
                    },
                );
                // shot ahead of us: back out; shot behind: power through
                return if to_shot.abs() < 90.0 {
                    Action::MoveBackward { power: 0.9 }
                } else {
                    Action::MoveForward { power: 0.7 }
                };
            }
        }

        if me.health < Self::LOW_HEALTH {
            self.retreat_and_snipe(me, dist, delta)
        } else if me.health > Self::HIGH_HEALTH && dist > Self::SAFE_DISTANCE {
            self.press_attack(me, dist, delta)
        } else {
            self.neutral_game(me, dist, delta)
        }
    }
}

impl AdaptiveTactic {
    fn retreat_and_snipe(&self, me: &VehicleView, dist: f64, delta: f64) -> Action {
        if dist > Self::ATTACK_DISTANCE && delta.abs() < 30.0 && me.can_shoot {
            return Action::Shoot;
        }
        if dist < Self::SAFE_DISTANCE {
            Action::MoveBackward { power: 0.8 }
        } else if delta.abs() > 20.0 {
            turn_toward(delta, 0.9)
        } else {
            Action::MoveForward { power: 0.5 }
        }
    }

    fn press_attack(&self, me: &VehicleView, dist: f64, delta: f64) -> Action {
        if delta.abs() < 20.0 && me.can_shoot {
            return Action::Shoot;
        }
        if dist > Self::SAFE_DISTANCE {
            if delta.abs() > 15.0 {
                return turn_toward(delta, 0.9);
            }
            Action::MoveForward { power: 0.9 }
        } else if me.can_shoot {
            Action::Shoot
        } else {
            Action::MoveForward { power: 0.3 }
        }
    }

    fn neutral_game(&self, me: &VehicleView, dist: f64, delta: f64) -> Action {
        if delta.abs() < 25.0 && dist < Self::ATTACK_DISTANCE && me.can_shoot {
            return Action::Shoot;
        }
        if delta.abs() > 20.0 {
            turn_toward(delta, 0.7)
        } else if dist > Self::SAFE_DISTANCE {
            Action::MoveForward { power: 0.6 }
        } else {
            Action::MoveBackward { power: 0.4 }
        }
    }
}
