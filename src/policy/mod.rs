//! Decision policies - the contract tactics implement, built-in tactics,
//! and the dynamic plugin subsystem

pub mod dynamic;
pub mod guard;
pub mod helpers;
pub mod loadout;
pub mod registry;
pub mod tactics;

pub use guard::{GuardedPolicy, PolicyDriver};
pub use loadout::Loadout;
pub use registry::{CompileStatus, PolicyInfo, PolicyRegistry, RegisterOutcome};

use uuid::Uuid;

use crate::game::Action;

/// What a policy sees of a vehicle. Plain data, detached from the
/// authoritative entities.
#[derive(Debug, Clone, Copy)]
pub struct VehicleView {
    pub id: Uuid,
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub speed: f64,
    pub health: i32,
    pub max_health: i32,
    pub alive: bool,
    pub can_shoot: bool,
    pub ammo: u32,
}

impl VehicleView {
    pub fn pose(&self) -> crate::game::geom::Pose {
        crate::game::geom::Pose {
            x: self.x,
            y: self.y,
            heading_deg: self.heading_deg,
        }
    }
}

/// What a policy sees of a projectile in flight
#[derive(Debug, Clone, Copy)]
pub struct ProjectileView {
    pub owner_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub speed: f64,
}

impl ProjectileView {
    pub fn pose(&self) -> crate::game::geom::Pose {
        crate::game::geom::Pose {
            x: self.x,
            y: self.y,
            heading_deg: self.heading_deg,
        }
    }
}

/// The decision contract every tactic implements.
///
/// `decide` must be deterministic for identical inputs and must return
/// [`Action::Idle`] when `me` is dead or `opponent` is absent or dead -
/// the resolver does not enforce this separately, so it is a hard
/// precondition on implementations, not a convention.
pub trait Policy: Send {
    fn name(&self) -> &str;

    /// Stat allocation for the controlled vehicle; validated at match start
    fn loadout(&self) -> Loadout {
        Loadout::default()
    }

    fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        projectiles: &[ProjectileView],
    ) -> Action;
}
