//! Immutable match snapshots for external consumption
//!
//! The tick loop is the single writer of match state; everything outside it
//! (status queries, broadcasters) reads these detached copies instead.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One vehicle as seen from outside the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: Uuid,
    /// Name of the policy driving this vehicle
    pub policy: String,
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub speed: f64,
    pub health: i32,
    pub max_health: i32,
    pub alive: bool,
    pub can_shoot: bool,
    pub ammo: u32,
    pub score: i32,
}

/// One projectile in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
}

/// A complete, detached copy of the match state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub tick: u64,
    pub running: bool,
    pub winner_id: Option<Uuid>,
    /// Human-readable notes: policy fallbacks, loadout substitutions,
    /// match outcome
    pub status_message: String,
    pub timestamp_ms: u64,
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    pub vehicles: Vec<VehicleSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
}

impl MatchSnapshot {
    /// The state reported when no match exists (before the first start and
    /// after a reset)
    pub fn empty(timestamp_ms: u64) -> Self {
        Self {
            tick: 0,
            running: false,
            winner_id: None,
            status_message: String::new(),
            timestamp_ms,
            started_at_ms: None,
            ended_at_ms: None,
            vehicles: Vec::new(),
            projectiles: Vec::new(),
        }
    }
}
