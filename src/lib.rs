//! Car Battle Engine - authoritative simulation core for two-vehicle
//! combat duels
//!
//! The crate owns the fixed-tick match loop, the combat resolver, the
//! decision-policy contract with its built-in tactics, and the dynamic
//! policy subsystem that compiles submitted tactic source at runtime and
//! swaps it into live matches. Transport (HTTP/WebSocket) is an external
//! consumer of [`Engine`].

pub mod app;
pub mod config;
pub mod game;
pub mod policy;
pub mod util;

pub use app::{Engine, EngineError};
pub use config::{ConfigError, EngineConfig};
pub use game::snapshot::MatchSnapshot;
pub use game::Action;
pub use policy::{Loadout, Policy, PolicyRegistry, ProjectileView, VehicleView};
