//! Match state and authoritative tick loop
//!
//! `MatchCore` is the single aggregate owning all mutable match state; the
//! only writer is the `MatchRunner` task that drives it at a fixed tick
//! period. Everything outside the loop reads watch-published snapshots.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::policy::PolicyDriver;
use crate::util::time::{unix_millis, Timer};

use super::entity::{Projectile, Vehicle};
use super::geom::Pose;
use super::snapshot::{MatchSnapshot, ProjectileSnapshot, VehicleSnapshot};
use super::Action;

/// Control messages accepted by the runner between ticks
#[derive(Debug, Clone, Copy)]
pub enum MatchCommand {
    /// Run one extra tick immediately
    Step,
    /// Halt the match and exit the loop
    Stop,
}

/// The authoritative match aggregate
pub struct MatchCore {
    cfg: Arc<EngineConfig>,
    pub(crate) vehicles: [Vehicle; 2],
    drivers: [PolicyDriver; 2],
    policy_names: [String; 2],
    pub(crate) projectiles: Vec<Projectile>,
    tick: u64,
    running: bool,
    winner_id: Option<uuid::Uuid>,
    started_at_ms: u64,
    ended_at_ms: Option<u64>,
    status_message: String,
}

impl MatchCore {
    /// Build a fresh match from two resolved policy drivers.
    ///
    /// Each driver's loadout is validated here; an invalid allocation falls
    /// back to the default and the substitution is noted in the status
    /// message rather than failing the match.
    pub fn new(cfg: Arc<EngineConfig>, drivers: [PolicyDriver; 2], mut notes: Vec<String>) -> Self {
        let policy_names = [drivers[0].name(), drivers[1].name()];

        let mut stats = Vec::with_capacity(2);
        for (slot, driver) in drivers.iter().enumerate() {
            let mut loadout = driver.loadout();
            if !loadout.is_valid() {
                notes.push(format!(
                    "invalid loadout for vehicle {} ({}): {}; using default",
                    slot_label(slot),
                    policy_names[slot],
                    loadout
                ));
                warn!(
                    policy = %policy_names[slot],
                    %loadout,
                    "invalid loadout, falling back to default"
                );
                loadout = Default::default();
            }
            stats.push(loadout.apply(&cfg));
        }

        let spawn_a = Pose::new(cfg.field_width / 8.0, cfg.field_height / 6.0, 0.0);
        let spawn_b = Pose::new(
            cfg.field_width * 7.0 / 8.0,
            cfg.field_height * 5.0 / 6.0,
            180.0,
        );
        let vehicles = [
            Vehicle::new(spawn_a, stats[0]),
            Vehicle::new(spawn_b, stats[1]),
        ];

        info!(
            policy_a = %policy_names[0],
            policy_b = %policy_names[1],
            "match initialized"
        );

        Self {
            cfg,
            vehicles,
            drivers,
            policy_names,
            projectiles: Vec::new(),
            tick: 0,
            running: true,
            winner_id: None,
            started_at_ms: unix_millis(),
            ended_at_ms: None,
            status_message: notes.join("; "),
        }
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.cfg
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Simulation time is derived from the tick counter, never sampled,
    /// so cooldowns and lifetimes replay identically
    fn now_ms(&self) -> u64 {
        self.started_at_ms + self.tick * self.cfg.tick_interval_ms
    }

    /// Advance the match by one tick. No-op once the match has ended.
    pub fn step(&mut self) {
        if !self.running {
            return;
        }
        self.tick += 1;
        let now_ms = self.now_ms();

        // both policies observe the same pre-tick state
        let views = [
            self.vehicles[0].view(now_ms),
            self.vehicles[1].view(now_ms),
        ];
        let projectile_views: Vec<_> = self.projectiles.iter().map(|p| p.view()).collect();

        let mut actions = [Action::Idle, Action::Idle];
        for slot in 0..2 {
            if self.vehicles[slot].alive {
                let opponent = views[1 - slot];
                actions[slot] =
                    self.drivers[slot].decide(&views[slot], Some(&opponent), &projectile_views);
            }
        }

        super::resolver::resolve_tick(
            &mut self.vehicles,
            &mut self.projectiles,
            &actions,
            &self.cfg,
            now_ms,
        );

        self.check_outcome(now_ms);
    }

    fn check_outcome(&mut self, now_ms: u64) {
        let alive: Vec<_> = self.vehicles.iter().filter(|v| v.alive).collect();
        if alive.len() > 1 {
            return;
        }
        self.running = false;
        self.ended_at_ms = Some(now_ms);
        match alive.first() {
            Some(winner) => {
                self.winner_id = Some(winner.id);
                let slot = self
                    .vehicles
                    .iter()
                    .position(|v| v.id == winner.id)
                    .unwrap_or(0);
                info!(
                    winner = %self.policy_names[slot],
                    tick = self.tick,
                    "match ended"
                );
            }
            None => info!(tick = self.tick, "match ended in mutual destruction"),
        }
    }

    /// Halt without declaring a winner (operator stop)
    pub fn halt(&mut self) {
        if self.running {
            self.running = false;
            self.ended_at_ms = Some(self.now_ms());
            info!(tick = self.tick, "match stopped");
        }
    }

    /// Detached copy of the current state for external readers
    pub fn snapshot(&self) -> MatchSnapshot {
        let now_ms = self.now_ms();
        MatchSnapshot {
            tick: self.tick,
            running: self.running,
            winner_id: self.winner_id,
            status_message: self.status_message.clone(),
            timestamp_ms: unix_millis(),
            started_at_ms: Some(self.started_at_ms),
            ended_at_ms: self.ended_at_ms,
            vehicles: self
                .vehicles
                .iter()
                .zip(self.policy_names.iter())
                .map(|(v, policy)| VehicleSnapshot {
                    id: v.id,
                    policy: policy.clone(),
                    x: v.pose.x,
                    y: v.pose.y,
                    heading_deg: v.pose.heading_deg,
                    speed: v.speed,
                    health: v.health,
                    max_health: v.stats.max_health,
                    alive: v.alive,
                    can_shoot: v.can_shoot(now_ms),
                    ammo: v.ammo,
                    score: v.score,
                })
                .collect(),
            projectiles: self
                .projectiles
                .iter()
                .filter(|p| p.active)
                .map(|p| ProjectileSnapshot {
                    x: p.pose.x,
                    y: p.pose.y,
                    heading_deg: p.pose.heading_deg,
                })
                .collect(),
        }
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub command_tx: mpsc::Sender<MatchCommand>,
    pub snapshot_rx: watch::Receiver<MatchSnapshot>,
}

impl MatchHandle {
    pub fn latest(&self) -> MatchSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}

/// Drives a `MatchCore` at the configured tick rate on its own task
pub struct MatchRunner {
    core: MatchCore,
    command_rx: mpsc::Receiver<MatchCommand>,
    snapshot_tx: watch::Sender<MatchSnapshot>,
}

impl MatchRunner {
    /// Spawn the tick loop, returning a handle for control and reads
    pub fn spawn(core: MatchCore) -> (MatchHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(core.snapshot());

        let runner = Self {
            core,
            command_rx,
            snapshot_tx,
        };
        let task = tokio::spawn(runner.run());

        (
            MatchHandle {
                command_tx,
                snapshot_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        let tick_period = Duration::from_millis(self.core.cfg.tick_interval_ms);
        let mut ticker = interval(tick_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("match loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step_once();
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(MatchCommand::Step) => self.step_once(),
                    Some(MatchCommand::Stop) | None => {
                        self.core.halt();
                        self.publish();
                        break;
                    }
                }
            }

            if !self.core.is_running() {
                break;
            }
        }

        self.publish();
        info!("match loop exited");
    }

    /// Run one tick behind a panic boundary: a failing tick is logged and
    /// skipped, never allowed to kill the loop
    fn step_once(&mut self) {
        let timer = Timer::new();
        if catch_unwind(AssertUnwindSafe(|| self.core.step())).is_err() {
            error!("tick panicked, continuing with next tick");
        }
        let elapsed = timer.elapsed_ms();
        if elapsed > self.core.cfg.tick_interval_ms {
            warn!(elapsed_ms = elapsed, "tick overran its period");
        }
        self.publish();
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.core.snapshot());
    }
}

fn slot_label(slot: usize) -> &'static str {
    if slot == 0 {
        "A"
    } else {
        "B"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tactics;
    use crate::policy::{Loadout, Policy, ProjectileView, VehicleView};

    fn core_with(
        a: Box<dyn Policy>,
        b: Box<dyn Policy>,
        cfg: EngineConfig,
    ) -> MatchCore {
        MatchCore::new(
            Arc::new(cfg),
            [PolicyDriver::Direct(a), PolicyDriver::Direct(b)],
            Vec::new(),
        )
    }

    /// Always shoots; aimed straight along its spawn heading
    struct TriggerHappy;
    impl Policy for TriggerHappy {
        fn name(&self) -> &str {
            "trigger-happy"
        }
        fn decide(
            &mut self,
            me: &VehicleView,
            opponent: Option<&VehicleView>,
            _projectiles: &[ProjectileView],
        ) -> Action {
            if !me.alive || !opponent.map(|o| o.alive).unwrap_or(false) {
                return Action::Idle;
            }
            Action::Shoot
        }
    }

    struct Pacifist;
    impl Policy for Pacifist {
        fn name(&self) -> &str {
            "pacifist"
        }
        fn decide(
            &mut self,
            _me: &VehicleView,
            _opponent: Option<&VehicleView>,
            _projectiles: &[ProjectileView],
        ) -> Action {
            Action::Idle
        }
    }

    struct GreedyLoadout;
    impl Policy for GreedyLoadout {
        fn name(&self) -> &str {
            "greedy"
        }
        fn loadout(&self) -> Loadout {
            Loadout::new(5, 5, 5)
        }
        fn decide(
            &mut self,
            _me: &VehicleView,
            _opponent: Option<&VehicleView>,
            _projectiles: &[ProjectileView],
        ) -> Action {
            Action::Idle
        }
    }

    #[test]
    fn spawns_match_reference_positions_with_default_field() {
        let core = core_with(
            tactics::builtin("simple").unwrap(),
            tactics::builtin("simple").unwrap(),
            EngineConfig::default(),
        );
        let a = core.vehicles[0].pose;
        let b = core.vehicles[1].pose;
        assert_eq!((a.x, a.y, a.heading_deg), (100.0, 100.0, 0.0));
        assert_eq!((b.x, b.y, b.heading_deg), (700.0, 500.0, 180.0));
    }

    #[test]
    fn step_is_noop_after_match_ends() {
        let mut core = core_with(
            Box::new(Pacifist),
            Box::new(Pacifist),
            EngineConfig::default(),
        );
        core.halt();
        let tick_before = core.snapshot().tick;
        core.step();
        assert_eq!(core.snapshot().tick, tick_before);
    }

    #[test]
    fn invalid_loadout_falls_back_with_status_note() {
        let core = core_with(
            Box::new(GreedyLoadout),
            Box::new(Pacifist),
            EngineConfig::default(),
        );
        let snap = core.snapshot();
        assert!(snap.status_message.contains("invalid loadout"));
        assert!(snap.status_message.contains("greedy"));
        // stats are the base ones, not the greedy allocation
        assert_eq!(
            core.vehicles[0].stats.max_speed,
            EngineConfig::default().base_max_speed
        );
    }

    #[test]
    fn shootout_ends_with_a_winner_and_dead_loser_stays_dead() {
        // A shoots along +x from (100,100); B idles at (700,500). Nobody can
        // hit across that offset, so steer B into the line of fire first.
        // Base projectile lifetime only covers ~325 units, so extend it to
        // span the field.
        let mut core = core_with(
            Box::new(TriggerHappy),
            Box::new(Pacifist),
            EngineConfig {
                projectile_lifetime_ms: 10_000,
                ..EngineConfig::default()
            },
        );
        core.vehicles[1].pose = Pose::new(700.0, 100.0, 180.0);

        let mut steps = 0;
        while core.is_running() && steps < 20_000 {
            core.step();
            steps += 1;
        }
        assert!(!core.is_running(), "match should end");

        let snap = core.snapshot();
        assert_eq!(snap.winner_id, Some(core.vehicles[0].id));
        assert!(!core.vehicles[1].alive);
        assert_eq!(core.vehicles[1].speed, 0.0);
        assert!(core.vehicles[0].score >= 4, "four hits needed for the kill");

        // dead stays dead no matter what gets submitted afterwards
        for _ in 0..10 {
            core.step();
        }
        assert!(!core.vehicles[1].alive);
    }

    #[test]
    fn panicking_policy_never_kills_the_match_core() {
        struct Hostile;
        impl Policy for Hostile {
            fn name(&self) -> &str {
                "hostile"
            }
            fn decide(
                &mut self,
                _me: &VehicleView,
                _opponent: Option<&VehicleView>,
                _projectiles: &[ProjectileView],
            ) -> Action {
                panic!("boom")
            }
        }

        let cfg = EngineConfig::default();
        let guarded = crate::policy::GuardedPolicy::spawn(
            Box::new(Hostile),
            Duration::from_millis(cfg.decision_budget_ms.max(50)),
        );
        let mut core = MatchCore::new(
            Arc::new(cfg),
            [
                PolicyDriver::Sandboxed(guarded),
                PolicyDriver::Direct(Box::new(Pacifist)),
            ],
            Vec::new(),
        );

        for _ in 0..1000 {
            core.step();
        }
        // the hostile vehicle has effectively idled the whole time
        assert!(core.is_running());
        assert_eq!(core.vehicles[0].speed, 0.0);
        assert!(core.projectiles.is_empty());
    }

    #[tokio::test]
    async fn runner_publishes_snapshots_and_stops_on_command() {
        let core = core_with(
            Box::new(Pacifist),
            Box::new(Pacifist),
            EngineConfig::default(),
        );
        let (handle, task) = MatchRunner::spawn(core);

        tokio::time::sleep(Duration::from_millis(120)).await;
        let snap = handle.latest();
        assert!(snap.running);
        assert!(snap.tick > 0, "loop must have ticked");

        handle
            .command_tx
            .send(MatchCommand::Stop)
            .await
            .expect("runner alive");
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("runner exits promptly")
            .expect("runner task does not panic");

        assert!(!handle.latest().running);
    }

    #[tokio::test]
    async fn manual_step_advances_the_tick() {
        let core = core_with(
            Box::new(Pacifist),
            Box::new(Pacifist),
            EngineConfig {
                // slow the schedule down so the manual step dominates
                tick_interval_ms: 60_000,
                ..EngineConfig::default()
            },
        );
        let (handle, task) = MatchRunner::spawn(core);
        // let the immediate first interval tick pass
        tokio::time::sleep(Duration::from_millis(50)).await;
        let before = handle.latest().tick;

        handle.command_tx.send(MatchCommand::Step).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.latest().tick, before + 1);

        handle.command_tx.send(MatchCommand::Stop).await.unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }
}
