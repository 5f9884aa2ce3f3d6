//! Failure boundary and time budget for untrusted policies
//!
//! A dynamically loaded policy runs on its own worker thread; the tick side
//! waits at most the configured decision budget for each answer. A policy
//! that panics yields `Idle` for that call; a policy that overruns the
//! budget is considered wedged and yields `Idle` for the rest of the match
//! without ever being waited on again.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::game::Action;

use super::{Loadout, Policy, ProjectileView, VehicleView};

struct DecideRequest {
    me: VehicleView,
    opponent: Option<VehicleView>,
    projectiles: Vec<ProjectileView>,
    reply: mpsc::Sender<Action>,
}

/// Handle to a policy running behind the failure boundary
pub struct GuardedPolicy {
    name: String,
    loadout: Loadout,
    call_tx: mpsc::Sender<DecideRequest>,
    budget: Duration,
    wedged: bool,
}

impl GuardedPolicy {
    /// Move `policy` onto a dedicated worker thread.
    ///
    /// Name and loadout are read once here, inside a panic boundary, so a
    /// hostile implementation cannot break the caller later.
    pub fn spawn(policy: Box<dyn Policy>, budget: Duration) -> Self {
        let name = catch_unwind(AssertUnwindSafe(|| policy.name().to_string()))
            .unwrap_or_else(|_| "dynamic policy".to_string());
        let loadout = catch_unwind(AssertUnwindSafe(|| policy.loadout()))
            .unwrap_or_default();

        let (call_tx, call_rx) = mpsc::channel::<DecideRequest>();
        let thread_name = format!("policy-{name}");
        let spawned = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker_loop(policy, call_rx));
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn policy worker, policy will idle");
        }

        Self {
            name,
            loadout,
            call_tx,
            budget,
            wedged: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loadout(&self) -> Loadout {
        self.loadout
    }

    /// Ask the policy for a decision, bounded by the decision budget.
    /// Every failure mode - worker gone, panic, overrun - degrades to Idle.
    pub fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        projectiles: &[ProjectileView],
    ) -> Action {
        if self.wedged {
            return Action::Idle;
        }

        let (reply_tx, reply_rx) = mpsc::channel();
        let request = DecideRequest {
            me: *me,
            opponent: opponent.copied(),
            projectiles: projectiles.to_vec(),
            reply: reply_tx,
        };
        if self.call_tx.send(request).is_err() {
            self.wedged = true;
            warn!(policy = %self.name, "policy worker gone, idling for the rest of the match");
            return Action::Idle;
        }

        match reply_rx.recv_timeout(self.budget) {
            Ok(action) => action,
            Err(_) => {
                self.wedged = true;
                warn!(
                    policy = %self.name,
                    budget_ms = self.budget.as_millis() as u64,
                    "policy exceeded its decision budget, idling for the rest of the match"
                );
                Action::Idle
            }
        }
    }
}

fn worker_loop(mut policy: Box<dyn Policy>, call_rx: mpsc::Receiver<DecideRequest>) {
    while let Ok(request) = call_rx.recv() {
        let action = catch_unwind(AssertUnwindSafe(|| {
            policy.decide(
                &request.me,
                request.opponent.as_ref(),
                &request.projectiles,
            )
        }))
        .unwrap_or(Action::Idle);
        // receiver may have timed out and moved on; that is fine
        let _ = request.reply.send(action);
    }
}

/// How the match loop drives a policy: built-ins are trusted and called
/// inline, everything dynamically loaded goes through the guard
pub enum PolicyDriver {
    Direct(Box<dyn Policy>),
    Sandboxed(GuardedPolicy),
}

impl PolicyDriver {
    pub fn name(&self) -> String {
        match self {
            PolicyDriver::Direct(p) => p.name().to_string(),
            PolicyDriver::Sandboxed(g) => g.name().to_string(),
        }
    }

    pub fn loadout(&self) -> Loadout {
        match self {
            PolicyDriver::Direct(p) => p.loadout(),
            PolicyDriver::Sandboxed(g) => g.loadout(),
        }
    }

    pub fn decide(
        &mut self,
        me: &VehicleView,
        opponent: Option<&VehicleView>,
        projectiles: &[ProjectileView],
    ) -> Action {
        match self {
            PolicyDriver::Direct(p) => p.decide(me, opponent, projectiles),
            PolicyDriver::Sandboxed(g) => g.decide(me, opponent, projectiles),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn view() -> VehicleView {
        VehicleView {
            id: Uuid::new_v4(),
            x: 100.0,
            y: 100.0,
            heading_deg: 0.0,
            speed: 0.0,
            health: 100,
            max_health: 100,
            alive: true,
            can_shoot: true,
            ammo: 50,
        }
    }

    struct PanicPolicy;
    impl Policy for PanicPolicy {
        fn name(&self) -> &str {
            "panics"
        }
        fn decide(
            &mut self,
            _me: &VehicleView,
            _opponent: Option<&VehicleView>,
            _projectiles: &[ProjectileView],
        ) -> Action {
            panic!("hostile policy")
        }
    }

    struct SleepyPolicy;
    impl Policy for SleepyPolicy {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn decide(
            &mut self,
            _me: &VehicleView,
            _opponent: Option<&VehicleView>,
            _projectiles: &[ProjectileView],
        ) -> Action {
            thread::sleep(Duration::from_secs(5));
            Action::Shoot
        }
    }

    struct ForwardPolicy;
    impl Policy for ForwardPolicy {
        fn name(&self) -> &str {
            "forward"
        }
        fn decide(
            &mut self,
            _me: &VehicleView,
            _opponent: Option<&VehicleView>,
            _projectiles: &[ProjectileView],
        ) -> Action {
            Action::MoveForward { power: 0.5 }
        }
    }

    #[test]
    fn healthy_policy_answers_through_guard() {
        let mut g = GuardedPolicy::spawn(Box::new(ForwardPolicy), Duration::from_millis(100));
        let me = view();
        let opp = view();
        assert_eq!(
            g.decide(&me, Some(&opp), &[]),
            Action::MoveForward { power: 0.5 }
        );
        assert_eq!(g.name(), "forward");
    }

    #[test]
    fn panicking_policy_degrades_to_idle_every_call() {
        let mut g = GuardedPolicy::spawn(Box::new(PanicPolicy), Duration::from_millis(100));
        let me = view();
        let opp = view();
        for _ in 0..1000 {
            assert_eq!(g.decide(&me, Some(&opp), &[]), Action::Idle);
        }
    }

    #[test]
    fn budget_overrun_wedges_the_policy() {
        let mut g = GuardedPolicy::spawn(Box::new(SleepyPolicy), Duration::from_millis(20));
        let me = view();
        let opp = view();
        let start = std::time::Instant::now();
        assert_eq!(g.decide(&me, Some(&opp), &[]), Action::Idle);
        // the wedged policy is never waited on again
        assert_eq!(g.decide(&me, Some(&opp), &[]), Action::Idle);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
