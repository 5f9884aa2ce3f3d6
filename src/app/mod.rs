//! Engine facade - the external interface of the simulation core
//!
//! Owns the policy registry and at most one match session. The transport
//! layer (HTTP/WebSocket, not part of this crate) talks exclusively to
//! [`Engine`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::game::match_loop::{MatchCommand, MatchCore, MatchHandle, MatchRunner};
use crate::game::snapshot::MatchSnapshot;
use crate::policy::dynamic::CompileError;
use crate::policy::tactics::{self, DEFAULT_TACTIC};
use crate::policy::{GuardedPolicy, PolicyDriver, PolicyInfo, PolicyRegistry, RegisterOutcome};
use crate::util::time::unix_millis;

/// Errors surfaced by the facade. Everything match-related degrades
/// internally; only policy registration can fail outward.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("internal engine failure: {0}")]
    Internal(String),
}

struct MatchSession {
    handle: MatchHandle,
    task: Option<JoinHandle<()>>,
    /// Set once stop completed; guards against a force-aborted loop never
    /// publishing its final not-running snapshot
    stopped: bool,
}

/// The simulation engine
pub struct Engine {
    cfg: Arc<EngineConfig>,
    registry: Arc<PolicyRegistry>,
    session: Mutex<Option<MatchSession>>,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            registry: Arc::new(PolicyRegistry::new()),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Start a match between two policies, stopping any match in progress.
    ///
    /// Ids are built-in tactic names or `custom_<registered name>`. An id
    /// that cannot be resolved falls back to the default built-in; the
    /// substitution is recorded in the returned snapshot's status message
    /// instead of failing the match.
    pub async fn start_match(&self, policy_a: &str, policy_b: &str) -> MatchSnapshot {
        self.stop_match().await;

        let mut notes = Vec::new();
        let drivers = [
            self.resolve_driver(policy_a, "A", &mut notes),
            self.resolve_driver(policy_b, "B", &mut notes),
        ];

        let core = MatchCore::new(self.cfg.clone(), drivers, notes);
        let snapshot = core.snapshot();
        let (handle, task) = MatchRunner::spawn(core);

        *self.session.lock() = Some(MatchSession {
            handle,
            task: Some(task),
            stopped: false,
        });

        info!(policy_a, policy_b, "match started");
        snapshot
    }

    /// Stop the running match, waiting out the in-flight tick. The loop
    /// task gets a bounded grace period, after which it is aborted. The
    /// final state stays readable; no-op when nothing is running.
    pub async fn stop_match(&self) {
        let (command_tx, task) = {
            let mut guard = self.session.lock();
            match guard.as_mut() {
                Some(session) if !session.stopped => {
                    (session.handle.command_tx.clone(), session.task.take())
                }
                _ => return,
            }
        };

        let _ = command_tx.send(MatchCommand::Stop).await;
        if let Some(task) = task {
            let abort = task.abort_handle();
            let grace = Duration::from_millis(self.cfg.stop_timeout_ms);
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!(
                    grace_ms = self.cfg.stop_timeout_ms,
                    "match loop did not stop within the grace period, aborting"
                );
                abort.abort();
            }
        }

        if let Some(session) = self.session.lock().as_mut() {
            session.stopped = true;
        }
    }

    /// Clear the engine back to the empty, not-running state. Idempotent.
    pub async fn reset_match(&self) {
        self.stop_match().await;
        *self.session.lock() = None;
    }

    /// Force one immediate extra tick. Idempotent no-op when no match is
    /// running; scheduled ticks remain the loop's own business.
    pub async fn tick(&self) {
        let command_tx = {
            let guard = self.session.lock();
            guard
                .as_ref()
                .filter(|s| !s.stopped)
                .map(|s| s.handle.command_tx.clone())
        };
        if let Some(tx) = command_tx {
            let _ = tx.send(MatchCommand::Step).await;
        }
    }

    /// The latest immutable snapshot of the match state
    pub fn state(&self) -> MatchSnapshot {
        let guard = self.session.lock();
        match guard.as_ref() {
            Some(session) => {
                let mut snapshot = session.handle.latest();
                if session.stopped {
                    snapshot.running = false;
                }
                snapshot
            }
            None => MatchSnapshot::empty(unix_millis()),
        }
    }

    /// Compile and register a dynamic policy. The compile runs on the
    /// blocking pool; a missing toolchain surfaces as a distinct error.
    pub async fn register_policy(
        &self,
        name: &str,
        source: &str,
    ) -> Result<RegisterOutcome, EngineError> {
        let registry = Arc::clone(&self.registry);
        let name = name.to_string();
        let source = source.to_string();
        let outcome = tokio::task::spawn_blocking(move || registry.register(&name, &source))
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))??;
        Ok(outcome)
    }

    pub fn list_policies(&self) -> Vec<PolicyInfo> {
        self.registry.list()
    }

    pub fn delete_policy(&self, name: &str) -> bool {
        self.registry.delete(name)
    }

    /// Resolve a policy id into a driver, falling back to the default
    /// built-in when the id does not resolve
    fn resolve_driver(
        &self,
        requested: &str,
        slot: &str,
        notes: &mut Vec<String>,
    ) -> PolicyDriver {
        let budget = Duration::from_millis(self.cfg.decision_budget_ms);

        if let Some(custom) = requested.strip_prefix("custom_") {
            match self.registry.resolve(custom) {
                Some(policy) => {
                    return PolicyDriver::Sandboxed(GuardedPolicy::spawn(policy, budget))
                }
                None => {
                    warn!(requested, slot, "custom policy not resolvable, using default");
                    notes.push(format!(
                        "policy '{requested}' not available; vehicle {slot} using '{DEFAULT_TACTIC}'"
                    ));
                }
            }
        } else if let Some(policy) = tactics::builtin(requested) {
            return PolicyDriver::Direct(policy);
        } else {
            warn!(requested, slot, "unknown policy id, using default");
            notes.push(format!(
                "policy '{requested}' not available; vehicle {slot} using '{DEFAULT_TACTIC}'"
            ));
        }

        PolicyDriver::Direct(Box::new(tactics::SimpleTactic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[tokio::test]
    async fn start_match_with_builtins_runs() {
        let engine = engine();
        let snapshot = engine.start_match("simple", "aggressive").await;
        assert!(snapshot.running);
        assert_eq!(snapshot.vehicles.len(), 2);
        assert_eq!(snapshot.vehicles[0].policy, "simple");
        assert_eq!(snapshot.vehicles[1].policy, "aggressive");
        assert!(snapshot.status_message.is_empty());
        engine.reset_match().await;
    }

    #[tokio::test]
    async fn unresolvable_ids_fall_back_with_status_note() {
        let engine = engine();
        let snapshot = engine.start_match("no-such-tactic", "custom_ghost").await;
        assert!(snapshot.running, "fallback must not fail the match");
        assert_eq!(snapshot.vehicles[0].policy, "simple");
        assert_eq!(snapshot.vehicles[1].policy, "simple");
        assert!(snapshot.status_message.contains("no-such-tactic"));
        assert!(snapshot.status_message.contains("custom_ghost"));
        assert!(snapshot.status_message.contains("vehicle A"));
        assert!(snapshot.status_message.contains("vehicle B"));
        engine.reset_match().await;
    }

    #[tokio::test]
    async fn stop_keeps_final_state_reset_clears_it() {
        let engine = engine();
        engine.start_match("simple", "simple").await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        engine.stop_match().await;
        let stopped = engine.state();
        assert!(!stopped.running);
        assert_eq!(stopped.vehicles.len(), 2, "stop retains the last state");

        engine.reset_match().await;
        let reset = engine.state();
        assert!(!reset.running);
        assert!(reset.vehicles.is_empty(), "reset clears the state");
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let engine = engine();
        engine.start_match("simple", "simple").await;
        engine.reset_match().await;
        let mut first = engine.state();
        engine.reset_match().await;
        let mut second = engine.state();
        // timestamps move; everything else must be identical
        first.timestamp_ms = 0;
        second.timestamp_ms = 0;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn stop_and_tick_without_a_match_are_noops() {
        let engine = engine();
        engine.stop_match().await;
        engine.tick().await;
        assert!(!engine.state().running);
    }

    #[test]
    fn state_before_any_match_is_empty() {
        let engine = engine();
        let snapshot = tokio_test::block_on(async { engine.state() });
        assert!(!snapshot.running);
        assert!(snapshot.vehicles.is_empty());
        assert!(snapshot.winner_id.is_none());
    }

    #[tokio::test]
    async fn failed_registration_does_not_block_matches() {
        let engine = engine();
        match engine.register_policy("broken", "struct UserPolicy {").await {
            Ok(outcome) => {
                assert!(!outcome.accepted);
                assert!(!outcome.diagnostics.is_empty());
                let listed = engine.list_policies();
                assert_eq!(listed.len(), 1);
                assert_eq!(listed[0].status, crate::policy::CompileStatus::Failed);
            }
            // toolchain-less environment: the distinct error is the contract
            Err(EngineError::Compile(CompileError::ToolchainUnavailable(_))) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }

        // a match with valid ids starts regardless
        let snapshot = engine.start_match("defensive", "sniper").await;
        assert!(snapshot.running);
        engine.reset_match().await;
    }

    #[tokio::test]
    async fn second_start_replaces_the_running_match() {
        let engine = engine();
        let first = engine.start_match("simple", "simple").await;
        let second = engine.start_match("sniper", "adaptive").await;
        assert_ne!(first.vehicles[0].id, second.vehicles[0].id);
        assert_eq!(engine.state().vehicles[0].policy, "sniper");
        engine.reset_match().await;
    }
}
