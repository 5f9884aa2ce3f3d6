//! Policy registry - built-in tactics plus dynamically registered ones
//!
//! Registration records are never silently discarded: a submission that
//! fails to compile stays listed as `Failed` with its diagnostics so an
//! operator can see why.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::dynamic::{CompileError, PluginArtifact, PolicyCompiler};
use super::{tactics, Policy};

/// Lifecycle of a registered submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStatus {
    Pending,
    Compiled,
    Failed,
}

impl std::fmt::Display for CompileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileStatus::Pending => write!(f, "pending"),
            CompileStatus::Compiled => write!(f, "compiled"),
            CompileStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A registered submission and everything known about it
pub struct PolicyRecord {
    pub name: String,
    pub source: String,
    pub status: CompileStatus,
    pub diagnostics: String,
    artifact: Option<Arc<PluginArtifact>>,
}

/// What `register` reports back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterOutcome {
    pub accepted: bool,
    pub diagnostics: String,
}

/// One row of `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyInfo {
    pub name: String,
    pub status: CompileStatus,
    pub diagnostics: String,
}

/// Registry of dynamically submitted policies
pub struct PolicyRegistry {
    customs: DashMap<String, PolicyRecord>,
    compiler: PolicyCompiler,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            customs: DashMap::new(),
            compiler: PolicyCompiler::default(),
        }
    }

    /// Compile and store a submission under `name`.
    ///
    /// The record is stored immediately as `Pending` and transitions to
    /// `Compiled` or `Failed`; failed records are kept, diagnostics and
    /// all. Re-registering a name replaces the previous record (and with it
    /// the previous library and build directory). A missing toolchain is
    /// returned as a distinct error and leaves the record `Pending` so the
    /// submission can be retried once the toolchain exists.
    pub fn register(&self, name: &str, source: &str) -> Result<RegisterOutcome, CompileError> {
        self.customs.insert(
            name.to_string(),
            PolicyRecord {
                name: name.to_string(),
                source: source.to_string(),
                status: CompileStatus::Pending,
                diagnostics: String::new(),
                artifact: None,
            },
        );

        match self.compiler.compile(source) {
            Ok(artifact) => {
                if let Some(mut record) = self.customs.get_mut(name) {
                    record.status = CompileStatus::Compiled;
                    record.diagnostics.clear();
                    record.artifact = Some(artifact);
                }
                info!(policy = name, "dynamic policy registered");
                Ok(RegisterOutcome {
                    accepted: true,
                    diagnostics: String::new(),
                })
            }
            Err(e @ CompileError::ToolchainUnavailable(_)) => {
                if let Some(mut record) = self.customs.get_mut(name) {
                    record.diagnostics = e.to_string();
                }
                warn!(policy = name, error = %e, "toolchain unavailable");
                Err(e)
            }
            Err(CompileError::Build { diagnostics }) => {
                if let Some(mut record) = self.customs.get_mut(name) {
                    record.status = CompileStatus::Failed;
                    record.diagnostics = diagnostics.clone();
                }
                warn!(policy = name, "dynamic policy failed to compile");
                Ok(RegisterOutcome {
                    accepted: false,
                    diagnostics,
                })
            }
            Err(e) => {
                let diagnostics = e.to_string();
                if let Some(mut record) = self.customs.get_mut(name) {
                    record.status = CompileStatus::Failed;
                    record.diagnostics = diagnostics.clone();
                }
                warn!(policy = name, error = %diagnostics, "dynamic policy failed to load");
                Ok(RegisterOutcome {
                    accepted: false,
                    diagnostics,
                })
            }
        }
    }

    /// A fresh instance of a registered policy, only while `Compiled`
    pub fn resolve(&self, name: &str) -> Option<Box<dyn Policy>> {
        let record = self.customs.get(name)?;
        if record.status != CompileStatus::Compiled {
            return None;
        }
        let artifact = record.artifact.as_ref()?;
        match PluginArtifact::instantiate(artifact) {
            Ok(policy) => Some(Box::new(policy)),
            Err(e) => {
                warn!(policy = name, error = %e, "failed to instantiate registered policy");
                None
            }
        }
    }

    /// A fresh instance of a built-in tactic
    pub fn resolve_builtin(&self, name: &str) -> Option<Box<dyn Policy>> {
        tactics::builtin(name)
    }

    /// All registered submissions with their statuses
    pub fn list(&self) -> Vec<PolicyInfo> {
        let mut infos: Vec<PolicyInfo> = self
            .customs
            .iter()
            .map(|entry| PolicyInfo {
                name: entry.name.clone(),
                status: entry.status,
                diagnostics: entry.diagnostics.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn delete(&self, name: &str) -> bool {
        self.customs.remove(name).is_some()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
