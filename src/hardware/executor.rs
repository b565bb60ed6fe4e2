//! Command Executors
//!
//! `SystemExecutor` runs probe commands on the node. `ScriptedExecutor`
//! answers them from a fixed table so planners can be exercised without
//! touching real disks.

use crate::domain::ports::CommandExecutor;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{debug, warn};

// =============================================================================
// System Executor
// =============================================================================

/// Runs commands with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(
        &self,
        debug: bool,
        action_name: &str,
        command: &str,
        args: &[&str],
    ) -> Result<String> {
        let owned_args = || args.iter().map(|a| a.to_string()).collect::<Vec<_>>();

        debug!(action = action_name, command, ?args, "running command");

        let output = Command::new(command)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::ProbeCommand {
                command: command.to_string(),
                args: owned_args(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(action = action_name, command, status = %output.status, "command failed");
            return Err(Error::ProbeCommand {
                command: command.to_string(),
                args: owned_args(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if debug {
            debug!(action = action_name, output = %stdout, "command output");
        }
        Ok(stdout)
    }
}

// =============================================================================
// Scripted Executor
// =============================================================================

#[derive(Debug, Clone)]
enum ScriptedResponse {
    Output(String),
    Fail(String),
}

#[derive(Debug, Clone)]
struct ScriptedRule {
    /// Full action name, or an action prefix when `any_target` is set
    action: String,
    any_target: bool,
    response: ScriptedResponse,
}

/// Table-driven executor keyed by action name
///
/// Rules are matched in insertion order; exact `"<action> <target>"` rules
/// registered with [`on`](Self::on) win over catch-alls registered with
/// [`otherwise`](Self::otherwise) regardless of order. Unscripted actions fail.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Vec<ScriptedRule>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `"<action> <target>"` with `output`
    pub fn on(mut self, action: &str, target: &str, output: &str) -> Self {
        self.rules.push(ScriptedRule {
            action: format!("{} {}", action, target),
            any_target: false,
            response: ScriptedResponse::Output(output.to_string()),
        });
        self
    }

    /// Answer `action` for any target without a more specific rule
    pub fn otherwise(mut self, action: &str, output: &str) -> Self {
        self.rules.push(ScriptedRule {
            action: action.to_string(),
            any_target: true,
            response: ScriptedResponse::Output(output.to_string()),
        });
        self
    }

    /// Fail `"<action> <target>"` with `reason`
    pub fn fail(mut self, action: &str, target: &str, reason: &str) -> Self {
        self.rules.push(ScriptedRule {
            action: format!("{} {}", action, target),
            any_target: false,
            response: ScriptedResponse::Fail(reason.to_string()),
        });
        self
    }

    /// Action names seen so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn lookup(&self, action_name: &str) -> Option<&ScriptedResponse> {
        let exact = self
            .rules
            .iter()
            .find(|r| !r.any_target && r.action == action_name);
        exact
            .or_else(|| {
                self.rules.iter().find(|r| {
                    r.any_target
                        && action_name
                            .strip_prefix(r.action.as_str())
                            .is_some_and(|rest| rest.starts_with(' '))
                })
            })
            .map(|r| &r.response)
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(
        &self,
        _debug: bool,
        action_name: &str,
        command: &str,
        args: &[&str],
    ) -> Result<String> {
        self.calls.lock().push(action_name.to_string());

        let owned_args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        match self.lookup(action_name) {
            Some(ScriptedResponse::Output(out)) => Ok(out.clone()),
            Some(ScriptedResponse::Fail(reason)) => Err(Error::ProbeCommand {
                command: command.to_string(),
                args: owned_args,
                reason: reason.clone(),
            }),
            None => Err(Error::ProbeCommand {
                command: command.to_string(),
                args: owned_args,
                reason: format!("unscripted action {:?}", action_name),
            }),
        }
    }
}
