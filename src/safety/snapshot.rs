// src/safety/snapshot.rs

//! Pre/post snapshot hooks

use crate::audit::AuditLog;
use crate::error::{Error, Result};
use crate::invoke::Invoker;
use std::fmt;

/// When a hook runs relative to package work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPhase {
    Pre,
    Post,
}

impl fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// Result of running one hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// No command configured for the phase
    NotConfigured,
    Succeeded,
    /// Failed, tolerated because success is not required
    Failed,
}

/// Configured snapshot commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotHooks {
    pub pre: Option<String>,
    pub post: Option<String>,
    pub require_success: bool,
}

impl SnapshotHooks {
    pub fn command(&self, phase: SnapshotPhase) -> Option<&str> {
        let command = match phase {
            SnapshotPhase::Pre => self.pre.as_deref(),
            SnapshotPhase::Post => self.post.as_deref(),
        };
        command.map(str::trim).filter(|c| !c.is_empty())
    }

    /// Run the hook for `phase`
    ///
    /// A failure is always logged. With `require_success` it becomes
    /// `SnapshotFailed`, which the caller must treat as fatal.
    pub fn run(
        &self,
        phase: SnapshotPhase,
        invoker: &mut dyn Invoker,
        log: &mut AuditLog,
    ) -> Result<HookOutcome> {
        let Some(command) = self.command(phase) else {
            return Ok(HookOutcome::NotConfigured);
        };

        log.info("SNAPSHOT", format!("Running {}-snapshot hook: {}", phase, command));

        let detail = match invoker.run_hook(command) {
            Ok(status) if status.is_success() => {
                log.info("SNAPSHOT", format!("{}-snapshot hook completed", phase));
                return Ok(HookOutcome::Succeeded);
            }
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        };

        log.error(
            "SNAPSHOT",
            format!("{}-snapshot hook failed: {}", phase, detail),
        );

        if self.require_success {
            return Err(Error::SnapshotFailed { phase, detail });
        }
        Ok(HookOutcome::Failed)
    }
}
