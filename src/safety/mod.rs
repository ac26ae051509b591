// src/safety/mod.rs

//! Safety gate around mutating work
//!
//! Every run passes through the same sequence of checks before and after the
//! package managers are invoked:
//!
//! ```text
//! Idle -> PreCheckPassed | PreCheckFailed
//!      -> (PreSnapshotRan) -> Executing -> (PostSnapshotRan) -> Done
//! ```
//!
//! `PreCheckFailed` is only reached by an enforce-mode aggregate shortfall and
//! leads straight to `Done`. A warn-mode shortfall is logged and counts as
//! passed. Steps taken out of order are rejected with `InvalidState`.

mod disk;
mod snapshot;

pub use disk::{
    DiskGate, Footprint, FsProbe, SpacePolicy, SpaceProbe, SpaceVerdict, format_bytes,
    gb_to_bytes, nearest_existing,
};
pub use snapshot::{HookOutcome, SnapshotHooks, SnapshotPhase};

use crate::audit::AuditLog;
use crate::error::{Error, Result};
use crate::invoke::Invoker;
use tracing::debug;

/// Safety gate phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Nothing checked yet
    Idle,
    /// Aggregate check passed (or shortfall tolerated)
    PreCheckPassed,
    /// Aggregate check failed in enforce mode
    PreCheckFailed,
    /// Pre-snapshot hook ran
    PreSnapshotRan,
    /// Package work in progress
    Executing,
    /// Post-snapshot hook ran
    PostSnapshotRan,
    Done,
}

impl GateState {
    /// Whether moving from `self` to `next` is a legal step
    pub fn can_advance_to(&self, next: GateState) -> bool {
        use GateState::*;
        match (self, next) {
            (Done, _) => false,
            (_, Done) => true,
            (Idle, PreCheckPassed | PreCheckFailed) => true,
            (PreCheckPassed, PreSnapshotRan | Executing) => true,
            (PreSnapshotRan, Executing) => true,
            (Executing, PostSnapshotRan) => true,
            _ => false,
        }
    }
}

/// Disk checks and snapshot hooks for one run
#[derive(Debug)]
pub struct SafetyGate {
    disk: DiskGate,
    hooks: SnapshotHooks,
    state: GateState,
}

impl SafetyGate {
    pub fn new(disk: DiskGate, hooks: SnapshotHooks) -> Self {
        Self {
            disk,
            hooks,
            state: GateState::Idle,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn disk(&self) -> &DiskGate {
        &self.disk
    }

    fn advance(&mut self, next: GateState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::InvalidState(format!(
                "{:?} -> {:?}",
                self.state, next
            )));
        }
        debug!("Safety gate: {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Aggregate disk check over everything selected for the run
    ///
    /// An enforce-mode shortfall fails the check on dry runs as well, so a
    /// preview never lists work the real run would refuse.
    pub fn pre_check(&mut self, required: u64, log: &mut AuditLog) -> Result<SpaceVerdict> {
        if self.state != GateState::Idle {
            return Err(Error::InvalidState(format!(
                "pre-check requested in state {:?}",
                self.state
            )));
        }

        match self.disk.aggregate_check(required) {
            Ok(verdict) => {
                match verdict {
                    SpaceVerdict::Sufficient {
                        required,
                        available,
                    } => log.info(
                        "DISK",
                        format!(
                            "Space OK on {}: need {}, available {}",
                            self.disk.path().display(),
                            format_bytes(required),
                            format_bytes(available)
                        ),
                    ),
                    SpaceVerdict::Shortfall {
                        required,
                        available,
                    } => log.warn(
                        "DISK",
                        format!(
                            "Insufficient space on {}: need {}, only {} available; continuing (policy {})",
                            self.disk.path().display(),
                            format_bytes(required),
                            format_bytes(available),
                            self.disk.policy()
                        ),
                    ),
                    SpaceVerdict::Unknown => log.warn(
                        "DISK",
                        format!(
                            "Unable to determine free space on {}; skipping aggregate check",
                            self.disk.path().display()
                        ),
                    ),
                }
                self.advance(GateState::PreCheckPassed)?;
                Ok(verdict)
            }
            Err(e) => {
                log.error("DISK", e.to_string());
                self.advance(GateState::PreCheckFailed)?;
                Err(e)
            }
        }
    }

    /// Run the pre-snapshot hook; skipped entirely on dry runs
    pub fn pre_snapshot(
        &mut self,
        dry_run: bool,
        invoker: &mut dyn Invoker,
        log: &mut AuditLog,
    ) -> Result<HookOutcome> {
        if self.state != GateState::PreCheckPassed {
            return Err(Error::InvalidState(format!(
                "pre-snapshot requested in state {:?}",
                self.state
            )));
        }
        self.run_hook(SnapshotPhase::Pre, GateState::PreSnapshotRan, dry_run, invoker, log)
    }

    /// Enter the execution phase
    pub fn begin_execution(&mut self) -> Result<()> {
        self.advance(GateState::Executing)
    }

    /// Per-package space check; see `DiskGate::item_check`
    pub fn item_check(&self, name: &str, footprint: Footprint) -> std::result::Result<(), Error> {
        self.disk.item_check(name, footprint)
    }

    pub fn reserve(&mut self, footprint: Footprint) {
        self.disk.reserve(footprint);
    }

    pub fn release(&mut self) {
        self.disk.release();
    }

    /// Run the post-snapshot hook; skipped on dry runs
    pub fn post_snapshot(
        &mut self,
        dry_run: bool,
        invoker: &mut dyn Invoker,
        log: &mut AuditLog,
    ) -> Result<HookOutcome> {
        if self.state != GateState::Executing {
            return Err(Error::InvalidState(format!(
                "post-snapshot requested in state {:?}",
                self.state
            )));
        }
        self.run_hook(SnapshotPhase::Post, GateState::PostSnapshotRan, dry_run, invoker, log)
    }

    /// Close the gate; further steps are rejected
    pub fn finish(&mut self) {
        if self.state != GateState::Done {
            debug!("Safety gate: {:?} -> Done", self.state);
            self.state = GateState::Done;
        }
    }

    fn run_hook(
        &mut self,
        phase: SnapshotPhase,
        ran: GateState,
        dry_run: bool,
        invoker: &mut dyn Invoker,
        log: &mut AuditLog,
    ) -> Result<HookOutcome> {
        if dry_run {
            if self.hooks.command(phase).is_some() {
                log.info("SNAPSHOT", format!("Dry run: skipping {}-snapshot hook", phase));
            }
            return Ok(HookOutcome::NotConfigured);
        }

        match self.hooks.run(phase, invoker, log) {
            Ok(HookOutcome::NotConfigured) => Ok(HookOutcome::NotConfigured),
            Ok(outcome) => {
                self.advance(ran)?;
                Ok(outcome)
            }
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }
}
