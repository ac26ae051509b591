// src/orchestrator.rs

//! Batch executor
//!
//! Streams the filtered update candidates of a manifest and drives them
//! through the package managers:
//!
//! - repository packages pass a per-item disk check and are queued; a full
//!   queue is flushed as one `pacman` invocation
//! - AUR packages are upgraded one by one through the selected helper
//! - local and unknown packages are skipped with an informational entry
//!
//! Whatever is still queued when the stream ends goes out in a final flush.
//! Per-package failures land in the failure ledger and never stop the run;
//! only the safety gate (enforce-mode disk shortfall, required snapshot
//! failure) or a missing helper for an AUR-only run abort early.

use crate::audit::AuditLog;
use crate::error::{Error, Result};
use crate::filter::PackageFilter;
use crate::invoke::Invoker;
use crate::ledger::{FailureLedger, FailureRecord};
use crate::manifest::{AppSource, Manifest, PackageSource, UpdateCandidate};
use crate::safety::{Footprint, SafetyGate, format_bytes};
use serde::Serialize;
use tracing::debug;

/// Fixed-capacity queue of repository packages awaiting one batched upgrade
#[derive(Debug, Clone)]
pub struct BatchQueue {
    capacity: usize,
    items: Vec<String>,
}

impl BatchQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Append a name; refused (returns `false`) when the queue is full
    pub fn push(&mut self, name: impl Into<String>) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push(name.into());
        true
    }

    /// Take every queued name, leaving the queue empty
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.items)
    }
}

/// Which packages a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunScope {
    /// `sync`: every eligible source
    All,
    /// `repo`
    RepoOnly,
    /// `aur`
    HelperOnly,
    /// `update <names...>`
    Targeted(Vec<String>),
    /// `flatpak`, `fwupd`, `apps`: no packages at all
    ApplicationsOnly,
}

/// Inputs of a single run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scope: RunScope,
    pub dry_run: bool,
    pub quiet: bool,
    /// Selected helper; `None` disables AUR upgrades
    pub helper: Option<String>,
    /// Repository packages enabled (`--no-repo` clears it)
    pub repo_enabled: bool,
    /// AUR packages enabled (`--no-aur` clears it)
    pub aur_enabled: bool,
    /// Application sources updated after packages
    pub applications: Vec<AppSource>,
}

impl RunOptions {
    pub fn new(scope: RunScope) -> Self {
        Self {
            scope,
            dry_run: false,
            quiet: false,
            helper: None,
            repo_enabled: true,
            aur_enabled: true,
            applications: Vec::new(),
        }
    }

    fn wants(&self, source: PackageSource) -> bool {
        if self.scope == RunScope::ApplicationsOnly {
            return false;
        }
        match source {
            PackageSource::RepoManaged => {
                self.repo_enabled && self.scope != RunScope::HelperOnly
            }
            PackageSource::HelperManaged => {
                self.aur_enabled && self.scope != RunScope::RepoOnly
            }
            // Only surfaced by broad runs so they can be reported as skipped
            PackageSource::LocalOnly | PackageSource::Unknown => {
                matches!(self.scope, RunScope::All | RunScope::Targeted(_))
            }
        }
    }
}

/// Running totals for packages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub matched: usize,
    /// Upgraded successfully
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// What a dry run would have done for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    pub name: String,
    pub source: PackageSource,
    pub installed_version: String,
    pub target_version: String,
}

/// Result of updating one application source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppOutcome {
    Updated,
    Failed,
    /// Manifest reports no pending updates
    UpToDate,
    Planned,
}

/// Mutable state threaded through every step of a run
#[derive(Debug)]
pub struct OrchestratorState {
    pub queue: BatchQueue,
    pub ledger: FailureLedger,
    pub counts: RunCounts,
    pub batches: usize,
    pub planned: Vec<PlannedAction>,
}

impl OrchestratorState {
    pub fn new(batch_capacity: usize) -> Self {
        Self {
            queue: BatchQueue::new(batch_capacity),
            ledger: FailureLedger::new(),
            counts: RunCounts::default(),
            batches: 0,
            planned: Vec::new(),
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub counts: RunCounts,
    /// Batched `pacman` invocations issued
    pub batches: usize,
    pub failures: Vec<FailureRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<PlannedAction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<(AppSource, AppOutcome)>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Candidates a run covers, in manifest order
fn selected<'m>(
    manifest: &'m Manifest,
    filter: &'m PackageFilter,
    options: &'m RunOptions,
) -> impl Iterator<Item = UpdateCandidate<'m>> + 'm {
    manifest.updatable_entries().filter(move |candidate| {
        if let RunScope::Targeted(names) = &options.scope {
            if !names.iter().any(|n| n == candidate.name) {
                return false;
            }
        }
        options.wants(candidate.source) && filter.matches(candidate.name)
    })
}

/// Drives one run against a manifest
pub struct Orchestrator<'a> {
    manifest: &'a Manifest,
    filter: &'a PackageFilter,
    gate: SafetyGate,
    invoker: &'a mut dyn Invoker,
    log: &'a mut AuditLog,
    batch_capacity: usize,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        manifest: &'a Manifest,
        filter: &'a PackageFilter,
        gate: SafetyGate,
        invoker: &'a mut dyn Invoker,
        log: &'a mut AuditLog,
        batch_capacity: usize,
    ) -> Self {
        Self {
            manifest,
            filter,
            gate,
            invoker,
            log,
            batch_capacity,
        }
    }

    /// Safety gate, for inspecting its final state
    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    /// Execute the run
    pub fn run(&mut self, options: &RunOptions) -> Result<RunReport> {
        let mut state = OrchestratorState::new(self.batch_capacity);
        let manifest = self.manifest;
        let filter = self.filter;

        self.log.info(
            "INIT",
            format!(
                "Run started ({:?}{}), batch size {}",
                options.scope,
                if options.dry_run { ", dry run" } else { "" },
                state.queue.capacity()
            ),
        );

        if let RunScope::Targeted(names) = &options.scope {
            self.report_untargetable(names, &mut state);
        }

        let wants_helper = selected(manifest, filter, options)
            .any(|c| c.source == PackageSource::HelperManaged);
        if wants_helper && options.helper.is_none() {
            if options.scope == RunScope::HelperOnly {
                let err = Error::HelperUnavailable(
                    "none of the known AUR helpers is installed".to_string(),
                );
                self.log.error("AUR", err.to_string());
                self.gate.finish();
                return Err(err);
            }
            self.log.warn(
                "AUR",
                "No AUR helper detected; AUR packages will be skipped",
            );
        }

        // Aggregate check over everything that will actually be attempted
        let required: Footprint = selected(manifest, filter, options)
            .filter(|c| match c.source {
                PackageSource::RepoManaged => true,
                PackageSource::HelperManaged => options.helper.is_some(),
                _ => false,
            })
            .map(|c| c.entry.footprint())
            .sum();

        if let Err(e) = self.gate.pre_check(required.total(), self.log) {
            self.gate.finish();
            return Err(e);
        }
        self.gate
            .pre_snapshot(options.dry_run, &mut *self.invoker, self.log)?;
        self.gate.begin_execution()?;

        for candidate in selected(manifest, filter, options) {
            self.step(candidate, options, &mut state);
        }
        self.flush(&mut state);

        let applications = self.update_applications(options, &mut state);

        let post = self
            .gate
            .post_snapshot(options.dry_run, &mut *self.invoker, self.log);

        self.summarize(options, &state);
        self.gate.finish();
        post?;

        Ok(RunReport {
            dry_run: options.dry_run,
            counts: state.counts,
            batches: state.batches,
            failures: state.ledger.records().to_vec(),
            planned: state.planned,
            applications,
        })
    }

    /// Handle one candidate
    fn step(
        &mut self,
        candidate: UpdateCandidate<'_>,
        options: &RunOptions,
        state: &mut OrchestratorState,
    ) {
        state.counts.matched += 1;
        let name = candidate.name;

        if options.dry_run {
            self.log.info(
                "PLAN",
                format!(
                    "Would upgrade {} {} -> {} ({})",
                    name,
                    candidate.entry.installed_version,
                    candidate.target_version,
                    candidate.source
                ),
            );
            state.planned.push(PlannedAction {
                name: name.to_string(),
                source: candidate.source,
                installed_version: candidate.entry.installed_version.clone(),
                target_version: candidate.target_version.to_string(),
            });
            return;
        }

        match candidate.source {
            PackageSource::RepoManaged => {
                let footprint = candidate.entry.footprint();
                if let Err(e) = self.gate.item_check(name, footprint) {
                    self.fail(state, name, e.to_string());
                    return;
                }
                if state.queue.is_full() {
                    self.flush(state);
                }
                let queued = state.queue.push(name);
                debug_assert!(queued, "batch queue over capacity");
                self.gate.reserve(footprint);
                debug!("Queued {} ({}/{})", name, state.queue.len(), state.queue.capacity());
                if state.queue.is_full() {
                    self.flush(state);
                }
            }
            PackageSource::HelperManaged => {
                let Some(helper) = options.helper.as_deref() else {
                    self.skip(state, name, "no AUR helper available");
                    return;
                };
                if let Err(e) = self.gate.item_check(name, candidate.entry.footprint()) {
                    self.fail(state, name, e.to_string());
                    return;
                }

                self.log.info(
                    "AUR",
                    format!("Upgrading {} to {} via {}", name, candidate.target_version, helper),
                );
                match self.invoker.upgrade_with_helper(helper, name) {
                    Ok(status) if status.is_success() => state.counts.processed += 1,
                    Ok(status) => self.fail(state, name, format!("{} exited with {}", helper, status)),
                    Err(e) => self.fail(state, name, e.to_string()),
                }
            }
            PackageSource::LocalOnly => self.skip(state, name, "local package, managed elsewhere"),
            PackageSource::Unknown => self.skip(state, name, "unknown source, unsupported"),
        }
    }

    /// Upgrade everything queued in one invocation
    fn flush(&mut self, state: &mut OrchestratorState) {
        if state.queue.is_empty() {
            return;
        }
        let batch = state.queue.drain();
        state.batches += 1;

        self.log.info(
            "BATCH",
            format!("Upgrading {} repository package(s): {}", batch.len(), batch.join(" ")),
        );

        let reason = match self.invoker.upgrade_batch(&batch) {
            Ok(status) if status.is_success() => None,
            Ok(status) => Some(format!("batch upgrade failed ({})", status)),
            Err(e) => Some(e.to_string()),
        };

        match reason {
            None => state.counts.processed += batch.len(),
            Some(reason) => {
                for name in &batch {
                    self.fail(state, name, &reason);
                }
            }
        }
        self.gate.release();
    }

    fn update_applications(
        &mut self,
        options: &RunOptions,
        state: &mut OrchestratorState,
    ) -> Vec<(AppSource, AppOutcome)> {
        let mut outcomes = Vec::new();

        for &source in &options.applications {
            let pending = self
                .manifest
                .applications
                .get(source)
                .map(|s| s.update_count);

            let outcome = if pending == Some(0) {
                self.log.info(source.as_str().to_ascii_uppercase().as_str(), format!("No {} updates pending", source));
                AppOutcome::UpToDate
            } else if options.dry_run {
                self.log.info(
                    source.as_str().to_ascii_uppercase().as_str(),
                    format!("Would run {} update", source),
                );
                AppOutcome::Planned
            } else {
                self.update_application(source, state)
            };
            outcomes.push((source, outcome));
        }
        outcomes
    }

    fn update_application(&mut self, source: AppSource, state: &mut OrchestratorState) -> AppOutcome {
        let code = source.as_str().to_ascii_uppercase();
        self.log.info(&code, format!("Updating {} applications", source));

        match self.invoker.update_application(source) {
            Ok(status) if status.is_success() => AppOutcome::Updated,
            Ok(status) => {
                state
                    .ledger
                    .record(source.as_str(), format!("{} update failed ({})", source, status));
                self.log.error(&code, format!("{} update failed ({})", source, status));
                AppOutcome::Failed
            }
            Err(e) => {
                state.ledger.record(source.as_str(), e.to_string());
                self.log.error(&code, e.to_string());
                AppOutcome::Failed
            }
        }
    }

    fn report_untargetable(&mut self, names: &[String], state: &mut OrchestratorState) {
        for name in names {
            match self.manifest.entry_detail(name) {
                None => {
                    self.log.warn("PKG", format!("{} is not in the manifest", name));
                    state.counts.skipped += 1;
                }
                Some(entry) if !entry.update_available => {
                    self.log.info("PKG", format!("{} is already up to date", name));
                    state.counts.skipped += 1;
                }
                Some(_) => {}
            }
        }
    }

    fn fail(&mut self, state: &mut OrchestratorState, name: &str, reason: impl AsRef<str>) {
        let reason = reason.as_ref();
        self.log.error("PKG", format!("{}: {}", name, reason));
        state.ledger.record(name, reason);
        state.counts.failed += 1;
    }

    fn skip(&mut self, state: &mut OrchestratorState, name: &str, reason: &str) {
        self.log.info("SKIP", format!("{}: {}", name, reason));
        state.counts.skipped += 1;
    }

    fn summarize(&mut self, options: &RunOptions, state: &OrchestratorState) {
        state.ledger.summarize(self.log, options.quiet);

        let counts = state.counts;
        self.log.info(
            "SUMMARY",
            format!(
                "matched {}, upgraded {}, failed {}, skipped {}, batches {}{}",
                counts.matched,
                counts.processed,
                counts.failed,
                counts.skipped,
                state.batches,
                if options.dry_run { " (dry run)" } else { "" }
            ),
        );
        if self.gate.disk().reserved() > 0 {
            debug!(
                "{} still reserved at end of run",
                format_bytes(self.gate.disk().reserved())
            );
        }
    }
}
