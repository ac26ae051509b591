// src/commands/run.rs
//! Update runs: `sync`, `aur`, `repo`, `update`, `flatpak`, `fwupd`, `apps`

use anyhow::Result;
use std::io::{self, BufRead, Write};
use synsyu::audit::{self, AuditLog};
use synsyu::config::Settings;
use synsyu::invoke::{self, SystemInvoker};
use synsyu::manifest::{self, AppSource};
use synsyu::orchestrator::{AppOutcome, Orchestrator, RunOptions, RunReport, RunScope};
use synsyu::safety::{DiskGate, FsProbe, SafetyGate};
use synsyu::{Error, exit, helper};
use tracing::{debug, warn};

/// Execute one update run
///
/// The session log is finalized on every path out of the run, including
/// fatal errors, so its digest always covers what was written.
pub fn cmd_run(settings: &Settings, scope: RunScope, applications: Vec<AppSource>) -> Result<u8> {
    if !settings.retention.is_disabled() {
        match audit::prune(&settings.log_dir, settings.retention) {
            Ok(removed) if !removed.is_empty() => {
                debug!("Pruned {} old session log(s)", removed.len());
            }
            Ok(_) => {}
            Err(e) => warn!("Log pruning failed: {}", e),
        }
    }

    let mut log = AuditLog::open(&settings.log_dir, settings.log_level, settings.verbose);
    let result = execute(settings, scope, applications, &mut log);

    match &result {
        Ok(report) => {
            if settings.json {
                println!("{}", serde_json::to_string_pretty(report)?);
            } else if !settings.quiet {
                print_report(report);
            }
        }
        Err(e) => log.error("FATAL", e.to_string()),
    }

    let log_path = log.path().map(|p| p.to_path_buf());
    log.finalize();
    if let Some(path) = log_path.filter(|_| !settings.quiet && !settings.json) {
        println!("Log: {}", path.display());
    }

    let report = result?;
    if settings.strict && report.has_failures() {
        Ok(exit::PACKAGE_FAILURES)
    } else {
        Ok(exit::SUCCESS)
    }
}

fn execute(
    settings: &Settings,
    scope: RunScope,
    applications: Vec<AppSource>,
    log: &mut AuditLog,
) -> synsyu::Result<RunReport> {
    match &settings.config_path {
        Some(path) => log.info("CONFIG", format!("Using configuration {}", path.display())),
        None => log.info("CONFIG", "Using built-in defaults"),
    }

    if settings.rebuild {
        let command = settings.rebuild_command.as_deref().ok_or_else(|| {
            Error::ConfigInvalid("--rebuild needs core.rebuild_command to be set".to_string())
        })?;
        log.info("MANIFEST", format!("Rebuilding manifest: {}", command));
        invoke::rebuild_manifest(command, &settings.manifest_path)?;
    }

    let manifest = manifest::load(&settings.manifest_path)?;
    log.info(
        "MANIFEST",
        format!(
            "Loaded {} ({} packages, {} updates)",
            settings.manifest_path.display(),
            manifest.len(),
            manifest.metadata.updates_available
        ),
    );

    let filter = settings.filter()?;

    let helper = if scope == RunScope::ApplicationsOnly || settings.no_aur {
        None
    } else {
        let detected = helper::detect();
        helper::select(&detected, &settings.helper_priority, settings.forced_helper.as_deref())
    };
    if let Some(name) = &helper {
        log.info("AUR", format!("Using AUR helper {}", name));
    }

    let gate = SafetyGate::new(
        DiskGate::new(
            Box::new(FsProbe),
            settings.space_check_path.clone(),
            settings.min_free_bytes,
            settings.space_policy,
        ),
        settings.snapshots.clone(),
    );

    let options = RunOptions {
        scope,
        dry_run: settings.dry_run,
        quiet: settings.quiet || settings.json,
        helper,
        repo_enabled: !settings.no_repo,
        aur_enabled: !settings.no_aur,
        applications,
    };

    if settings.confirm && !settings.dry_run && !confirm_start()? {
        log.warn("ABORT", "Run declined at confirmation prompt");
        return Ok(RunReport {
            dry_run: false,
            counts: Default::default(),
            batches: 0,
            failures: Vec::new(),
            planned: Vec::new(),
            applications: Vec::new(),
        });
    }

    let mut invoker = SystemInvoker::new(settings.privilege_command.clone(), settings.confirm);
    Orchestrator::new(&manifest, &filter, gate, &mut invoker, log, settings.batch_size).run(&options)
}

fn confirm_start() -> synsyu::Result<bool> {
    eprint!("Proceed with the update run? [y/N] ");
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_report(report: &RunReport) {
    let counts = report.counts;

    if report.dry_run {
        if report.planned.is_empty() {
            println!("Nothing to upgrade.");
        } else {
            println!("Planned upgrades ({}):", report.planned.len());
            for action in &report.planned {
                println!(
                    "  {} {} -> {} [{}]",
                    action.name, action.installed_version, action.target_version, action.source
                );
            }
        }
    } else {
        println!(
            "Upgraded {} package(s) in {} batch(es); {} failed, {} skipped",
            counts.processed, report.batches, counts.failed, counts.skipped
        );
    }

    for (source, outcome) in &report.applications {
        let state = match outcome {
            AppOutcome::Updated => "updated",
            AppOutcome::Failed => "FAILED",
            AppOutcome::UpToDate => "up to date",
            AppOutcome::Planned => "would update",
        };
        println!("  {}: {}", source, state);
    }
}
