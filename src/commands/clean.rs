// src/commands/clean.rs
//! `clean`: prune session logs, drop stale package cache, remove orphans

use anyhow::Result;
use serde::Serialize;
use synsyu::audit::{self, AuditLog};
use synsyu::config::Settings;
use synsyu::exit;
use synsyu::invoke::{self, InvocationStatus, SystemInvoker};

/// The two pacman operations `clean` performs
trait Housekeeping {
    fn clean_cache(&mut self) -> synsyu::Result<InvocationStatus>;
    fn remove_packages(&mut self, packages: &[String]) -> synsyu::Result<InvocationStatus>;
}

impl Housekeeping for SystemInvoker {
    fn clean_cache(&mut self) -> synsyu::Result<InvocationStatus> {
        SystemInvoker::clean_cache(self)
    }

    fn remove_packages(&mut self, packages: &[String]) -> synsyu::Result<InvocationStatus> {
        SystemInvoker::remove_packages(self, packages)
    }
}

#[derive(Debug, Default, Serialize)]
struct CleanReport {
    dry_run: bool,
    pruned_logs: Vec<String>,
    orphans: Vec<String>,
    cache_cleaned: bool,
    orphans_removed: bool,
    failures: Vec<String>,
}

/// Run the maintenance steps
///
/// A failing step is logged and the remaining steps still run. Failures only
/// change the exit status under `--strict`.
pub fn cmd_clean(settings: &Settings) -> Result<u8> {
    let mut report = CleanReport {
        dry_run: settings.dry_run,
        ..Default::default()
    };

    // Prune before opening the new session so it is never a candidate
    if !settings.retention.is_disabled() {
        match audit::prune(&settings.log_dir, settings.retention) {
            Ok(removed) => {
                report.pruned_logs = removed.iter().map(|p| p.display().to_string()).collect();
            }
            Err(e) => report.failures.push(format!("log pruning: {}", e)),
        }
    }

    let mut log = AuditLog::open(&settings.log_dir, settings.log_level, settings.verbose);
    for failure in &report.failures {
        log.warn("CLEAN", failure);
    }
    if !report.pruned_logs.is_empty() {
        log.info("CLEAN", format!("Pruned {} session log(s)", report.pruned_logs.len()));
    }

    let orphans = match invoke::list_orphans() {
        Ok(orphans) => Some(orphans),
        Err(e) => {
            log.warn("CLEAN", e.to_string());
            report.failures.push(e.to_string());
            None
        }
    };

    let mut invoker = SystemInvoker::new(settings.privilege_command.clone(), settings.confirm);
    clean_packages(&mut report, orphans, &mut invoker, &mut log);

    if settings.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !settings.quiet {
        print_report(&report);
    }
    log.finalize();

    if settings.strict && !report.failures.is_empty() {
        Ok(exit::PACKAGE_FAILURES)
    } else {
        Ok(exit::SUCCESS)
    }
}

/// Cache clean, then orphan removal; dry runs only record the orphans
fn clean_packages(
    report: &mut CleanReport,
    orphans: Option<Vec<String>>,
    invoker: &mut dyn Housekeeping,
    log: &mut AuditLog,
) {
    let orphans = orphans.unwrap_or_default();
    report.orphans = orphans.clone();

    if report.dry_run {
        log.info("CLEAN", "Dry run: would clean the package cache");
        if !orphans.is_empty() {
            log.info("CLEAN", format!("Dry run: would remove {}", orphans.join(" ")));
        }
        return;
    }

    match invoker.clean_cache() {
        Ok(status) if status.is_success() => {
            report.cache_cleaned = true;
            log.info("CLEAN", "Package cache cleaned");
        }
        Ok(status) => record_failure(report, log, format!("cache clean: {}", status)),
        Err(e) => record_failure(report, log, format!("cache clean: {}", e)),
    }

    if orphans.is_empty() {
        log.info("CLEAN", "No orphaned packages");
        return;
    }
    match invoker.remove_packages(&orphans) {
        Ok(status) if status.is_success() => {
            report.orphans_removed = true;
            log.info("CLEAN", format!("Removed {} orphan(s): {}", orphans.len(), orphans.join(" ")));
        }
        Ok(status) => record_failure(report, log, format!("orphan removal: {}", status)),
        Err(e) => record_failure(report, log, format!("orphan removal: {}", e)),
    }
}

fn record_failure(report: &mut CleanReport, log: &mut AuditLog, reason: String) {
    log.error("CLEAN", &reason);
    report.failures.push(reason);
}

fn print_report(report: &CleanReport) {
    if !report.pruned_logs.is_empty() {
        println!("Pruned {} session log(s)", report.pruned_logs.len());
    }
    if report.orphans.is_empty() {
        println!("No orphaned packages");
    } else if report.dry_run {
        println!("Would remove orphans: {}", report.orphans.join(" "));
    } else if report.orphans_removed {
        println!("Removed orphans: {}", report.orphans.join(" "));
    }
    if report.dry_run {
        println!("Would clean the package cache");
    } else if report.cache_cleaned {
        println!("Package cache cleaned");
    }
    for failure in &report.failures {
        println!("FAILED: {}", failure);
    }
}
