// tests/integration_test.rs

//! Integration tests for Syn-Syu
//!
//! These tests drive full runs from a manifest file on disk through the
//! orchestrator, with a recording invoker standing in for the managers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use synsyu::audit::{self, AuditLog, DigestStatus, Level, Retention};
use synsyu::config::{self, ConfigLayer};
use synsyu::filter::PackageFilter;
use synsyu::invoke::{InvocationStatus, Invoker};
use synsyu::manifest::{self, AppSource};
use synsyu::orchestrator::{AppOutcome, Orchestrator, RunOptions, RunScope};
use synsyu::safety::{DiskGate, SafetyGate, SnapshotHooks, SpacePolicy, SpaceProbe};
use synsyu::{Error, exit};

const GIB: u64 = 1024 * 1024 * 1024;

const MANIFEST: &str = r#"{
  "metadata": {
    "generated_at": "2026-10-18T08:00:00Z",
    "generated_by": "syn-syu-core"
  },
  "packages": {
    "linux":      { "source": "PACMAN", "installed_version": "6.9.1", "newer_version": "6.9.2", "update_available": true, "download_size": 150000000 },
    "mesa":       { "source": "PACMAN", "installed_version": "24.1", "newer_version": "24.2", "update_available": true },
    "firefox":    { "source": "PACMAN", "installed_version": "128", "newer_version": "129", "update_available": true },
    "bash":       { "source": "PACMAN", "installed_version": "5.2", "newer_version": "5.2", "update_available": false },
    "paru-bin":   { "source": "AUR", "installed_version": "2.0.3", "newer_version": "2.0.4", "update_available": true, "build_size": 4000000 },
    "my-scripts": { "source": "LOCAL", "installed_version": "1", "update_available": true }
  },
  "applications": {
    "flatpak": { "enabled": true, "update_count": 2, "updates": [ { "application": "org.gimp.GIMP" }, { "application": "org.mozilla.Thunderbird" } ] },
    "fwupd": { "enabled": true, "update_count": 0 }
  }
}"#;

struct FixedProbe(u64);

impl SpaceProbe for FixedProbe {
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

#[derive(Debug, Default)]
struct Recorder {
    batches: Vec<Vec<String>>,
    helpers: Vec<String>,
    applications: Vec<AppSource>,
    hooks: Vec<String>,
    fail_batches: bool,
}

impl Invoker for Recorder {
    fn upgrade_batch(&mut self, packages: &[String]) -> synsyu::Result<InvocationStatus> {
        self.batches.push(packages.to_vec());
        Ok(if self.fail_batches {
            InvocationStatus::from_code(1)
        } else {
            InvocationStatus::success()
        })
    }

    fn upgrade_with_helper(&mut self, _helper: &str, package: &str) -> synsyu::Result<InvocationStatus> {
        self.helpers.push(package.to_string());
        Ok(InvocationStatus::success())
    }

    fn update_application(&mut self, source: AppSource) -> synsyu::Result<InvocationStatus> {
        self.applications.push(source);
        Ok(InvocationStatus::success())
    }

    fn run_hook(&mut self, command: &str) -> synsyu::Result<InvocationStatus> {
        self.hooks.push(command.to_string());
        Ok(InvocationStatus::success())
    }
}

fn write_manifest(dir: &Path) -> PathBuf {
    let path = dir.join("syn-syu_manifest.json");
    fs::write(&path, MANIFEST).unwrap();
    path
}

fn gate(available: u64, policy: SpacePolicy, hooks: SnapshotHooks) -> SafetyGate {
    SafetyGate::new(
        DiskGate::new(Box::new(FixedProbe(available)), PathBuf::from("/"), 2 * GIB, policy),
        hooks,
    )
}

#[test]
fn test_sync_run_from_manifest_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let manifest_path = write_manifest(temp_dir.path());
    let log_dir = temp_dir.path().join("logs");

    let manifest = manifest::load(&manifest_path).unwrap();
    assert_eq!(manifest.len(), 6);

    let hooks = SnapshotHooks {
        pre: Some("snapper create --type pre".to_string()),
        post: Some("snapper create --type post".to_string()),
        require_success: true,
    };
    let filter = PackageFilter::new(&[], &["^firefox$".to_string()]).unwrap();
    let mut invoker = Recorder::default();
    let mut log = AuditLog::open(&log_dir, Level::Info, false);

    let options = RunOptions {
        helper: Some("paru".to_string()),
        applications: vec![AppSource::Flatpak, AppSource::Fwupd],
        ..RunOptions::new(RunScope::All)
    };
    let report = Orchestrator::new(
        &manifest,
        &filter,
        gate(100 * GIB, SpacePolicy::Enforce, hooks),
        &mut invoker,
        &mut log,
        2,
    )
    .run(&options)
    .unwrap();

    assert_eq!(invoker.batches, vec![vec!["linux".to_string(), "mesa".to_string()]]);
    assert_eq!(invoker.helpers, vec!["paru-bin".to_string()]);
    assert_eq!(invoker.hooks.len(), 2);
    assert_eq!(invoker.applications, vec![AppSource::Flatpak]);
    assert_eq!(
        report.applications,
        vec![
            (AppSource::Flatpak, AppOutcome::Updated),
            (AppSource::Fwupd, AppOutcome::UpToDate),
        ]
    );
    assert_eq!(report.counts.processed, 3);
    assert_eq!(report.counts.skipped, 1);
    assert!(!report.has_failures());

    // Session log is sealed with a matching digest
    let log_path = log.path().unwrap().to_path_buf();
    log.finalize();
    assert_eq!(audit::verify_digest(&log_path).unwrap(), DigestStatus::Valid);

    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("[BATCH]"));
    assert!(contents.contains("[SUMMARY]"));
}

#[test]
fn test_failed_batch_is_recorded_and_run_completes() {
    let temp_dir = tempfile::tempdir().unwrap();
    let manifest = manifest::load(&write_manifest(temp_dir.path())).unwrap();

    let mut invoker = Recorder {
        fail_batches: true,
        ..Recorder::default()
    };
    let mut log = AuditLog::disabled(false);
    let options = RunOptions::new(RunScope::RepoOnly);

    let report = Orchestrator::new(
        &manifest,
        &PackageFilter::default(),
        gate(100 * GIB, SpacePolicy::Warn, SnapshotHooks::default()),
        &mut invoker,
        &mut log,
        10,
    )
    .run(&options)
    .unwrap();

    assert_eq!(invoker.batches.len(), 1);
    assert_eq!(report.counts.failed, 3);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.package.as_str()).collect();
    assert_eq!(failed, vec!["firefox", "linux", "mesa"]);
    assert!(report.failures[0].reason.contains("exit status 1"));
}

#[test]
fn test_enforced_shortfall_stops_before_anything_runs() {
    let temp_dir = tempfile::tempdir().unwrap();
    let manifest = manifest::load(&write_manifest(temp_dir.path())).unwrap();

    let hooks = SnapshotHooks {
        pre: Some("snapshot".to_string()),
        post: None,
        require_success: false,
    };
    let mut invoker = Recorder::default();
    let mut log = AuditLog::disabled(false);
    let options = RunOptions {
        helper: Some("paru".to_string()),
        ..RunOptions::new(RunScope::All)
    };

    let err = Orchestrator::new(
        &manifest,
        &PackageFilter::default(),
        gate(GIB, SpacePolicy::Enforce, hooks),
        &mut invoker,
        &mut log,
        10,
    )
    .run(&options)
    .unwrap_err();

    assert!(matches!(err, Error::DiskInsufficient { .. }));
    assert_eq!(err.exit_code(), exit::EXECUTION);
    assert!(invoker.batches.is_empty());
    assert!(invoker.hooks.is_empty());
}

#[test]
fn test_missing_manifest_is_manifest_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let err = manifest::load(&temp_dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::ManifestMissing(_)));
    assert_eq!(err.exit_code(), exit::MANIFEST);
}

#[test]
fn test_config_file_and_cli_layers() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[core]\nbatch_size = 4\ndry_run = true\n\n[space]\npolicy = \"enforce\"\n",
    )
    .unwrap();

    let mut cli = ConfigLayer::default();
    cli.core.batch_size = Some(7);

    let settings = config::resolve(cli, Some(&config_path), |key| match key {
        "SYNSYU_BATCH_SIZE" => Some("2".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(settings.batch_size, 7);
    assert!(settings.dry_run);
    assert_eq!(settings.space_policy, SpacePolicy::Enforce);
    assert_eq!(settings.config_path.as_deref(), Some(config_path.as_path()));
}

#[test]
fn test_log_retention_keeps_newest_sessions() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = temp_dir.path();

    let now = std::time::SystemTime::now();
    for (i, name) in ["2026-01-01_00-00-00.log", "2026-10-18_00-00-00.log"].iter().enumerate() {
        let path = dir.join(name);
        fs::write(&path, vec![b'x'; 1024]).unwrap();
        let age = std::time::Duration::from_secs(86_400 * if i == 0 { 300 } else { 1 });
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(now - age)
            .unwrap();
    }

    let removed = audit::prune(
        dir,
        Retention {
            max_age_days: 30,
            max_total_mb: 0,
        },
    )
    .unwrap();
    assert_eq!(removed, vec![dir.join("2026-01-01_00-00-00.log")]);

    let remaining = audit::list_sessions(dir).unwrap();
    assert_eq!(remaining.len(), 1);
}
