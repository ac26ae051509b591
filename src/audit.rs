// src/audit.rs

//! Session audit log
//!
//! One append-only file per process, named after the UTC start time
//! (`YYYY-MM-DD_HH-MM-SS.log`). Each line has the shape
//!
//! ```text
//! 2026-01-04T10:00:00Z [INFO] [BATCH] Upgrading 10 package(s)
//! ```
//!
//! File persistence is gated by the configured level threshold. Console echo
//! is gated separately: WARN and ERROR always reach the console (as `tracing`
//! events), every level does when verbose. On finalize a `<log>.hash` sidecar
//! with the SHA-256 of the log is written so the file can be verified later.

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

const LOG_EXTENSION: &str = "log";
const DIGEST_SUFFIX: &str = ".hash";

/// Severity of an audit event; lower is more severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Level {
    Error = 0,
    Warn = 1,
    #[default]
    Info = 2,
    Debug = 3,
}

impl Level {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "0" => Ok(Self::Error),
            "warn" | "warning" | "1" => Ok(Self::Warn),
            "info" | "2" => Ok(Self::Info),
            "debug" | "3" => Ok(Self::Debug),
            other => Err(Error::ConfigInvalid(format!("unknown log level '{}'", other))),
        }
    }
}

/// Session file name, fixed on first use for the life of the process
pub fn session_file_name() -> &'static str {
    static NAME: OnceLock<String> = OnceLock::new();
    NAME.get_or_init(|| format!("{}.{}", Utc::now().format("%Y-%m-%d_%H-%M-%S"), LOG_EXTENSION))
}

/// Audit log for the current session
#[derive(Debug)]
pub struct AuditLog {
    file: Option<File>,
    path: Option<PathBuf>,
    threshold: Level,
    verbose: bool,
    finalized: bool,
}

impl AuditLog {
    /// Open the session log under `dir`
    ///
    /// Falls back to `<tmp>/syn-syu-logs` when `dir` cannot be used, and to
    /// console-only logging when that fails too. Never fails.
    pub fn open(dir: &Path, threshold: Level, verbose: bool) -> Self {
        let fallback = std::env::temp_dir().join("syn-syu-logs");
        Self::open_first(&[dir, fallback.as_path()], threshold, verbose)
    }

    /// Open the session log in the first usable directory
    fn open_first(candidates: &[&Path], threshold: Level, verbose: bool) -> Self {
        for &candidate in candidates {
            match open_session(candidate) {
                Ok((file, path)) => {
                    debug!("Session log: {}", path.display());
                    return Self {
                        file: Some(file),
                        path: Some(path),
                        threshold,
                        verbose,
                        finalized: false,
                    };
                }
                Err(e) => warn!("Cannot use log directory {}: {}", candidate.display(), e),
            }
        }

        warn!("File logging disabled for this session");
        let mut log = Self::disabled(verbose);
        log.threshold = threshold;
        log
    }

    /// Console-only log
    pub fn disabled(verbose: bool) -> Self {
        Self {
            file: None,
            path: None,
            threshold: Level::Info,
            verbose,
            finalized: false,
        }
    }

    /// Path of the session file, if file logging is active
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an event
    pub fn emit(&mut self, level: Level, code: &str, message: impl AsRef<str>) {
        let message = message.as_ref();

        if level <= self.threshold && !self.finalized {
            self.persist(level, code, message);
        }

        if level <= Level::Warn || self.verbose {
            match level {
                Level::Error => error!(code = %code, "{}", message),
                Level::Warn => warn!(code = %code, "{}", message),
                Level::Info => info!(code = %code, "{}", message),
                Level::Debug => debug!(code = %code, "{}", message),
            }
        }
    }

    pub fn error(&mut self, code: &str, message: impl AsRef<str>) {
        self.emit(Level::Error, code, message);
    }

    pub fn warn(&mut self, code: &str, message: impl AsRef<str>) {
        self.emit(Level::Warn, code, message);
    }

    pub fn info(&mut self, code: &str, message: impl AsRef<str>) {
        self.emit(Level::Info, code, message);
    }

    pub fn debug(&mut self, code: &str, message: impl AsRef<str>) {
        self.emit(Level::Debug, code, message);
    }

    fn persist(&mut self, level: Level, code: &str, message: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };

        let line = format!(
            "{} [{}] [{}] {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            level,
            code,
            message
        );
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!("Audit log write failed, disabling file logging: {}", e);
            self.file = None;
        }
    }

    /// Close the log and write its digest sidecar
    ///
    /// Runs once; later calls (including the one from `Drop`) do nothing.
    /// Returns the sidecar path when one was written.
    pub fn finalize(&mut self) -> Option<PathBuf> {
        if self.finalized {
            return None;
        }
        self.finalized = true;

        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let path = self.path.as_ref()?;
        match fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => {}
            _ => return None,
        }

        match write_digest(path) {
            Ok(digest_path) => {
                debug!("Wrote log digest {}", digest_path.display());
                Some(digest_path)
            }
            Err(e) => {
                warn!("Failed to write digest for {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.finalize();
    }
}

fn open_session(dir: &Path) -> io::Result<(File, PathBuf)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(session_file_name());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

/// Sidecar path for a log file (`<log>.hash`)
pub fn digest_path(log: &Path) -> PathBuf {
    let mut name = log.as_os_str().to_os_string();
    name.push(DIGEST_SUFFIX);
    PathBuf::from(name)
}

fn sha256_hex(path: &Path) -> io::Result<String> {
    let data = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_digest(log: &Path) -> io::Result<PathBuf> {
    let digest = sha256_hex(log)?;
    let sidecar = digest_path(log);
    fs::write(&sidecar, format!("{}  {}\n", digest, file_name_lossy(log)))?;
    Ok(sidecar)
}

/// Integrity state of a session log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestStatus {
    Valid,
    Mismatch { expected: String, actual: String },
    /// No sidecar (session still open, or it was empty)
    Missing,
}

impl fmt::Display for DigestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "ok"),
            Self::Mismatch { .. } => write!(f, "MISMATCH"),
            Self::Missing => write!(f, "no digest"),
        }
    }
}

/// Compare a log against its sidecar digest
pub fn verify_digest(log: &Path) -> Result<DigestStatus> {
    let sidecar = digest_path(log);
    let recorded = match fs::read_to_string(&sidecar) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DigestStatus::Missing),
        Err(e) => return Err(e.into()),
    };

    let expected = recorded
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let actual = sha256_hex(log)?;

    if expected == actual {
        Ok(DigestStatus::Valid)
    } else {
        Ok(DigestStatus::Mismatch { expected, actual })
    }
}

/// A session log found on disk
#[derive(Debug, Clone)]
pub struct SessionLog {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Session logs in `dir`, newest first
pub fn list_sessions(dir: &Path) -> Result<Vec<SessionLog>> {
    let mut logs = collect_logs(dir)?;
    logs.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
    Ok(logs)
}

fn collect_logs(dir: &Path) -> Result<Vec<SessionLog>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut logs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        logs.push(SessionLog {
            size: meta.len(),
            modified: meta.modified().unwrap_or_else(|_| SystemTime::now()),
            path,
        });
    }
    Ok(logs)
}

/// Log retention bounds; zero disables a bound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Retention {
    pub max_age_days: u64,
    pub max_total_mb: u64,
}

impl Retention {
    pub fn is_disabled(&self) -> bool {
        self.max_age_days == 0 && self.max_total_mb == 0
    }
}

/// Delete old session logs (and their sidecars)
///
/// First every log older than the age bound goes, then the oldest remaining
/// logs go until the total size is within the size bound. Returns the
/// removed log paths.
pub fn prune(dir: &Path, retention: Retention) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if retention.is_disabled() {
        return Ok(removed);
    }

    let mut logs = collect_logs(dir)?;

    if retention.max_age_days > 0 {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(retention.max_age_days * 24 * 60 * 60))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let (expired, kept): (Vec<_>, Vec<_>) =
            logs.into_iter().partition(|log| log.modified < cutoff);
        for log in expired {
            remove_log(&log.path);
            removed.push(log.path);
        }
        logs = kept;
    }

    if retention.max_total_mb > 0 {
        let cap = retention.max_total_mb.saturating_mul(1024 * 1024);
        logs.sort_by_key(|log| log.modified);

        let mut total: u64 = logs.iter().map(|log| log.size).sum();
        for log in logs {
            if total <= cap {
                break;
            }
            remove_log(&log.path);
            total = total.saturating_sub(log.size);
            removed.push(log.path);
        }
    }

    if !removed.is_empty() {
        debug!("Pruned {} session log(s) from {}", removed.len(), dir.display());
    }
    Ok(removed)
}

fn remove_log(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove old log {}: {}", path.display(), e);
    }
    let _ = fs::remove_file(digest_path(path));
}
