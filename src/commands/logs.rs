// src/commands/logs.rs
//! `log`: recent session logs and their digests

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use synsyu::audit::{self, DigestStatus};
use synsyu::config::Settings;
use synsyu::exit;
use synsyu::safety::format_bytes;

#[derive(Debug, Serialize)]
struct SessionRow {
    path: String,
    size: u64,
    modified: String,
    digest: String,
}

/// List the newest `limit` sessions
///
/// With `verify`, every listed log is checked against its sidecar and a
/// mismatch makes the command exit with status 1.
pub fn cmd_log(settings: &Settings, verify: bool, limit: usize) -> Result<u8> {
    let sessions = audit::list_sessions(&settings.log_dir)?;

    let mut rows = Vec::new();
    let mut tampered = 0usize;
    for session in sessions.into_iter().take(limit) {
        let digest = if verify {
            let status = audit::verify_digest(&session.path)?;
            if matches!(status, DigestStatus::Mismatch { .. }) {
                tampered += 1;
            }
            status.to_string()
        } else if audit::digest_path(&session.path).exists() {
            "present".to_string()
        } else {
            DigestStatus::Missing.to_string()
        };

        let modified: DateTime<Local> = session.modified.into();
        rows.push(SessionRow {
            path: session.path.display().to_string(),
            size: session.size,
            modified: modified.format("%Y-%m-%d %H:%M:%S").to_string(),
            digest,
        });
    }

    if settings.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No session logs in {}", settings.log_dir.display());
    } else {
        println!("Session logs in {}:", settings.log_dir.display());
        for row in &rows {
            println!(
                "  {}  {:>10}  [{}]  {}",
                row.modified,
                format_bytes(row.size),
                row.digest,
                row.path
            );
        }
    }

    if tampered > 0 {
        if !settings.json {
            eprintln!("{} log(s) failed digest verification", tampered);
        }
        Ok(exit::PACKAGE_FAILURES)
    } else {
        Ok(exit::SUCCESS)
    }
}
