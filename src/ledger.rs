// src/ledger.rs

//! Run-scoped record of per-package failures

use crate::audit::AuditLog;
use serde::Serialize;

/// One failed package and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub package: String,
    pub reason: String,
}

/// Append-only failure list for a single run
#[derive(Debug, Clone, Default)]
pub struct FailureLedger {
    records: Vec<FailureRecord>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure; the reason is flattened onto one line
    pub fn record(&mut self, package: impl Into<String>, reason: impl AsRef<str>) {
        self.records.push(FailureRecord {
            package: package.into(),
            reason: single_line(reason.as_ref()),
        });
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write one log entry per failure plus a count entry
    ///
    /// Each failure was already reported as an error when it happened, so
    /// the per-record entries are informational and only echo under
    /// `--verbose`. The same lines go to stdout unless `quiet` is set.
    /// Nothing happens when no failure was recorded.
    pub fn summarize(&self, log: &mut AuditLog, quiet: bool) {
        if self.records.is_empty() {
            return;
        }

        if !quiet {
            println!();
            println!("Failures ({}):", self.records.len());
        }
        for record in &self.records {
            log.info("FAIL", format!("{}: {}", record.package, record.reason));
            if !quiet {
                println!("  {}: {}", record.package, record.reason);
            }
        }
        log.warn(
            "SUMMARY",
            format!("{} package operation(s) failed", self.records.len()),
        );
    }
}

/// Collapse line breaks (including the bare `\r` of progress output) and the
/// whitespace around them into single spaces
fn single_line(reason: &str) -> String {
    reason
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_flattens_multiline_reason() {
        let mut ledger = FailureLedger::new();
        ledger.record("linux", "error: failed to commit transaction\n  conflicting files\r\n\nabort");

        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.records()[0].reason,
            "error: failed to commit transaction conflicting files abort"
        );
        assert!(!ledger.records()[0].reason.contains('\n'));

        ledger.record("paru-bin", "downloading 10%\rdownloading 100%\rerror: failed");
        assert_eq!(
            ledger.records()[1].reason,
            "downloading 10% downloading 100% error: failed"
        );
        assert!(!ledger.records()[1].reason.contains('\r'));
    }

    #[test]
    fn test_record_keeps_inline_spacing() {
        let mut ledger = FailureLedger::new();
        ledger.record("mesa", "batch failed (exit status 1)");
        assert_eq!(ledger.records()[0].reason, "batch failed (exit status 1)");
    }

    #[test]
    fn test_records_preserve_order() {
        let mut ledger = FailureLedger::new();
        ledger.record("b", "second");
        ledger.record("a", "first");
        let names: Vec<&str> = ledger.records().iter().map(|r| r.package.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_summarize_writes_one_entry_per_record_plus_count() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut log = AuditLog::open(temp_dir.path(), crate::audit::Level::Debug, false);

        let mut ledger = FailureLedger::new();
        ledger.record("linux", "exit status 1");
        ledger.record("paru-bin", "exit status 2");
        ledger.summarize(&mut log, true);

        let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
        assert_eq!(contents.matches("[INFO] [FAIL]").count(), 2);
        assert_eq!(contents.matches("[SUMMARY]").count(), 1);
        assert!(contents.contains("paru-bin: exit status 2"));
    }

    #[test]
    fn test_summarize_empty_is_noop() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut log = AuditLog::open(temp_dir.path(), crate::audit::Level::Debug, false);

        FailureLedger::new().summarize(&mut log, false);
        let contents = std::fs::read_to_string(log.path().unwrap()).unwrap_or_default();
        assert!(contents.is_empty());
    }
}
