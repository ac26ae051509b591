// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes, one per failure class
pub mod exit {
    pub const SUCCESS: u8 = 0;
    /// Only returned with `--strict` when packages failed
    pub const PACKAGE_FAILURES: u8 = 1;
    pub const CONFIG: u8 = 2;
    pub const UNKNOWN_COMMAND: u8 = 3;
    pub const CONFLICTING_FLAGS: u8 = 4;
    pub const MANIFEST: u8 = 5;
    pub const EXECUTION: u8 = 6;
    pub const SNAPSHOT_FATAL: u8 = 75;
}

/// Core error types for Syn-Syu
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest file does not exist
    #[error("Manifest not found at path: {}", .0.display())]
    ManifestMissing(PathBuf),

    /// Manifest exists but is not the expected structure
    #[error("Invalid manifest {}: {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    /// No usable user-repository helper
    #[error("No AUR helper available: {0}")]
    HelperUnavailable(String),

    /// Aggregate disk check failed in enforce mode
    #[error(
        "Insufficient space on {}: need {} (including {} buffer), only {} available",
        path.display(),
        crate::safety::format_bytes(*required),
        crate::safety::format_bytes(*margin),
        crate::safety::format_bytes(*available)
    )]
    DiskInsufficient {
        path: PathBuf,
        required: u64,
        margin: u64,
        available: u64,
    },

    /// Per-package disk check failed; recorded, never aborts a run
    #[error(
        "disk check: {package} needs {}, only {} free",
        crate::safety::format_bytes(*required),
        crate::safety::format_bytes(*available)
    )]
    DiskInsufficientItem {
        package: String,
        required: u64,
        available: u64,
    },

    /// External manager or helper failed
    #[error("{scope} failed: {detail}")]
    ManagerInvocationFailed { scope: String, detail: String },

    /// Snapshot hook failed while success was required
    #[error("{phase}-snapshot hook failed: {detail}")]
    SnapshotFailed {
        phase: crate::safety::SnapshotPhase,
        detail: String,
    },

    /// Safety gate stepped out of order
    #[error("Invalid safety gate transition: {0}")]
    InvalidState(String),

    /// Configuration could not be resolved or validated
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit code for the class this error belongs to
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::ManifestMissing(_) | Error::ManifestInvalid { .. } => exit::MANIFEST,
            Error::HelperUnavailable(_)
            | Error::DiskInsufficient { .. }
            | Error::DiskInsufficientItem { .. }
            | Error::ManagerInvocationFailed { .. }
            | Error::InvalidState(_) => exit::EXECUTION,
            Error::SnapshotFailed { .. } => exit::SNAPSHOT_FATAL,
            Error::ConfigInvalid(_) | Error::Io(_) => exit::CONFIG,
        }
    }
}

/// Result type alias using Syn-Syu's Error type
pub type Result<T> = std::result::Result<T, Error>;
