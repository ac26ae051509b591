// src/safety/disk.rs

//! Disk space checks
//!
//! Two checks guard mutating work: an aggregate check over everything
//! selected for the run (which may abort it in enforce mode), and a per-item
//! check right before a package is executed or queued. Bytes of packages that
//! sit in an unflushed batch are reserved so the per-item check does not
//! count the same free space twice.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// What to do when the aggregate check finds a shortfall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpacePolicy {
    #[default]
    Warn,
    Enforce,
}

impl fmt::Display for SpacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => write!(f, "warn"),
            Self::Enforce => write!(f, "enforce"),
        }
    }
}

impl FromStr for SpacePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "enforce" => Ok(Self::Enforce),
            other => Err(Error::ConfigInvalid(format!(
                "unknown space policy '{}' (expected warn or enforce)",
                other
            ))),
        }
    }
}

/// Bytes a single upgrade needs on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    pub download: u64,
    pub build: u64,
    pub install: u64,
    pub transient: u64,
}

impl Footprint {
    pub fn total(&self) -> u64 {
        self.download
            .saturating_add(self.build)
            .saturating_add(self.install)
            .saturating_add(self.transient)
    }
}

impl std::ops::Add for Footprint {
    type Output = Footprint;

    fn add(self, other: Footprint) -> Footprint {
        Footprint {
            download: self.download.saturating_add(other.download),
            build: self.build.saturating_add(other.build),
            install: self.install.saturating_add(other.install),
            transient: self.transient.saturating_add(other.transient),
        }
    }
}

impl std::iter::Sum for Footprint {
    fn sum<I: Iterator<Item = Footprint>>(iter: I) -> Footprint {
        iter.fold(Footprint::default(), |acc, f| acc + f)
    }
}

/// Source of free-space figures
pub trait SpaceProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Queries the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl SpaceProbe for FsProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(nearest_existing(path))
    }
}

/// Closest ancestor of `path` that exists (the path itself included)
pub fn nearest_existing(path: &Path) -> &Path {
    path.ancestors()
        .find(|candidate| !candidate.as_os_str().is_empty() && candidate.exists())
        .unwrap_or_else(|| Path::new("/"))
}

/// Outcome of the aggregate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceVerdict {
    Sufficient { required: u64, available: u64 },
    /// Shortfall tolerated because the policy is `warn`
    Shortfall { required: u64, available: u64 },
    /// Free space could not be determined
    Unknown,
}

/// Disk space checks for one run
pub struct DiskGate {
    probe: Box<dyn SpaceProbe>,
    path: PathBuf,
    margin: u64,
    policy: SpacePolicy,
    reserved: u64,
}

impl DiskGate {
    pub fn new(probe: Box<dyn SpaceProbe>, path: PathBuf, margin: u64, policy: SpacePolicy) -> Self {
        Self {
            probe,
            path,
            margin,
            policy,
            reserved: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> SpacePolicy {
        self.policy
    }

    /// Bytes currently held by queued packages
    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Compare `required` plus the margin against free space
    ///
    /// In enforce mode a shortfall is `DiskInsufficient`; in warn mode it is
    /// reported as `SpaceVerdict::Shortfall` and the caller carries on.
    pub fn aggregate_check(&self, required: u64) -> Result<SpaceVerdict> {
        let available = match self.probe.available_bytes(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Unable to determine free space on {}: {}", self.path.display(), e);
                return Ok(SpaceVerdict::Unknown);
            }
        };

        let needed = required.saturating_add(self.margin);
        debug!(
            "Aggregate disk check on {}: need {} (margin {}), available {}",
            self.path.display(),
            needed,
            self.margin,
            available
        );

        if needed <= available {
            return Ok(SpaceVerdict::Sufficient {
                required: needed,
                available,
            });
        }

        match self.policy {
            SpacePolicy::Enforce => Err(Error::DiskInsufficient {
                path: self.path.clone(),
                required: needed,
                margin: self.margin,
                available,
            }),
            SpacePolicy::Warn => Ok(SpaceVerdict::Shortfall {
                required: needed,
                available,
            }),
        }
    }

    /// Re-verify a single package against current free space
    ///
    /// Returns the `DiskInsufficientItem` reason on shortfall; it is meant to
    /// be recorded for that package, never propagated.
    pub fn item_check(&self, name: &str, footprint: Footprint) -> std::result::Result<(), Error> {
        let required = footprint.total();
        if required == 0 {
            return Ok(());
        }

        let available = match self.probe.available_bytes(&self.path) {
            Ok(bytes) => bytes.saturating_sub(self.reserved),
            Err(e) => {
                warn!("Skipping disk check for {}: {}", name, e);
                return Ok(());
            }
        };

        if required > available {
            return Err(Error::DiskInsufficientItem {
                package: name.to_string(),
                required,
                available,
            });
        }
        Ok(())
    }

    /// Hold bytes for a package waiting in the batch queue
    pub fn reserve(&mut self, footprint: Footprint) {
        self.reserved = self.reserved.saturating_add(footprint.total());
    }

    /// Drop all reservations once the batch has been flushed
    pub fn release(&mut self) {
        self.reserved = 0;
    }
}

impl fmt::Debug for DiskGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskGate")
            .field("path", &self.path)
            .field("margin", &self.margin)
            .field("policy", &self.policy)
            .field("reserved", &self.reserved)
            .finish()
    }
}

/// Convert a size in GiB (as configured) to bytes
pub fn gb_to_bytes(gb: f64) -> u64 {
    if gb.is_finite() && gb > 0.0 {
        (gb * GIB).round() as u64
    } else {
        0
    }
}

/// Human-readable size with IEC units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }

    if value >= 10.0 || value.fract() == 0.0 {
        format!("{:.0} {}", value, unit)
    } else {
        format!("{:.1} {}", value, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB_BYTES: u64 = 1024 * 1024 * 1024;

    struct FixedProbe(u64);

    impl SpaceProbe for FixedProbe {
        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    struct BrokenProbe;

    impl SpaceProbe for BrokenProbe {
        fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
            Err(io::Error::other("statvfs failed"))
        }
    }

    fn gate(available: u64, margin: u64, policy: SpacePolicy) -> DiskGate {
        DiskGate::new(
            Box::new(FixedProbe(available)),
            PathBuf::from("/var/cache/pacman/pkg"),
            margin,
            policy,
        )
    }

    fn footprint(bytes: u64) -> Footprint {
        Footprint {
            download: bytes,
            ..Footprint::default()
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1 KiB");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10 MiB");
        assert_eq!(format_bytes(5 * GIB_BYTES), "5 GiB");
    }

    #[test]
    fn test_gb_to_bytes() {
        assert_eq!(gb_to_bytes(2.0), 2 * GIB_BYTES);
        assert_eq!(gb_to_bytes(0.5), GIB_BYTES / 2);
        assert_eq!(gb_to_bytes(-1.0), 0);
        assert_eq!(gb_to_bytes(f64::NAN), 0);
    }

    #[test]
    fn test_footprint_sum() {
        let a = Footprint {
            download: 1,
            build: 2,
            install: 3,
            transient: 4,
        };
        assert_eq!(a.total(), 10);
        let total: Footprint = vec![a, a].into_iter().sum();
        assert_eq!(total.total(), 20);
    }

    #[test]
    fn test_enforce_aborts_on_shortfall() {
        let gate = gate(GIB_BYTES, 0, SpacePolicy::Enforce);
        let err = gate.aggregate_check(2 * GIB_BYTES).unwrap_err();
        assert!(matches!(err, Error::DiskInsufficient { .. }));
    }

    #[test]
    fn test_warn_continues_on_shortfall() {
        let gate = gate(GIB_BYTES, 0, SpacePolicy::Warn);
        assert_eq!(
            gate.aggregate_check(2 * GIB_BYTES).unwrap(),
            SpaceVerdict::Shortfall {
                required: 2 * GIB_BYTES,
                available: GIB_BYTES
            }
        );
    }

    #[test]
    fn test_margin_counts_toward_requirement() {
        let gate = gate(GIB_BYTES, GIB_BYTES / 2, SpacePolicy::Enforce);
        assert!(gate.aggregate_check(GIB_BYTES / 2).is_ok());
        assert!(gate.aggregate_check(GIB_BYTES / 2 + 1).is_err());
    }

    #[test]
    fn test_unknown_space_does_not_abort() {
        let gate = DiskGate::new(
            Box::new(BrokenProbe),
            PathBuf::from("/"),
            0,
            SpacePolicy::Enforce,
        );
        assert_eq!(gate.aggregate_check(u64::MAX).unwrap(), SpaceVerdict::Unknown);
        assert!(gate.item_check("linux", footprint(u64::MAX)).is_ok());
    }

    #[test]
    fn test_item_check_counts_reservations() {
        let mut gate = gate(100, 0, SpacePolicy::Warn);
        assert!(gate.item_check("a", footprint(60)).is_ok());
        gate.reserve(footprint(60));

        let err = gate.item_check("b", footprint(60)).unwrap_err();
        match err {
            Error::DiskInsufficientItem {
                package,
                required,
                available,
            } => {
                assert_eq!(package, "b");
                assert_eq!(required, 60);
                assert_eq!(available, 40);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        gate.release();
        assert_eq!(gate.reserved(), 0);
        assert!(gate.item_check("b", footprint(60)).is_ok());
    }

    #[test]
    fn test_space_policy_parse() {
        assert_eq!("Enforce".parse::<SpacePolicy>().unwrap(), SpacePolicy::Enforce);
        assert_eq!("warn".parse::<SpacePolicy>().unwrap(), SpacePolicy::Warn);
        assert!("strict".parse::<SpacePolicy>().is_err());
    }

    #[test]
    fn test_nearest_existing_walks_up() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("a/b/c");
        assert_eq!(nearest_existing(&missing), temp_dir.path());
        assert!(FsProbe.available_bytes(&missing).is_ok());
    }
}
