// src/manifest/mod.rs

//! Read-only access to the update manifest
//!
//! The manifest is produced by an external resolver and describes every
//! installed package, the version it can move to, and where it comes from.
//! This module deserializes it once into typed entries with all defaults
//! resolved, then exposes the queries the orchestrator needs:
//!
//! - `updatable_entries`: packages with `update_available = true`
//! - `all_entries`: every package with its update flag
//! - `entry_detail`: full record for one package

mod raw;

use crate::error::{Error, Result};
use crate::safety::Footprint;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Provenance of an installed package, which decides its execution path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PackageSource {
    /// Official repositories, upgraded through pacman in batches
    RepoManaged,
    /// User repository (AUR), upgraded one by one through a helper
    HelperManaged,
    /// Installed from a local file; managed outside this tool
    LocalOnly,
    #[default]
    Unknown,
}

impl PackageSource {
    /// Canonical manifest spelling
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RepoManaged => "PACMAN",
            Self::HelperManaged => "AUR",
            Self::LocalOnly => "LOCAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PackageSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "PACMAN" | "REPO" => Self::RepoManaged,
            "AUR" | "HELPER" => Self::HelperManaged,
            "LOCAL" => Self::LocalOnly,
            _ => Self::Unknown,
        })
    }
}

impl Serialize for PackageSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One package record, with defaults already applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub source: PackageSource,
    pub installed_version: String,
    pub target_version: String,
    pub update_available: bool,
    pub download_bytes: u64,
    pub build_bytes: u64,
    pub install_bytes: u64,
    pub transient_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl ManifestEntry {
    /// Disk footprint of upgrading this entry
    pub fn footprint(&self) -> Footprint {
        Footprint {
            download: self.download_bytes,
            build: self.build_bytes,
            install: self.install_bytes,
            transient: self.transient_bytes,
        }
    }
}

/// Metadata block written by the resolver
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestMetadata {
    pub generated_at: Option<String>,
    pub generated_by: Option<String>,
    pub total_packages: usize,
    pub updates_available: usize,
    pub download_size_total: u64,
    pub build_size_total: u64,
    pub install_size_total: u64,
    pub transient_size_total: u64,
    pub min_free_bytes: u64,
    pub available_space_bytes: u64,
    pub space_checked_path: Option<String>,
}

/// Application-layer update source recorded in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AppSource {
    Flatpak,
    Fwupd,
}

impl AppSource {
    pub const ALL: [AppSource; 2] = [AppSource::Flatpak, AppSource::Fwupd];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Flatpak => "flatpak",
            Self::Fwupd => "fwupd",
        }
    }
}

impl Serialize for AppSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for AppSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pending update for an application or firmware device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppItem {
    pub name: String,
    pub installed: String,
    pub available: String,
}

/// State of one application source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppSourceState {
    pub enabled: bool,
    pub installed_count: usize,
    pub update_count: usize,
    pub items: Vec<AppItem>,
}

/// Optional application block of the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Applications {
    pub flatpak: Option<AppSourceState>,
    pub fwupd: Option<AppSourceState>,
}

impl Applications {
    pub fn get(&self, source: AppSource) -> Option<&AppSourceState> {
        match source {
            AppSource::Flatpak => self.flatpak.as_ref(),
            AppSource::Fwupd => self.fwupd.as_ref(),
        }
    }
}

/// Update candidate yielded by `Manifest::updatable_entries`
#[derive(Debug, Clone, Copy)]
pub struct UpdateCandidate<'a> {
    pub name: &'a str,
    pub source: PackageSource,
    pub target_version: &'a str,
    pub entry: &'a ManifestEntry,
}

/// Summary yielded by `Manifest::all_entries`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySummary<'a> {
    pub name: &'a str,
    pub source: PackageSource,
    pub target_version: &'a str,
    pub update_available: bool,
}

/// Parsed manifest document
#[derive(Debug, Clone, Default, Serialize)]
pub struct Manifest {
    pub metadata: ManifestMetadata,
    packages: BTreeMap<String, ManifestEntry>,
    pub applications: Applications,
}

impl Manifest {
    /// Parse manifest JSON; `origin` is only used in error messages
    pub fn parse(contents: &str, origin: &Path) -> Result<Self> {
        let raw: raw::RawManifest =
            serde_json::from_str(contents).map_err(|e| Error::ManifestInvalid {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(raw.into_manifest())
    }

    /// Build a manifest directly from entries
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, ManifestEntry)>,
    {
        let packages: BTreeMap<String, ManifestEntry> = entries.into_iter().collect();
        let metadata = ManifestMetadata {
            total_packages: packages.len(),
            updates_available: packages.values().filter(|e| e.update_available).count(),
            ..ManifestMetadata::default()
        };
        Self {
            metadata,
            packages,
            applications: Applications::default(),
        }
    }

    /// Packages that have an update available, in name order
    ///
    /// Each call starts a fresh pass over the same data.
    pub fn updatable_entries(&self) -> impl Iterator<Item = UpdateCandidate<'_>> + '_ {
        self.packages
            .iter()
            .filter(|(_, entry)| entry.update_available)
            .map(|(name, entry)| UpdateCandidate {
                name,
                source: entry.source,
                target_version: &entry.target_version,
                entry,
            })
    }

    /// Every package in name order
    pub fn all_entries(&self) -> impl Iterator<Item = EntrySummary<'_>> + '_ {
        self.packages.iter().map(|(name, entry)| EntrySummary {
            name,
            source: entry.source,
            target_version: &entry.target_version,
            update_available: entry.update_available,
        })
    }

    /// Full record for a single package
    pub fn entry_detail(&self, name: &str) -> Option<&ManifestEntry> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Load the manifest at `path`
pub fn load(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        return Err(Error::ManifestMissing(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::ManifestInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let manifest = Manifest::parse(&contents, path)?;

    debug!(
        "Loaded manifest {} ({} packages, {} updatable)",
        path.display(),
        manifest.len(),
        manifest.updatable_entries().count()
    );
    Ok(manifest)
}
