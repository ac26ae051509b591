// src/commands/inspect.rs
//! Read-only manifest commands: `check`, `inspect`, `export`

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use synsyu::config::Settings;
use synsyu::manifest::{self, AppSource, Manifest, PackageSource};
use synsyu::safety::{DiskGate, Footprint, FsProbe, SpacePolicy, SpaceVerdict, format_bytes};
use synsyu::{Error, exit};
use tracing::info;

#[derive(Debug, Serialize)]
struct CheckSummary {
    manifest: String,
    generated_at: Option<String>,
    total_packages: usize,
    updates_available: usize,
    updates_by_source: BTreeMap<&'static str, usize>,
    footprint: FootprintSummary,
    disk: DiskSummary,
    applications: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Serialize)]
struct FootprintSummary {
    download_bytes: u64,
    build_bytes: u64,
    install_bytes: u64,
    transient_bytes: u64,
    total_bytes: u64,
}

#[derive(Debug, Serialize)]
struct DiskSummary {
    path: String,
    required_bytes: u64,
    available_bytes: Option<u64>,
    sufficient: Option<bool>,
}

fn summarize(settings: &Settings, manifest: &Manifest) -> Result<CheckSummary> {
    let mut by_source: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut footprint = Footprint::default();
    for candidate in manifest.updatable_entries() {
        *by_source.entry(candidate.source.as_str()).or_default() += 1;
        footprint = footprint + candidate.entry.footprint();
    }

    // Report only; a shortfall here never fails the command
    let gate = DiskGate::new(
        Box::new(FsProbe),
        settings.space_check_path.clone(),
        settings.min_free_bytes,
        SpacePolicy::Warn,
    );
    let (required, available, sufficient) = match gate.aggregate_check(footprint.total())? {
        SpaceVerdict::Sufficient { required, available } => (required, Some(available), Some(true)),
        SpaceVerdict::Shortfall { required, available } => (required, Some(available), Some(false)),
        SpaceVerdict::Unknown => (footprint.total().saturating_add(settings.min_free_bytes), None, None),
    };

    let applications = AppSource::ALL
        .iter()
        .filter_map(|&source| {
            manifest
                .applications
                .get(source)
                .map(|state| (source.as_str(), state.update_count))
        })
        .collect();

    Ok(CheckSummary {
        manifest: settings.manifest_path.display().to_string(),
        generated_at: manifest.metadata.generated_at.clone(),
        total_packages: manifest.len(),
        updates_available: manifest.updatable_entries().count(),
        updates_by_source: by_source,
        footprint: FootprintSummary {
            download_bytes: footprint.download,
            build_bytes: footprint.build,
            install_bytes: footprint.install,
            transient_bytes: footprint.transient,
            total_bytes: footprint.total(),
        },
        disk: DiskSummary {
            path: settings.space_check_path.display().to_string(),
            required_bytes: required,
            available_bytes: available,
            sufficient,
        },
        applications,
    })
}

/// Summarize the manifest
pub fn cmd_check(settings: &Settings) -> Result<u8> {
    let manifest = manifest::load(&settings.manifest_path)?;
    let summary = summarize(settings, &manifest)?;

    if settings.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(exit::SUCCESS);
    }

    println!("Manifest: {}", summary.manifest);
    if let Some(generated) = &summary.generated_at {
        println!("Generated: {}", generated);
    }
    println!("Packages: {}", summary.total_packages);
    println!("Updates available: {}", summary.updates_available);
    for (source, count) in &summary.updates_by_source {
        println!("  {:<8} {}", source, count);
    }
    println!(
        "Footprint: {} (download {}, build {}, install {}, transient {})",
        format_bytes(summary.footprint.total_bytes),
        format_bytes(summary.footprint.download_bytes),
        format_bytes(summary.footprint.build_bytes),
        format_bytes(summary.footprint.install_bytes),
        format_bytes(summary.footprint.transient_bytes),
    );
    match summary.disk.available_bytes {
        Some(available) => println!(
            "Disk ({}): need {}, {} available{}",
            summary.disk.path,
            format_bytes(summary.disk.required_bytes),
            format_bytes(available),
            if summary.disk.sufficient == Some(false) { " - INSUFFICIENT" } else { "" }
        ),
        None => println!("Disk ({}): free space unknown", summary.disk.path),
    }
    for (source, pending) in &summary.applications {
        println!("{}: {} update(s) pending", source, pending);
    }
    Ok(exit::SUCCESS)
}

/// Show one manifest entry
pub fn cmd_inspect(settings: &Settings, package: &str) -> Result<u8> {
    let manifest = manifest::load(&settings.manifest_path)?;
    let entry = manifest
        .entry_detail(package)
        .ok_or_else(|| Error::ManifestInvalid {
            path: settings.manifest_path.clone(),
            reason: format!("no entry for package '{}'", package),
        })?;

    if settings.json {
        println!("{}", serde_json::to_string_pretty(entry)?);
        return Ok(exit::SUCCESS);
    }

    println!("Package: {}", package);
    println!("  Source: {}", entry.source);
    if let Some(repo) = &entry.repository {
        println!("  Repository: {}", repo);
    }
    println!("  Installed: {}", entry.installed_version);
    println!("  Available: {}", entry.target_version);
    println!("  Update: {}", if entry.update_available { "yes" } else { "no" });
    println!("  Download: {}", format_bytes(entry.download_bytes));
    println!("  Build: {}", format_bytes(entry.build_bytes));
    println!("  Install: {}", format_bytes(entry.install_bytes));
    println!("  Transient: {}", format_bytes(entry.transient_bytes));
    Ok(exit::SUCCESS)
}

/// What `export` writes
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportSelection {
    pub repo_only: bool,
    pub aur_only: bool,
    /// Include packages without a pending update
    pub all: bool,
}

impl ExportSelection {
    fn accepts(&self, source: PackageSource, update_available: bool) -> bool {
        if !self.all && !update_available {
            return false;
        }
        if self.repo_only {
            return source == PackageSource::RepoManaged;
        }
        if self.aur_only {
            return source == PackageSource::HelperManaged;
        }
        true
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct ExportedPackage<'a> {
    name: &'a str,
    source: PackageSource,
    version: &'a str,
}

fn export_list<'m>(
    manifest: &'m Manifest,
    selection: ExportSelection,
    settings: &Settings,
) -> Result<Vec<ExportedPackage<'m>>> {
    let filter = settings.filter()?;
    Ok(manifest
        .all_entries()
        .filter(|e| selection.accepts(e.source, e.update_available) && filter.matches(e.name))
        .map(|e| ExportedPackage {
            name: e.name,
            source: e.source,
            version: e.target_version,
        })
        .collect())
}

/// Write package names, one per line, or JSON with `--json`
pub fn cmd_export(settings: &Settings, selection: ExportSelection, output: Option<&Path>) -> Result<u8> {
    let manifest = manifest::load(&settings.manifest_path)?;
    let packages = export_list(&manifest, selection, settings)?;

    let mut rendered = if settings.json {
        serde_json::to_string_pretty(&packages)?
    } else {
        packages.iter().map(|p| p.name).collect::<Vec<_>>().join("\n")
    };
    if !rendered.is_empty() {
        rendered.push('\n');
    }

    match output {
        Some(path) => {
            fs::write(path, &rendered).map_err(Error::Io)?;
            info!("Exported {} package(s) to {}", packages.len(), path.display());
            if !settings.quiet {
                println!("Wrote {} package(s) to {}", packages.len(), path.display());
            }
        }
        None => print!("{}", rendered),
    }
    Ok(exit::SUCCESS)
}
