// src/manifest/raw.rs

//! Wire format of the manifest JSON
//!
//! Every field is optional here; `into_manifest` applies the defaults once so
//! the rest of the crate never has to.

use super::{
    AppItem, AppSourceState, Applications, Manifest, ManifestEntry, ManifestMetadata,
    PackageSource,
};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub(super) struct RawManifest {
    #[serde(default)]
    metadata: Option<RawMetadata>,
    packages: BTreeMap<String, RawEntry>,
    #[serde(default)]
    applications: Option<RawApplications>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    generated_at: Option<String>,
    generated_by: Option<String>,
    total_packages: Option<usize>,
    updates_available: Option<usize>,
    download_size_total: Option<u64>,
    build_size_total: Option<u64>,
    install_size_total: Option<u64>,
    transient_size_total: Option<u64>,
    min_free_bytes: Option<u64>,
    available_space_bytes: Option<u64>,
    space_checked_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    source: Option<String>,
    installed_version: Option<String>,
    newer_version: Option<String>,
    target_version: Option<String>,
    update_available: Option<bool>,
    repository: Option<String>,
    download_bytes: Option<u64>,
    download_size: Option<u64>,
    build_bytes: Option<u64>,
    build_size: Option<u64>,
    install_bytes: Option<u64>,
    install_size: Option<u64>,
    transient_bytes: Option<u64>,
    transient_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawApplications {
    flatpak: Option<RawAppSource>,
    fwupd: Option<RawAppSource>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAppSource {
    enabled: Option<bool>,
    installed_count: Option<usize>,
    device_count: Option<usize>,
    update_count: Option<usize>,
    updates: Option<Vec<RawAppItem>>,
    items: Option<Vec<RawAppItem>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAppItem {
    name: Option<String>,
    application: Option<String>,
    device: Option<String>,
    installed: Option<String>,
    available: Option<String>,
}

impl RawManifest {
    pub(super) fn into_manifest(self) -> Manifest {
        let packages: BTreeMap<String, ManifestEntry> = self
            .packages
            .into_iter()
            .map(|(name, raw)| (name, raw.into_entry()))
            .collect();

        let raw_meta = self.metadata.unwrap_or_default();
        let metadata = ManifestMetadata {
            generated_at: raw_meta.generated_at,
            generated_by: raw_meta.generated_by,
            total_packages: raw_meta.total_packages.unwrap_or(packages.len()),
            updates_available: raw_meta
                .updates_available
                .unwrap_or_else(|| packages.values().filter(|e| e.update_available).count()),
            download_size_total: raw_meta.download_size_total.unwrap_or(0),
            build_size_total: raw_meta.build_size_total.unwrap_or(0),
            install_size_total: raw_meta.install_size_total.unwrap_or(0),
            transient_size_total: raw_meta.transient_size_total.unwrap_or(0),
            min_free_bytes: raw_meta.min_free_bytes.unwrap_or(0),
            available_space_bytes: raw_meta.available_space_bytes.unwrap_or(0),
            space_checked_path: raw_meta.space_checked_path,
        };

        let applications = self
            .applications
            .map(|apps| Applications {
                flatpak: apps.flatpak.map(RawAppSource::into_state),
                fwupd: apps.fwupd.map(RawAppSource::into_state),
            })
            .unwrap_or_default();

        Manifest {
            metadata,
            packages,
            applications,
        }
    }
}

impl RawEntry {
    fn into_entry(self) -> ManifestEntry {
        let source = self
            .source
            .as_deref()
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or(PackageSource::Unknown);

        ManifestEntry {
            source,
            installed_version: self.installed_version.unwrap_or_default(),
            target_version: self
                .target_version
                .or(self.newer_version)
                .unwrap_or_default(),
            update_available: self.update_available.unwrap_or(false),
            download_bytes: self.download_bytes.or(self.download_size).unwrap_or(0),
            build_bytes: self.build_bytes.or(self.build_size).unwrap_or(0),
            install_bytes: self.install_bytes.or(self.install_size).unwrap_or(0),
            transient_bytes: self.transient_bytes.or(self.transient_size).unwrap_or(0),
            repository: self.repository,
        }
    }
}

impl RawAppSource {
    fn into_state(self) -> AppSourceState {
        let items: Vec<AppItem> = self
            .updates
            .or(self.items)
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawAppItem::into_item)
            .collect();

        AppSourceState {
            enabled: self.enabled.unwrap_or(false),
            installed_count: self.installed_count.or(self.device_count).unwrap_or(0),
            update_count: self.update_count.unwrap_or(items.len()),
            items,
        }
    }
}

impl RawAppItem {
    fn into_item(self) -> Option<AppItem> {
        let name = self.name.or(self.application).or(self.device)?;
        Some(AppItem {
            name,
            installed: self.installed.unwrap_or_default(),
            available: self.available.unwrap_or_default(),
        })
    }
}
