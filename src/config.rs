// src/config.rs
//! Layered configuration
//!
//! Settings are resolved once, before any work starts, from four layers in
//! increasing precedence:
//!
//! 1. built-in defaults
//! 2. environment variables (`SYNSYU_*`)
//! 3. the TOML config file
//! 4. command-line flags
//!
//! Each layer only overrides the fields it actually sets. The TOML file has
//! the following sections:
//!
//! ```toml
//! [core]
//! manifest_path = "/tmp/syn-syu_manifest.json"
//! batch_size = 10
//! rebuild_command = "synsyu_core --output /tmp/syn-syu_manifest.json"
//!
//! [helpers]
//! priority = ["paru", "yay"]
//!
//! [space]
//! min_free_gb = 2.0
//! policy = "enforce"
//! check_path = "/var/cache/pacman/pkg"
//!
//! [snapshots]
//! enabled = true
//! pre_command = "snapper create -d syn-syu-pre"
//! require_success = true
//!
//! [logging]
//! level = "info"
//! retention_days = 30
//! retention_megabytes = 50
//!
//! [filters]
//! exclude = ["-git$"]
//!
//! [applications]
//! flatpak = true
//! ```

use crate::audit::{Level, Retention};
use crate::error::{Error, Result};
use crate::filter::PackageFilter;
use crate::helper::HELPER_CANDIDATES;
use crate::safety::{SnapshotHooks, SpacePolicy, gb_to_bytes};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_MANIFEST_PATH: &str = "/tmp/syn-syu_manifest.json";
pub const DEFAULT_SPACE_CHECK_PATH: &str = "/var/cache/pacman/pkg";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MIN_FREE_GB: f64 = 2.0;
pub const DEFAULT_PRIVILEGE_COMMAND: &str = "sudo";

/// One configuration layer; `None` means "not set here"
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub core: CoreSection,
    pub helpers: HelperSection,
    pub space: SpaceSection,
    pub snapshots: SnapshotSection,
    pub logging: LoggingSection,
    pub filters: FilterSection,
    pub applications: ApplicationSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoreSection {
    pub manifest_path: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub rebuild: Option<bool>,
    pub rebuild_command: Option<String>,
    pub privilege_command: Option<String>,
    pub dry_run: Option<bool>,
    pub confirm: Option<bool>,
    pub strict: Option<bool>,
    pub json: Option<bool>,
    pub no_aur: Option<bool>,
    pub no_repo: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HelperSection {
    pub priority: Option<Vec<String>>,
    /// Forced helper, bypasses detection
    pub force: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpaceSection {
    pub min_free_gb: Option<f64>,
    pub policy: Option<SpacePolicy>,
    pub check_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    pub enabled: Option<bool>,
    pub pre_command: Option<String>,
    pub post_command: Option<String>,
    pub require_success: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub directory: Option<PathBuf>,
    pub retention_days: Option<u64>,
    pub retention_megabytes: Option<u64>,
    pub verbose: Option<bool>,
    pub quiet: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApplicationSection {
    pub flatpak: Option<bool>,
    pub fwupd: Option<bool>,
}

/// Copy every field `upper` sets over `base`
macro_rules! overlay {
    ($base:expr, $upper:expr; $($field:ident),+ $(,)?) => {
        $(
            if $upper.$field.is_some() {
                $base.$field = $upper.$field;
            }
        )+
    };
}

impl ConfigLayer {
    /// Layer `upper` on top of `self`
    pub fn overlay(mut self, upper: ConfigLayer) -> Self {
        overlay!(self.core, upper.core;
            manifest_path, batch_size, rebuild, rebuild_command, privilege_command,
            dry_run, confirm, strict, json, no_aur, no_repo);
        overlay!(self.helpers, upper.helpers; priority, force);
        overlay!(self.space, upper.space; min_free_gb, policy, check_path);
        overlay!(self.snapshots, upper.snapshots;
            enabled, pre_command, post_command, require_success);
        overlay!(self.logging, upper.logging;
            level, directory, retention_days, retention_megabytes, verbose, quiet);
        overlay!(self.filters, upper.filters; include, exclude);
        overlay!(self.applications, upper.applications; flatpak, fwupd);
        self
    }

    /// Parse a TOML config document
    pub fn from_toml(contents: &str, origin: &Path) -> Result<Self> {
        toml::from_str(contents).map_err(|e| {
            Error::ConfigInvalid(format!("failed to parse {}: {}", origin.display(), e))
        })
    }

    /// Read the `SYNSYU_*` variables through `lookup`
    pub fn from_env<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| var(key).map(|v| parse_bool(key, &v)).transpose();
        let list = |key: &str| {
            var(key).map(|v| {
                v.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
        };

        let mut layer = ConfigLayer::default();

        layer.core.manifest_path = var("SYNSYU_MANIFEST_PATH").map(PathBuf::from);
        layer.core.batch_size = var("SYNSYU_BATCH_SIZE")
            .map(|v| parse_number::<usize>("SYNSYU_BATCH_SIZE", &v))
            .transpose()?;
        layer.core.rebuild = flag("SYNSYU_REBUILD")?;
        layer.core.rebuild_command = var("SYNSYU_REBUILD_COMMAND");
        layer.core.dry_run = flag("SYNSYU_DRY_RUN")?;
        layer.core.confirm = flag("SYNSYU_CONFIRM")?;
        layer.core.strict = flag("SYNSYU_STRICT")?;
        layer.core.json = flag("SYNSYU_JSON")?;
        layer.core.no_aur = flag("SYNSYU_NO_AUR")?;
        layer.core.no_repo = flag("SYNSYU_NO_REPO")?;

        layer.helpers.force = var("SYNSYU_HELPER");

        // A byte count is only a fallback for the GiB figure
        let min_free_bytes = var("SYNSYU_MIN_FREE_BYTES")
            .map(|v| parse_number::<u64>("SYNSYU_MIN_FREE_BYTES", &v))
            .transpose()?;
        layer.space.min_free_gb = match var("SYNSYU_MIN_FREE_GB") {
            Some(v) => Some(parse_number::<f64>("SYNSYU_MIN_FREE_GB", &v)?),
            None => min_free_bytes.map(|bytes| bytes as f64 / BYTES_PER_GIB),
        };
        layer.space.policy = var("SYNSYU_SPACE_POLICY")
            .map(|v| v.parse::<SpacePolicy>())
            .transpose()?;

        layer.logging.level = var("SYNSYU_LOG_LEVEL");
        layer.logging.directory = var("SYNSYU_LOG_DIR").map(PathBuf::from);
        layer.logging.verbose = flag("SYNSYU_VERBOSE")?;
        layer.logging.quiet = flag("SYNSYU_QUIET")?;

        layer.filters.include = list("SYNSYU_INCLUDE");
        layer.filters.exclude = list("SYNSYU_EXCLUDE");

        layer.applications.flatpak = flag("SYNSYU_WITH_FLATPAK")?;
        layer.applications.fwupd = flag("SYNSYU_WITH_FWUPD")?;

        Ok(layer)
    }
}

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::ConfigInvalid(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::ConfigInvalid(format!("{} must be a number, got '{}'", key, value)))
}

/// Fully resolved, validated settings for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Config file that was loaded, if any
    pub config_path: Option<PathBuf>,
    pub manifest_path: PathBuf,
    pub batch_size: usize,
    pub rebuild: bool,
    pub rebuild_command: Option<String>,
    pub privilege_command: Option<String>,
    pub dry_run: bool,
    pub confirm: bool,
    pub strict: bool,
    pub json: bool,
    pub no_aur: bool,
    pub no_repo: bool,
    pub helper_priority: Vec<String>,
    pub forced_helper: Option<String>,
    pub min_free_bytes: u64,
    pub space_policy: SpacePolicy,
    pub space_check_path: PathBuf,
    pub snapshots: SnapshotHooks,
    pub log_level: Level,
    pub log_dir: PathBuf,
    pub retention: Retention,
    pub verbose: bool,
    pub quiet: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub flatpak: bool,
    pub fwupd: bool,
}

impl Settings {
    /// Turn a merged layer into settings, filling defaults and validating
    pub fn from_layer(layer: ConfigLayer, config_path: Option<PathBuf>) -> Result<Self> {
        let ConfigLayer {
            core,
            helpers,
            space,
            snapshots,
            logging,
            filters,
            applications,
        } = layer;

        let batch_size = core.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(Error::ConfigInvalid(
                "batch size must be at least 1".to_string(),
            ));
        }

        let min_free_gb = space.min_free_gb.unwrap_or(DEFAULT_MIN_FREE_GB);
        if !min_free_gb.is_finite() || min_free_gb < 0.0 {
            return Err(Error::ConfigInvalid(format!(
                "min_free_gb must be a non-negative number, got {}",
                min_free_gb
            )));
        }

        let no_aur = core.no_aur.unwrap_or(false);
        let no_repo = core.no_repo.unwrap_or(false);
        if no_aur && no_repo {
            return Err(Error::ConfigInvalid(
                "no_aur and no_repo cannot both be set".to_string(),
            ));
        }

        let log_level = match logging.level.as_deref() {
            Some(level) => level.parse()?,
            None => Level::Info,
        };

        let snapshot_hooks = if snapshots.enabled.unwrap_or(true) {
            SnapshotHooks {
                pre: snapshots.pre_command,
                post: snapshots.post_command,
                require_success: snapshots.require_success.unwrap_or(false),
            }
        } else {
            SnapshotHooks::default()
        };

        let settings = Settings {
            config_path,
            manifest_path: core
                .manifest_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH)),
            batch_size,
            rebuild: core.rebuild.unwrap_or(false),
            rebuild_command: core.rebuild_command.filter(|c| !c.trim().is_empty()),
            privilege_command: match core.privilege_command {
                Some(cmd) if cmd.trim().is_empty() => None,
                Some(cmd) => Some(cmd),
                None => Some(DEFAULT_PRIVILEGE_COMMAND.to_string()),
            },
            dry_run: core.dry_run.unwrap_or(false),
            confirm: core.confirm.unwrap_or(false),
            strict: core.strict.unwrap_or(false),
            json: core.json.unwrap_or(false),
            no_aur,
            no_repo,
            helper_priority: helpers
                .priority
                .unwrap_or_else(|| HELPER_CANDIDATES.iter().map(|h| h.to_string()).collect()),
            forced_helper: helpers.force.filter(|h| !h.trim().is_empty()),
            min_free_bytes: gb_to_bytes(min_free_gb),
            space_policy: space.policy.unwrap_or_default(),
            space_check_path: space
                .check_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SPACE_CHECK_PATH)),
            snapshots: snapshot_hooks,
            log_level,
            log_dir: logging.directory.unwrap_or_else(default_log_dir),
            retention: Retention {
                max_age_days: logging.retention_days.unwrap_or(0),
                max_total_mb: logging.retention_megabytes.unwrap_or(0),
            },
            verbose: logging.verbose.unwrap_or(false),
            quiet: logging.quiet.unwrap_or(false),
            include: filters.include.unwrap_or_default(),
            exclude: filters.exclude.unwrap_or_default(),
            flatpak: applications.flatpak.unwrap_or(false),
            fwupd: applications.fwupd.unwrap_or(false),
        };

        // Surface bad patterns now rather than mid-run
        settings.filter()?;
        Ok(settings)
    }

    /// Compiled include/exclude filter
    pub fn filter(&self) -> Result<PackageFilter> {
        PackageFilter::new(&self.include, &self.exclude)
    }
}

/// Resolve settings from every layer
///
/// `explicit_config` (from `--config`) wins over `SYNSYU_CONFIG_PATH`; either
/// must point at an existing file. Without both, the default location is used
/// when it exists.
pub fn resolve<F>(cli: ConfigLayer, explicit_config: Option<&Path>, lookup: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let env_layer = ConfigLayer::from_env(&lookup)?;

    let requested = explicit_config
        .map(Path::to_path_buf)
        .or_else(|| lookup("SYNSYU_CONFIG_PATH").filter(|p| !p.is_empty()).map(PathBuf::from));

    let config_path = match requested {
        Some(path) => {
            if !path.exists() {
                return Err(Error::ConfigInvalid(format!(
                    "configuration file {} does not exist",
                    path.display()
                )));
            }
            Some(path)
        }
        None => default_config_path().filter(|p| p.exists()),
    };

    let file_layer = match &config_path {
        Some(path) => load_file(path)?,
        None => ConfigLayer::default(),
    };

    let merged = env_layer.overlay(file_layer).overlay(cli);
    Settings::from_layer(merged, config_path)
}

/// Resolve against the process environment
pub fn resolve_from_env(cli: ConfigLayer, explicit_config: Option<&Path>) -> Result<Settings> {
    resolve(cli, explicit_config, |key| std::env::var(key).ok())
}

/// Load one config file, refusing world-writable ones
pub fn load_file(path: &Path) -> Result<ConfigLayer> {
    ensure_secure_permissions(path)?;
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::ConfigInvalid(format!("failed to read {}: {}", path.display(), e))
    })?;
    debug!("Loaded configuration from {}", path.display());
    ConfigLayer::from_toml(&contents, path)
}

fn ensure_secure_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|e| {
        Error::ConfigInvalid(format!("failed to inspect {}: {}", path.display(), e))
    })?;
    if metadata.permissions().mode() & 0o002 != 0 {
        return Err(Error::ConfigInvalid(format!(
            "configuration file {} must not be world-writable",
            path.display()
        )));
    }
    Ok(())
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("syn-syu").join("config.toml"))
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("syn-syu")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o644)).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_layer(ConfigLayer::default(), None).unwrap();
        assert_eq!(settings.manifest_path, PathBuf::from(DEFAULT_MANIFEST_PATH));
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.min_free_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(settings.space_policy, SpacePolicy::Warn);
        assert_eq!(settings.log_level, Level::Info);
        assert_eq!(settings.helper_priority[0], "paru");
        assert_eq!(settings.privilege_command.as_deref(), Some("sudo"));
        assert!(settings.retention.is_disabled());
        assert!(!settings.dry_run);
    }

    #[test]
    fn test_file_overrides_env_and_cli_overrides_file() {
        let file = config_file(
            r#"
[core]
batch_size = 25
manifest_path = "/srv/manifest.json"

[space]
policy = "enforce"
"#,
        );
        let lookup = env(&[
            ("SYNSYU_BATCH_SIZE", "5"),
            ("SYNSYU_DRY_RUN", "1"),
            ("SYNSYU_MANIFEST_PATH", "/env/manifest.json"),
        ]);

        let mut cli = ConfigLayer::default();
        cli.core.manifest_path = Some(PathBuf::from("/cli/manifest.json"));

        let settings = resolve(cli, Some(file.path()), lookup).unwrap();
        assert_eq!(settings.batch_size, 25);
        assert!(settings.dry_run);
        assert_eq!(settings.manifest_path, PathBuf::from("/cli/manifest.json"));
        assert_eq!(settings.space_policy, SpacePolicy::Enforce);
        assert_eq!(settings.config_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_env_lists_split_on_newlines() {
        let layer = ConfigLayer::from_env(env(&[
            ("SYNSYU_INCLUDE", "^linux\n^mesa\n"),
            ("SYNSYU_WITH_FLATPAK", "yes"),
        ]))
        .unwrap();
        assert_eq!(
            layer.filters.include,
            Some(vec!["^linux".to_string(), "^mesa".to_string()])
        );
        assert_eq!(layer.applications.flatpak, Some(true));
    }

    #[test]
    fn test_min_free_bytes_from_env() {
        let layer = ConfigLayer::from_env(env(&[("SYNSYU_MIN_FREE_BYTES", "536870912")])).unwrap();
        let settings = Settings::from_layer(layer, None).unwrap();
        assert_eq!(settings.min_free_bytes, 512 * 1024 * 1024);

        // The GiB variable wins when both are set
        let layer = ConfigLayer::from_env(env(&[
            ("SYNSYU_MIN_FREE_BYTES", "536870912"),
            ("SYNSYU_MIN_FREE_GB", "3"),
        ]))
        .unwrap();
        let settings = Settings::from_layer(layer, None).unwrap();
        assert_eq!(settings.min_free_bytes, 3 * 1024 * 1024 * 1024);

        assert!(ConfigLayer::from_env(env(&[("SYNSYU_MIN_FREE_BYTES", "lots")])).is_err());
    }

    #[test]
    fn test_invalid_env_values_rejected() {
        assert!(ConfigLayer::from_env(env(&[("SYNSYU_DRY_RUN", "maybe")])).is_err());
        assert!(ConfigLayer::from_env(env(&[("SYNSYU_BATCH_SIZE", "ten")])).is_err());
        assert!(ConfigLayer::from_env(env(&[("SYNSYU_SPACE_POLICY", "panic")])).is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut layer = ConfigLayer::default();
        layer.core.batch_size = Some(0);
        assert!(matches!(
            Settings::from_layer(layer, None).unwrap_err(),
            Error::ConfigInvalid(_)
        ));

        let mut layer = ConfigLayer::default();
        layer.logging.level = Some("chatty".to_string());
        assert!(Settings::from_layer(layer, None).is_err());

        let mut layer = ConfigLayer::default();
        layer.filters.exclude = Some(vec!["[".to_string()]);
        assert!(Settings::from_layer(layer, None).is_err());

        let mut layer = ConfigLayer::default();
        layer.core.no_aur = Some(true);
        layer.core.no_repo = Some(true);
        assert!(Settings::from_layer(layer, None).is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let result = resolve(
            ConfigLayer::default(),
            Some(Path::new("/nonexistent/syn-syu.toml")),
            env(&[]),
        );
        assert!(matches!(result.unwrap_err(), Error::ConfigInvalid(_)));
    }

    #[test]
    fn test_world_writable_config_rejected() {
        let file = config_file("[core]\nbatch_size = 3\n");
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o666)).unwrap();

        let err = load_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-writable"));
    }

    #[test]
    fn test_unknown_policy_in_file_rejected() {
        let file = config_file("[space]\npolicy = \"sometimes\"\n");
        assert!(load_file(file.path()).is_err());
    }

    #[test]
    fn test_disabled_snapshots_drop_commands() {
        let file = config_file(
            "[snapshots]\nenabled = false\npre_command = \"snapper create\"\n",
        );
        let settings = resolve(ConfigLayer::default(), Some(file.path()), env(&[])).unwrap();
        assert_eq!(settings.snapshots, SnapshotHooks::default());
    }

    #[test]
    fn test_empty_privilege_command_means_none() {
        let file = config_file("[core]\nprivilege_command = \"\"\n");
        let settings = resolve(ConfigLayer::default(), Some(file.path()), env(&[])).unwrap();
        assert_eq!(settings.privilege_command, None);
    }
}
