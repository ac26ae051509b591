// src/cli.rs
//! Command-line definitions for `syn-syu`
//!
//! Global flags are accepted before or after the subcommand. Flags that only
//! make sense for package runs are still global so that a shared config
//! layer can be built from them in one place.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use synsyu::config::ConfigLayer;
use synsyu::safety::SpacePolicy;

#[derive(Parser, Debug)]
#[command(name = "syn-syu")]
#[command(author, version, about = "Manifest-driven update orchestration for Arch-based systems", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: ~/.config/syn-syu/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Manifest path (default: /tmp/syn-syu_manifest.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Regenerate the manifest before reading it
    #[arg(long, global = true)]
    pub rebuild: bool,

    /// Report what would be done without invoking any manager
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Repository packages per pacman invocation
    #[arg(long = "batch", global = true, value_name = "N")]
    pub batch: Option<usize>,

    /// Only consider packages matching this regex (repeatable)
    #[arg(long, global = true, value_name = "REGEX")]
    pub include: Vec<String>,

    /// Skip packages matching this regex (repeatable, wins over --include)
    #[arg(long, global = true, value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Force a specific AUR helper
    #[arg(long, global = true, value_name = "NAME")]
    pub helper: Option<String>,

    /// Free space to keep in reserve, in GiB
    #[arg(long, global = true, value_name = "GB")]
    pub min_free_gb: Option<f64>,

    /// What to do when the disk check fails: warn or enforce
    #[arg(long, global = true, value_name = "POLICY")]
    pub space_policy: Option<SpacePolicy>,

    /// Skip AUR packages
    #[arg(long, global = true, conflicts_with = "no_repo")]
    pub no_aur: bool,

    /// Skip repository packages
    #[arg(long, global = true)]
    pub no_repo: bool,

    /// Include Flatpak updates
    #[arg(long, global = true, conflicts_with = "no_flatpak")]
    pub with_flatpak: bool,

    /// Exclude Flatpak updates
    #[arg(long, global = true)]
    pub no_flatpak: bool,

    /// Include firmware updates
    #[arg(long, global = true, conflicts_with = "no_fwupd")]
    pub with_fwupd: bool,

    /// Exclude firmware updates
    #[arg(long, global = true)]
    pub no_fwupd: bool,

    /// Ask before starting and let the managers prompt
    #[arg(long, global = true)]
    pub confirm: bool,

    /// Exit with status 1 when any package failed
    #[arg(long, global = true)]
    pub strict: bool,

    /// Echo every log event to the console
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress progress and summary output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Machine-readable output
    #[arg(long, global = true)]
    pub json: bool,
}

impl GlobalArgs {
    /// Config layer holding only the flags that were given
    pub fn to_layer(&self) -> ConfigLayer {
        let set = |flag: bool| flag.then_some(true);

        let mut layer = ConfigLayer::default();
        layer.core.manifest_path = self.manifest.clone();
        layer.core.batch_size = self.batch;
        layer.core.rebuild = set(self.rebuild);
        layer.core.dry_run = set(self.dry_run);
        layer.core.confirm = set(self.confirm);
        layer.core.strict = set(self.strict);
        layer.core.json = set(self.json);
        layer.core.no_aur = set(self.no_aur);
        layer.core.no_repo = set(self.no_repo);

        layer.helpers.force = self.helper.clone();

        layer.space.min_free_gb = self.min_free_gb;
        layer.space.policy = self.space_policy;

        layer.logging.verbose = set(self.verbose);
        layer.logging.quiet = set(self.quiet);

        if !self.include.is_empty() {
            layer.filters.include = Some(self.include.clone());
        }
        if !self.exclude.is_empty() {
            layer.filters.exclude = Some(self.exclude.clone());
        }

        layer.applications.flatpak = toggle(self.with_flatpak, self.no_flatpak);
        layer.applications.fwupd = toggle(self.with_fwupd, self.no_fwupd);
        layer
    }
}

fn toggle(with: bool, without: bool) -> Option<bool> {
    match (with, without) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upgrade every eligible package, then enabled application sources
    Sync,

    /// Upgrade AUR packages only
    Aur,

    /// Upgrade repository packages only
    Repo,

    /// Upgrade the named packages
    Update {
        /// Package names
        #[arg(required = true, value_name = "PKG")]
        packages: Vec<String>,
    },

    /// Apply pending Flatpak updates
    Flatpak,

    /// Apply pending firmware updates
    Fwupd,

    /// Apply Flatpak and firmware updates
    Apps,

    /// Summarize the manifest
    Check,

    /// Show the manifest entry of one package
    Inspect {
        /// Package name
        #[arg(value_name = "PKG")]
        package: String,
    },

    /// Write the list of updatable packages
    Export {
        /// Repository packages only
        #[arg(long, conflicts_with = "aur_only")]
        repo_only: bool,

        /// AUR packages only
        #[arg(long)]
        aur_only: bool,

        /// Include packages without a pending update
        #[arg(long)]
        all: bool,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// List recent session logs
    Log {
        /// Check every log against its digest
        #[arg(long)]
        verify: bool,

        /// Number of sessions to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Prune session logs, clean the package cache and remove orphans
    Clean,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("syn-syu").chain(args.iter().copied()))
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["sync", "--dry-run", "--batch", "5", "--include", "^a", "--include", "^b"]).unwrap();
        assert!(cli.globals.dry_run);
        assert_eq!(cli.globals.batch, Some(5));
        assert_eq!(cli.globals.include, vec!["^a", "^b"]);
        assert!(matches!(cli.command, Some(Commands::Sync)));
    }

    #[test]
    fn test_conflicting_flags() {
        for args in [
            &["sync", "--no-aur", "--no-repo"][..],
            &["sync", "--verbose", "--quiet"][..],
            &["apps", "--with-flatpak", "--no-flatpak"][..],
            &["export", "--repo-only", "--aur-only"][..],
        ] {
            let err = parse(args).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ArgumentConflict, "{:?}", args);
        }
    }

    #[test]
    fn test_unknown_command() {
        let err = parse(&["frobnicate"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_update_requires_names() {
        assert!(parse(&["update"]).is_err());
        let cli = parse(&["update", "linux", "mesa"]).unwrap();
        match cli.command {
            Some(Commands::Update { packages }) => assert_eq!(packages, vec!["linux", "mesa"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_clean_accepts_global_flags() {
        let cli = parse(&["clean", "--dry-run", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Clean)));
        assert!(cli.globals.dry_run);
        assert!(cli.globals.json);
    }

    #[test]
    fn test_layer_only_sets_given_flags() {
        let cli = parse(&["sync", "--no-flatpak", "--space-policy", "enforce"]).unwrap();
        let layer = cli.globals.to_layer();
        assert_eq!(layer.applications.flatpak, Some(false));
        assert_eq!(layer.applications.fwupd, None);
        assert_eq!(layer.space.policy, Some(SpacePolicy::Enforce));
        assert_eq!(layer.core.dry_run, None);
        assert_eq!(layer.filters.include, None);
    }
}
