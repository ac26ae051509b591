// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use cli::{Cli, Commands};
use commands::ExportSelection;
use std::process::ExitCode;
use synsyu::config::{self, Settings};
use synsyu::exit;
use synsyu::manifest::AppSource;
use synsyu::orchestrator::RunScope;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => exit::SUCCESS,
                ErrorKind::InvalidSubcommand => exit::UNKNOWN_COMMAND,
                ErrorKind::ArgumentConflict => exit::CONFLICTING_FLAGS,
                _ => exit::CONFIG,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    // Initialize tracing subscriber for logging
    let default_level = if cli.globals.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<synsyu::Error>()
                .map(synsyu::Error::exit_code)
                .unwrap_or(exit::CONFIG);
            ExitCode::from(code)
        }
    }
}

fn dispatch(cli: Cli) -> Result<u8> {
    let Some(command) = cli.command else {
        println!("Syn-Syu v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'syn-syu --help' for usage information");
        return Ok(exit::SUCCESS);
    };

    if let Commands::Completions { shell } = command {
        return commands::cmd_completions(shell);
    }

    let settings = config::resolve_from_env(cli.globals.to_layer(), cli.globals.config.as_deref())?;

    match command {
        Commands::Sync => {
            let apps = enabled_applications(&settings);
            commands::cmd_run(&settings, RunScope::All, apps)
        }
        Commands::Aur => commands::cmd_run(&settings, RunScope::HelperOnly, Vec::new()),
        Commands::Repo => commands::cmd_run(&settings, RunScope::RepoOnly, Vec::new()),
        Commands::Update { packages } => {
            commands::cmd_run(&settings, RunScope::Targeted(packages), Vec::new())
        }
        Commands::Flatpak => {
            commands::cmd_run(&settings, RunScope::ApplicationsOnly, vec![AppSource::Flatpak])
        }
        Commands::Fwupd => {
            commands::cmd_run(&settings, RunScope::ApplicationsOnly, vec![AppSource::Fwupd])
        }
        Commands::Apps => commands::cmd_run(
            &settings,
            RunScope::ApplicationsOnly,
            AppSource::ALL.to_vec(),
        ),
        Commands::Check => commands::cmd_check(&settings),
        Commands::Inspect { package } => commands::cmd_inspect(&settings, &package),
        Commands::Export {
            repo_only,
            aur_only,
            all,
            output,
        } => commands::cmd_export(
            &settings,
            ExportSelection {
                repo_only,
                aur_only,
                all,
            },
            output.as_deref(),
        ),
        Commands::Log { verify, limit } => commands::cmd_log(&settings, verify, limit),
        Commands::Clean => commands::cmd_clean(&settings),
        Commands::Completions { .. } => Ok(exit::SUCCESS),
    }
}

/// Application sources `sync` covers after packages
fn enabled_applications(settings: &Settings) -> Vec<AppSource> {
    let mut sources = Vec::new();
    if settings.flatpak {
        sources.push(AppSource::Flatpak);
    }
    if settings.fwupd {
        sources.push(AppSource::Fwupd);
    }
    sources
}
