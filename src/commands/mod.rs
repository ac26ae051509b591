// src/commands/mod.rs
//! Command implementations for the `syn-syu` binary
//!
//! Every command returns the process exit status on success; errors are
//! mapped to their exit class in `main`.

mod clean;
mod inspect;
mod logs;
mod run;

pub use clean::cmd_clean;
pub use inspect::{ExportSelection, cmd_check, cmd_export, cmd_inspect};
pub use logs::cmd_log;
pub use run::cmd_run;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io;
use synsyu::exit;

use crate::cli::Cli;

/// Write a completion script for `shell` to stdout
pub fn cmd_completions(shell: Shell) -> Result<u8> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "syn-syu", &mut io::stdout());
    Ok(exit::SUCCESS)
}
