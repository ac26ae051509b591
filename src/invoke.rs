// src/invoke.rs

//! Invocation of external package managers, helpers and hooks
//!
//! The orchestrator only talks to the outside world through the `Invoker`
//! trait, so batch and individual execution can be exercised against fakes.
//! `SystemInvoker` is the production implementation: every call blocks until
//! the child exits, and calls are never issued concurrently.

use crate::error::{Error, Result};
use crate::manifest::AppSource;
use std::fmt;
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::debug;

/// Exit status of an external invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationStatus {
    code: Option<i32>,
}

impl InvocationStatus {
    pub const fn success() -> Self {
        Self { code: Some(0) }
    }

    pub const fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<ExitStatus> for InvocationStatus {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Capability interface over the external managers
pub trait Invoker {
    /// Upgrade a batch of repository packages in one pacman call
    fn upgrade_batch(&mut self, packages: &[String]) -> Result<InvocationStatus>;

    /// Upgrade a single package through an AUR helper
    fn upgrade_with_helper(&mut self, helper: &str, package: &str) -> Result<InvocationStatus>;

    /// Apply pending updates of an application source
    fn update_application(&mut self, source: AppSource) -> Result<InvocationStatus>;

    /// Run a snapshot hook command line
    fn run_hook(&mut self, command: &str) -> Result<InvocationStatus>;
}

/// Runs the real pacman, helpers, flatpak, fwupdmgr and hook commands
#[derive(Debug, Clone)]
pub struct SystemInvoker {
    /// Prefix for pacman and fwupdmgr (usually `sudo`); `None` when already root
    privilege: Option<String>,
    /// Keep the managers interactive instead of passing --noconfirm / -y
    confirm: bool,
}

impl SystemInvoker {
    pub fn new(privilege: Option<String>, confirm: bool) -> Self {
        Self {
            privilege: privilege.filter(|p| !p.trim().is_empty()),
            confirm,
        }
    }

    /// Command line for a batched repository upgrade
    pub fn batch_argv(&self, packages: &[String]) -> Vec<String> {
        let mut argv = self.privileged(&["pacman", "-S", "--needed"]);
        if !self.confirm {
            argv.push("--noconfirm".to_string());
        }
        argv.extend(packages.iter().cloned());
        argv
    }

    /// Command line for a helper upgrade; helpers escalate on their own
    pub fn helper_argv(&self, helper: &str, package: &str) -> Vec<String> {
        let mut argv = vec![helper.to_string(), "-S".to_string(), "--needed".to_string()];
        if !self.confirm {
            argv.push("--noconfirm".to_string());
        }
        argv.push(package.to_string());
        argv
    }

    /// Command line for an application source update
    pub fn application_argv(&self, source: AppSource) -> Vec<String> {
        let mut argv = match source {
            AppSource::Flatpak => vec!["flatpak".to_string(), "update".to_string()],
            AppSource::Fwupd => self.privileged(&["fwupdmgr", "update"]),
        };
        if !self.confirm {
            argv.push(match source {
                AppSource::Flatpak => "-y".to_string(),
                AppSource::Fwupd => "--assume-yes".to_string(),
            });
        }
        argv
    }

    /// Command line for dropping cached package files of uninstalled versions
    pub fn cache_clean_argv(&self) -> Vec<String> {
        let mut argv = self.privileged(&["pacman", "-Sc"]);
        if !self.confirm {
            argv.push("--noconfirm".to_string());
        }
        argv
    }

    /// Command line for removing packages with their unneeded dependencies
    pub fn remove_argv(&self, packages: &[String]) -> Vec<String> {
        let mut argv = self.privileged(&["pacman", "-Rns"]);
        if !self.confirm {
            argv.push("--noconfirm".to_string());
        }
        argv.extend(packages.iter().cloned());
        argv
    }

    pub fn clean_cache(&mut self) -> Result<InvocationStatus> {
        spawn("cache clean", &self.cache_clean_argv())
    }

    pub fn remove_packages(&mut self, packages: &[String]) -> Result<InvocationStatus> {
        spawn("orphan removal", &self.remove_argv(packages))
    }

    fn privileged(&self, args: &[&str]) -> Vec<String> {
        self.privilege
            .iter()
            .cloned()
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }
}

impl Default for SystemInvoker {
    fn default() -> Self {
        Self::new(Some("sudo".to_string()), false)
    }
}

impl Invoker for SystemInvoker {
    fn upgrade_batch(&mut self, packages: &[String]) -> Result<InvocationStatus> {
        spawn("pacman", &self.batch_argv(packages))
    }

    fn upgrade_with_helper(&mut self, helper: &str, package: &str) -> Result<InvocationStatus> {
        spawn(helper, &self.helper_argv(helper, package))
    }

    fn update_application(&mut self, source: AppSource) -> Result<InvocationStatus> {
        spawn(source.as_str(), &self.application_argv(source))
    }

    fn run_hook(&mut self, command: &str) -> Result<InvocationStatus> {
        spawn(
            "snapshot hook",
            &["sh".to_string(), "-c".to_string(), command.to_string()],
        )
    }
}

/// Run the external resolver that regenerates the manifest
///
/// The command runs through `sh -c` with `SYNSYU_MANIFEST_PATH` pointing at
/// the manifest it is expected to write.
pub fn rebuild_manifest(command: &str, manifest_path: &Path) -> Result<()> {
    debug!("Rebuilding manifest {}: {}", manifest_path.display(), command);

    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .env("SYNSYU_MANIFEST_PATH", manifest_path)
        .status()
        .map_err(|e| Error::ManagerInvocationFailed {
            scope: "manifest rebuild".to_string(),
            detail: format!("failed to launch: {}", e),
        })?;

    let status = InvocationStatus::from(status);
    if !status.is_success() {
        return Err(Error::ManagerInvocationFailed {
            scope: "manifest rebuild".to_string(),
            detail: status.to_string(),
        });
    }
    Ok(())
}

/// Packages installed as dependencies that nothing requires any more
///
/// `pacman -Qtdq` exits with status 1 and prints nothing when there are no
/// orphans; that is an empty list, not an error.
pub fn list_orphans() -> Result<Vec<String>> {
    let output = Command::new("pacman")
        .arg("-Qtdq")
        .output()
        .map_err(|e| Error::ManagerInvocationFailed {
            scope: "orphan query".to_string(),
            detail: format!("failed to launch pacman: {}", e),
        })?;

    let names = parse_package_list(&String::from_utf8_lossy(&output.stdout));
    let status = InvocationStatus::from(output.status);
    if !status.is_success() && !(status.code() == Some(1) && names.is_empty()) {
        return Err(Error::ManagerInvocationFailed {
            scope: "orphan query".to_string(),
            detail: status.to_string(),
        });
    }
    Ok(names)
}

fn parse_package_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn spawn(scope: &str, argv: &[String]) -> Result<InvocationStatus> {
    let (program, args) = argv.split_first().ok_or_else(|| Error::ManagerInvocationFailed {
        scope: scope.to_string(),
        detail: "empty command line".to_string(),
    })?;

    debug!("Running: {}", argv.join(" "));

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| Error::ManagerInvocationFailed {
            scope: scope.to_string(),
            detail: format!("failed to launch {}: {}", program, e),
        })?;

    Ok(status.into())
}


#[cfg(test)]
pub(crate) mod fake {
    //! Recording invoker for unit tests

    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Batch(Vec<String>),
        Helper(String, String),
        Application(AppSource),
        Hook(String),
    }

    /// Records every call; selected calls report exit status 1
    #[derive(Debug, Default)]
    pub(crate) struct FakeInvoker {
        pub calls: Vec<Call>,
        /// Batches containing any of these names fail
        pub failing_packages: HashSet<String>,
        pub failing_sources: HashSet<AppSource>,
        pub failing_hooks: bool,
    }

    impl FakeInvoker {
        pub(crate) fn failing(packages: &[&str]) -> Self {
            Self {
                failing_packages: packages.iter().map(|p| p.to_string()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn batches(&self) -> Vec<&Vec<String>> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Batch(pkgs) => Some(pkgs),
                    _ => None,
                })
                .collect()
        }

        fn status(failed: bool) -> InvocationStatus {
            if failed {
                InvocationStatus::from_code(1)
            } else {
                InvocationStatus::success()
            }
        }
    }

    impl Invoker for FakeInvoker {
        fn upgrade_batch(&mut self, packages: &[String]) -> Result<InvocationStatus> {
            self.calls.push(Call::Batch(packages.to_vec()));
            let failed = packages.iter().any(|p| self.failing_packages.contains(p));
            Ok(Self::status(failed))
        }

        fn upgrade_with_helper(&mut self, helper: &str, package: &str) -> Result<InvocationStatus> {
            self.calls
                .push(Call::Helper(helper.to_string(), package.to_string()));
            Ok(Self::status(self.failing_packages.contains(package)))
        }

        fn update_application(&mut self, source: AppSource) -> Result<InvocationStatus> {
            self.calls.push(Call::Application(source));
            Ok(Self::status(self.failing_sources.contains(&source)))
        }

        fn run_hook(&mut self, command: &str) -> Result<InvocationStatus> {
            self.calls.push(Call::Hook(command.to_string()));
            Ok(Self::status(self.failing_hooks))
        }
    }
}
