// src/helper.rs

//! AUR helper detection and selection

use std::env;
use std::ffi::OsStr;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Known helpers, in default priority order
pub const HELPER_CANDIDATES: &[&str] = &["paru", "yay", "trizen", "pikaur", "aura", "pamac"];

/// Helpers present on `PATH`, in candidate-list order
pub fn detect() -> Vec<String> {
    match env::var_os("PATH") {
        Some(path) => detect_in(path),
        None => Vec::new(),
    }
}

/// Helpers present in an explicit search path, in candidate-list order
pub fn detect_in<S: AsRef<OsStr>>(search_path: S) -> Vec<String> {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let detected: Vec<String> = HELPER_CANDIDATES
        .iter()
        .filter(|name| which::which_in(name, Some(search_path.as_ref()), &cwd).is_ok())
        .map(|name| name.to_string())
        .collect();

    debug!("Detected AUR helpers: {:?}", detected);
    detected
}

/// Pick the helper for this run
///
/// A forced name is returned as-is, even when it was not detected; otherwise
/// the first priority entry that is present wins, then the first detected
/// helper. `None` means AUR operations are disabled for the run.
pub fn select(detected: &[String], priority: &[String], forced: Option<&str>) -> Option<String> {
    if let Some(forced) = forced {
        if !detected.iter().any(|d| d == forced) {
            warn!("Forced helper '{}' was not detected on PATH", forced);
        }
        return Some(forced.to_string());
    }

    priority
        .iter()
        .find(|name| detected.contains(name))
        .or_else(|| detected.first())
        .cloned()
}
