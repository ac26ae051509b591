// src/filter.rs

//! Include/exclude name filtering
//!
//! Patterns are regular expressions searched anywhere in the package name
//! (not anchored unless the pattern anchors itself). Exclusion always wins.

use crate::error::{Error, Result};
use regex::Regex;

/// Compiled include and exclude patterns
#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PackageFilter {
    /// Compile the given patterns; any invalid pattern is a configuration error
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile(include, "include")?,
            exclude: compile(exclude, "exclude")?,
        })
    }

    /// Whether `name` passes both the include and the exclude rules
    pub fn matches(&self, name: &str) -> bool {
        matches(name, &self.include, &self.exclude)
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Accept `name` if it hits an include pattern (or none are given) and no exclude pattern
pub fn matches(name: &str, include: &[Regex], exclude: &[Regex]) -> bool {
    if !include.is_empty() && !include.iter().any(|re| re.is_match(name)) {
        return false;
    }
    !exclude.iter().any(|re| re.is_match(name))
}

fn compile(patterns: &[String], kind: &str) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| {
                Error::ConfigInvalid(format!("invalid {} pattern '{}': {}", kind, pattern, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> PackageFilter {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        PackageFilter::new(&include, &exclude).unwrap()
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let f = filter(&[], &[]);
        assert!(f.is_empty());
        assert!(f.matches("linux"));
        assert!(f.matches(""));
    }

    #[test]
    fn test_exclude_overrides_include() {
        let f = filter(&["^foo"], &["bar"]);
        let accepted: Vec<&str> = ["foobar", "foobaz", "other"]
            .into_iter()
            .filter(|name| f.matches(name))
            .collect();
        assert_eq!(accepted, vec!["foobaz"]);
    }

    #[test]
    fn test_include_is_substring_search() {
        let f = filter(&["python"], &[]);
        assert!(f.matches("python-requests"));
        assert!(f.matches("lib32-python"));
        assert!(!f.matches("ruby"));
    }

    #[test]
    fn test_any_include_pattern_is_enough() {
        let f = filter(&["^linux$", "^nvidia"], &[]);
        assert!(f.matches("linux"));
        assert!(f.matches("nvidia-utils"));
        assert!(!f.matches("linux-headers"));
    }

    #[test]
    fn test_exclude_only() {
        let f = filter(&[], &["-git$"]);
        assert!(f.matches("neovim"));
        assert!(!f.matches("neovim-git"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let result = PackageFilter::new(&["(unclosed".to_string()], &[]);
        assert!(matches!(result.unwrap_err(), Error::ConfigInvalid(_)));
    }
}
