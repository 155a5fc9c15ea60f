//! Session context the permission engine reads from.
//!
//! The engine never mutates anything in here. A [`PermissionContext`] is built
//! once per session (usually from configuration), shared by reference across
//! concurrent decisions, and replaced wholesale when rules change.

mod cwd;


use std::path::{Path, PathBuf};

use crate::security::rules::{Effect, PermissionRule, RuleSet};

pub use cwd::{normalize, CurrentDir};

/// Read-only view of the session's rules and directories.
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    pub rules: RuleSet,
    /// Directories `cd` may enter, including descendants. Always contains
    /// the session's original working directory.
    allowed_directories: Vec<PathBuf>,
    pub cwd: CurrentDir,
    /// Home directory used to expand `~`; unknown means `~` is refused.
    pub home: Option<PathBuf>,
    /// True when no human is available to answer an Ask.
    pub non_interactive: bool,
}

impl PermissionContext {
    /// Context rooted at `cwd`, which is also the first allowed directory.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let cwd = CurrentDir::new(cwd);
        Self {
            allowed_directories: vec![cwd.path.clone()],
            cwd,
            ..Self::default()
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_allowed_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.add_allowed_directory(dir);
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn add_allowed_directory(&mut self, dir: impl Into<PathBuf>) {
        let dir = self.cwd.resolve(&dir.into().to_string_lossy());
        if !self.allowed_directories.contains(&dir) {
            self.allowed_directories.push(dir);
        }
    }

    /// Change the working directory the next decisions resolve against.
    pub fn update_cwd(&mut self, new_path: impl Into<PathBuf>) {
        self.cwd.update(new_path);
    }

    pub fn rules_by_effect(&self, effect: Effect) -> impl Iterator<Item = &PermissionRule> {
        self.rules.rules(effect)
    }

    pub fn allowed_directories(&self) -> &[PathBuf] {
        &self.allowed_directories
    }

    /// First allowed root, used when naming a root in messages.
    pub fn primary_directory(&self) -> &Path {
        self.allowed_directories
            .first()
            .map(PathBuf::as_path)
            .unwrap_or(self.cwd.path.as_path())
    }

    /// True when `path` is an allowed directory or inside one.
    pub fn is_in_allowed_directory(&self, path: &Path) -> bool {
        let path = normalize(path);
        self.allowed_directories
            .iter()
            .any(|root| path.starts_with(root))
    }
}
