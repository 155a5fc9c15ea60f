//! Gate configuration loaded from JSON.
//!
//! ```json
//! {
//!   "permissions": {
//!     "allow": ["Bash(npm test:*)", "Bash(git status)"],
//!     "deny":  ["Bash(rm -rf:*)"]
//!   },
//!   "additional_directories": ["../shared"],
//!   "non_interactive": false,
//!   "oracle_timeout_ms": 30000,
//!   "max_depth": 8
//! }
//! ```
//!
//! The file is read-only input: suggested rules are never written back.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::PermissionContext;
use crate::security::rules::{Effect, PermissionRule, RuleSet};
use crate::security::validator::{ValidatorSettings, DEFAULT_MAX_DEPTH, DEFAULT_ORACLE_TIMEOUT};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub permissions: PermissionsConfig,
    /// Extra directories `cd` may enter, besides the working directory.
    #[serde(default)]
    pub additional_directories: Vec<PathBuf>,
    #[serde(default)]
    pub non_interactive: bool,
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_oracle_timeout_ms() -> u64 {
    DEFAULT_ORACLE_TIMEOUT.as_millis() as u64
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            permissions: PermissionsConfig::default(),
            additional_directories: Vec::new(),
            non_interactive: false,
            oracle_timeout_ms: default_oracle_timeout_ms(),
            max_depth: default_max_depth(),
            log_dir: None,
        }
    }
}

impl GateConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid gate config JSON at {}", path.display()))?;
        Ok(config)
    }

    /// Parsed rule set. Malformed rule strings are skipped with a warning;
    /// a rule that cannot be read grants and refuses nothing.
    pub fn rules(&self) -> RuleSet {
        let mut rules = RuleSet::new();
        let entries = self
            .permissions
            .allow
            .iter()
            .map(|r| (r, Effect::Allow))
            .chain(self.permissions.deny.iter().map(|r| (r, Effect::Deny)));

        for (raw, effect) in entries {
            match PermissionRule::parse(raw, effect) {
                Ok(rule) => rules.insert(rule),
                Err(e) => warn!("Skipping rule: {}", e),
            }
        }
        rules
    }

    /// Session context rooted at `cwd`.
    pub fn permission_context(&self, cwd: impl Into<PathBuf>) -> PermissionContext {
        let mut ctx = PermissionContext::new(cwd).with_rules(self.rules());
        for dir in &self.additional_directories {
            ctx.add_allowed_directory(dir.clone());
        }
        ctx.home = std::env::var_os("HOME").map(PathBuf::from);
        ctx.non_interactive = self.non_interactive;
        ctx
    }

    pub fn settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            max_depth: self.max_depth,
            oracle_timeout: Duration::from_millis(self.oracle_timeout_ms),
        }
    }
}
