//! Contract for the external command-prefix classifier.
//!
//! The classifier itself (an AI-backed service in practice) lives outside
//! this crate. The engine only relies on the shape of its answer and on the
//! guarantee that a cancelled query is never acted upon.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::GateError;

/// What the classifier reports for a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixQueryResult {
    #[serde(default)]
    pub command_injection_detected: bool,
    /// Stable leading part of the command, e.g. `git commit`. `None` means
    /// no reusable prefix exists.
    #[serde(default)]
    pub command_prefix: Option<String>,
    /// Results for each sub-command of a composite command.
    #[serde(default)]
    pub subcommand_prefixes: HashMap<String, PrefixQueryResult>,
}

impl PrefixQueryResult {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    pub fn injection() -> Self {
        Self {
            command_injection_detected: true,
            ..Self::default()
        }
    }

    pub fn with_subcommand(mut self, command: impl Into<String>, result: PrefixQueryResult) -> Self {
        self.subcommand_prefixes.insert(command.into(), result);
        self
    }

    /// True when this result or any sub-command result flags injection.
    pub fn any_injection(&self) -> bool {
        self.command_injection_detected
            || self.subcommand_prefixes.values().any(Self::any_injection)
    }
}

/// External prefix classifier.
///
/// Implementations should return promptly once `cancel` fires; the engine
/// also checks the token itself after the call resolves.
#[async_trait]
pub trait PrefixOracle: Send + Sync {
    /// Classify `command`. `Ok(None)` means the classifier had no answer.
    async fn query(
        &self,
        command: &str,
        cancel: &CancellationToken,
        non_interactive: bool,
    ) -> Result<Option<PrefixQueryResult>, GateError>;
}

/// Oracle that always answers with the same result.
#[derive(Debug, Clone, Default)]
pub struct FixedOracle {
    pub result: PrefixQueryResult,
}

impl FixedOracle {
    pub fn new(result: PrefixQueryResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl PrefixOracle for FixedOracle {
    async fn query(
        &self,
        _command: &str,
        _cancel: &CancellationToken,
        _non_interactive: bool,
    ) -> Result<Option<PrefixQueryResult>, GateError> {
        Ok(Some(self.result.clone()))
    }
}

/// Oracle for deployments without a classifier: every query fails, which
/// the engine turns into an Ask.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOracle;

#[async_trait]
impl PrefixOracle for UnavailableOracle {
    async fn query(
        &self,
        _command: &str,
        _cancel: &CancellationToken,
        _non_interactive: bool,
    ) -> Result<Option<PrefixQueryResult>, GateError> {
        Err(GateError::Oracle("no prefix classifier configured".into()))
    }
}
