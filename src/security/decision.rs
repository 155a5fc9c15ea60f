//! Decision values produced by the permission engine.
//!
//! Allow, Deny and Ask are ordinary results. The structured [`DecisionReason`]
//! travels alongside the human-facing message so callers and tests can
//! inspect why a decision was reached without parsing prose.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::rules::{PermissionRule, BASH_TOOL_NAME, PREFIX_WILDCARD};

/// A shell command proposed for execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommand {
    pub command: String,
    /// Run inside the sandboxed execution mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<bool>,
    /// Execution timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RawCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn sandboxed(mut self) -> Self {
        self.sandbox = Some(true);
        self
    }

    pub fn is_sandboxed(&self) -> bool {
        self.sandbox.unwrap_or(false)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_millis)
    }
}

/// A rule a human could add to stop being asked about similar commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RuleSuggestion {
    pub tool_name: String,
    pub rule_content: String,
}

impl RuleSuggestion {
    /// A `prefix:*` suggestion for the shell tool.
    pub fn prefix(prefix: &str) -> Self {
        Self {
            tool_name: BASH_TOOL_NAME.to_string(),
            rule_content: format!("{}{}", prefix.trim(), PREFIX_WILDCARD),
        }
    }
}

/// Decision for one sub-command of a composite command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubcommandResult {
    pub command: String,
    pub decision: Decision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DecisionReason {
    RuleMatch(PermissionRule),
    SandboxOrReadOnly,
    /// Per sub-command decisions, in command order.
    SubcommandResults(Vec<SubcommandResult>),
    PrefixQueryFailed,
    InjectionSuspected,
    UnsupportedOperator,
    MultipleCdDetected,
    WorkingDirectoryBlocked { path: String },
    /// No rule, read-only signature or directory check resolved the command.
    NoRuleMatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum Decision {
    Allow {
        updated_command: String,
        reason: DecisionReason,
    },
    Deny {
        message: String,
        reason: DecisionReason,
    },
    Ask {
        message: String,
        reason: DecisionReason,
        /// Empty when no actionable suggestion exists.
        rule_suggestions: Vec<RuleSuggestion>,
    },
}

impl Decision {
    pub fn allow(command: &str, reason: DecisionReason) -> Self {
        Self::Allow {
            updated_command: command.to_string(),
            reason,
        }
    }

    pub fn deny(message: impl Into<String>, reason: DecisionReason) -> Self {
        Self::Deny {
            message: message.into(),
            reason,
        }
    }

    pub fn ask(message: impl Into<String>, reason: DecisionReason) -> Self {
        Self::Ask {
            message: message.into(),
            reason,
            rule_suggestions: Vec::new(),
        }
    }

    pub fn ask_with_suggestions(
        message: impl Into<String>,
        reason: DecisionReason,
        rule_suggestions: Vec<RuleSuggestion>,
    ) -> Self {
        Self::Ask {
            message: message.into(),
            reason,
            rule_suggestions,
        }
    }

    /// Deny produced by a matching deny rule.
    pub fn denied_by(command: &str, rule: &PermissionRule) -> Self {
        Self::deny(
            format!("Permission to run `{command}` has been denied by rule {rule}."),
            DecisionReason::RuleMatch(rule.clone()),
        )
    }

    /// Point an Allow at `command`. Other decisions are returned unchanged.
    pub fn for_command(self, command: &str) -> Self {
        match self {
            Self::Allow { reason, .. } => Self::allow(command, reason),
            other => other,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    pub fn is_ask(&self) -> bool {
        matches!(self, Self::Ask { .. })
    }

    pub fn reason(&self) -> &DecisionReason {
        match self {
            Self::Allow { reason, .. } | Self::Deny { reason, .. } | Self::Ask { reason, .. } => {
                reason
            }
        }
    }

    pub fn rule_suggestions(&self) -> &[RuleSuggestion] {
        match self {
            Self::Ask {
                rule_suggestions, ..
            } => rule_suggestions,
            _ => &[],
        }
    }

    /// Lowercase behavior name (`"allow"`, `"deny"`, `"ask"`).
    pub fn behavior(&self) -> &'static str {
        match self {
            Self::Allow { .. } => "allow",
            Self::Deny { .. } => "deny",
            Self::Ask { .. } => "ask",
        }
    }
}
