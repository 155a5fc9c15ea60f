//! Permission rules and the rule matching engine.
//!
//! Rules are stored as `ToolName(content)` strings. Content ending in `:*` is
//! a prefix rule over the text before the wildcard; anything else must match
//! the whole (trimmed) command exactly. Matching is case-sensitive.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tool name that shell-execution rules are scoped to.
pub const BASH_TOOL_NAME: &str = "Bash";

/// Suffix that turns a rule into a prefix rule.
pub const PREFIX_WILDCARD: &str = ":*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// How a rule's content is compared against a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum RulePattern {
    Exact(String),
    Prefix(String),
}

impl RulePattern {
    /// Interpret stored rule content. Returns `None` when there is nothing
    /// to match against.
    pub fn parse(content: &str) -> Option<Self> {
        let content = content.trim();
        match content.strip_suffix(PREFIX_WILDCARD) {
            Some(prefix) => {
                let prefix = prefix.trim();
                (!prefix.is_empty()).then(|| Self::Prefix(prefix.to_string()))
            }
            None => (!content.is_empty()).then(|| Self::Exact(content.to_string())),
        }
    }

    pub fn matches(&self, command: &str, discipline: MatchDiscipline) -> bool {
        let command = command.trim();
        match (self, discipline) {
            (Self::Exact(text), MatchDiscipline::Exact) => command == text,
            (Self::Prefix(prefix), MatchDiscipline::Prefix) => command.starts_with(prefix.as_str()),
            _ => false,
        }
    }
}

/// Which pass of the matching engine is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDiscipline {
    Exact,
    Prefix,
}

/// A configured allow or deny rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionRule {
    pub tool_name: String,
    /// Rule content exactly as configured.
    pub content: String,
    pub effect: Effect,
}

impl PermissionRule {
    pub fn new(tool_name: impl Into<String>, content: impl Into<String>, effect: Effect) -> Self {
        Self {
            tool_name: tool_name.into(),
            content: content.into(),
            effect,
        }
    }

    pub fn bash(content: impl Into<String>, effect: Effect) -> Self {
        Self::new(BASH_TOOL_NAME, content, effect)
    }

    /// The interpreted pattern, or `None` when this rule cannot apply to
    /// shell commands at all.
    pub fn pattern(&self) -> Option<RulePattern> {
        if self.tool_name != BASH_TOOL_NAME {
            return None;
        }
        RulePattern::parse(&self.content)
    }

    fn matches(&self, command: &str, discipline: MatchDiscipline) -> bool {
        self.pattern()
            .is_some_and(|pattern| pattern.matches(command, discipline))
    }

    /// Parse `Tool(content)` with the given effect.
    pub fn parse(rule: &str, effect: Effect) -> Result<Self, RuleParseError> {
        let rule = rule.trim();
        let open = rule
            .find('(')
            .ok_or_else(|| RuleParseError(rule.to_string()))?;
        let content = rule[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| RuleParseError(rule.to_string()))?;
        let tool_name = rule[..open].trim();
        if tool_name.is_empty() {
            return Err(RuleParseError(rule.to_string()));
        }
        Ok(Self::new(tool_name, content, effect))
    }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tool_name, self.content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed permission rule: {0:?}")]
pub struct RuleParseError(pub String);

/// Allow and deny rules keyed by their content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    deny: BTreeMap<String, PermissionRule>,
    allow: BTreeMap<String, PermissionRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule: PermissionRule) {
        let key = rule.to_string();
        match rule.effect {
            Effect::Deny => self.deny.insert(key, rule),
            Effect::Allow => self.allow.insert(key, rule),
        };
    }

    pub fn with_allow(mut self, content: &str) -> Self {
        self.insert(PermissionRule::bash(content, Effect::Allow));
        self
    }

    pub fn with_deny(mut self, content: &str) -> Self {
        self.insert(PermissionRule::bash(content, Effect::Deny));
        self
    }

    /// Rules with the given effect, in content order.
    pub fn rules(&self, effect: Effect) -> impl Iterator<Item = &PermissionRule> {
        match effect {
            Effect::Deny => self.deny.values(),
            Effect::Allow => self.allow.values(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty() && self.allow.is_empty()
    }

    /// First matching rule under `discipline`, deny rules before allow rules.
    pub fn find(&self, command: &str, discipline: MatchDiscipline) -> Option<&PermissionRule> {
        self.rules(Effect::Deny)
            .chain(self.rules(Effect::Allow))
            .find(|rule| rule.matches(command, discipline))
    }

    /// Exact pass then prefix pass, each deny-first.
    ///
    /// A prefix deny still beats an exact allow.
    pub fn find_any(&self, command: &str) -> Option<&PermissionRule> {
        let exact = self.find(command, MatchDiscipline::Exact);
        if let Some(rule) = exact {
            if rule.effect == Effect::Deny {
                return Some(rule);
            }
        }
        match self.find(command, MatchDiscipline::Prefix) {
            Some(rule) if rule.effect == Effect::Deny => Some(rule),
            prefix => exact.or(prefix),
        }
    }
}

/// Free-function form of [`RuleSet::find`].
pub fn match_rule<'a>(
    command: &str,
    rules: &'a RuleSet,
    discipline: MatchDiscipline,
) -> Option<&'a PermissionRule> {
    rules.find(command, discipline)
}
