//! Security module: the command permission engine.
//!
//! Decides, for a shell command proposed by an agent, whether to run it,
//! ask a human, or refuse. Rule matching, read-only classification and the
//! working-directory guard are synchronous and pure; only the prefix
//! classifier fallback is asynchronous.

pub mod allowlist;
pub mod analyzer;
pub mod decision;
pub mod directory;
pub mod executor;
pub mod exit_code;
pub mod oracle;
pub mod rules;
pub mod validator;

#[cfg(test)]
mod tests;

pub use allowlist::is_read_only;
pub use decision::{Decision, DecisionReason, RawCommand, RuleSuggestion, SubcommandResult};
pub use executor::{gate_command, ExecutionDecision};
pub use exit_code::{interpret, ExitInterpretation};
pub use oracle::{FixedOracle, PrefixOracle, PrefixQueryResult, UnavailableOracle};
pub use rules::{Effect, MatchDiscipline, PermissionRule, RuleSet};
pub use validator::{decide, ValidatorSettings};
