//! RustyGate - permission engine for shell commands proposed by an agent
//!
//! Given a command line, decide whether to run it, ask a human, or refuse.
//! The crate is organized as:
//! - `shell`: tokenizer, separator splitter and pipeline safety verifier
//! - `security`: rules, read-only signatures, directory guard, the composite
//!   validator and exit code interpretation
//! - `context`: the read-only session context decisions are made against
//! - `config`: JSON configuration for rules, directories and limits
//!
//! # Example
//!
//! ```no_run
//! use rusty_gate::context::PermissionContext;
//! use rusty_gate::security::{gate_command, RawCommand, RuleSet, UnavailableOracle, ValidatorSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = PermissionContext::new("/home/user/project")
//!         .with_rules(RuleSet::new().with_allow("npm test:*").with_deny("rm -rf:*"));
//!
//!     let decision = gate_command(
//!         &RawCommand::new("npm test -- --watch"),
//!         &ctx,
//!         &UnavailableOracle,
//!         &CancellationToken::new(),
//!         &ValidatorSettings::default(),
//!     )
//!     .await;
//!
//!     if let Ok(decision) = decision {
//!         println!("{}", decision.behavior());
//!     }
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod security;
pub mod shell;
pub mod utils;

// Re-export commonly used types
pub use config::GateConfig;
pub use context::PermissionContext;
pub use error::{GateError, GateResult};
pub use security::{
    decide, gate_command, interpret, Decision, DecisionReason, ExitInterpretation, PrefixOracle,
    PrefixQueryResult, RawCommand, RuleSuggestion, ValidatorSettings,
};
