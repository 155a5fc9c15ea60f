//! Command execution gating.
//!
//! This is the single entry point the command executor calls before running
//! anything. It applies the sandbox short-circuit and otherwise defers to the
//! composite validator.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::context::PermissionContext;
use crate::error::{GateError, GateResult};

use super::decision::{Decision, DecisionReason, RawCommand};
use super::oracle::PrefixOracle;
use super::validator::{decide, ValidatorSettings};

/// What the executor does with a command after gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionDecision {
    /// Run it now
    Execute { command: String },
    /// Show the prompt to a human and wait
    RequireConfirmation { message: String },
    /// Refuse and report `message` back to the requester
    Refuse { message: String },
}

impl ExecutionDecision {
    /// Process exit status used by the command line front end.
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Execute { .. } => 0,
            Self::RequireConfirmation { .. } => 1,
            Self::Refuse { .. } => 2,
        }
    }
}

impl From<&Decision> for ExecutionDecision {
    fn from(decision: &Decision) -> Self {
        match decision {
            Decision::Allow {
                updated_command, ..
            } => Self::Execute {
                command: updated_command.clone(),
            },
            Decision::Ask { message, .. } => Self::RequireConfirmation {
                message: message.clone(),
            },
            Decision::Deny { message, .. } => Self::Refuse {
                message: message.clone(),
            },
        }
    }
}

/// Gate a proposed command.
///
/// Sandboxed commands are allowed without consulting any rule. Everything
/// else goes through [`decide`]. Returns [`GateError::Aborted`] when `cancel`
/// fires while the prefix classifier is running; the command must then be
/// dropped without asking anyone.
pub async fn gate_command(
    raw: &RawCommand,
    ctx: &PermissionContext,
    oracle: &dyn PrefixOracle,
    cancel: &CancellationToken,
    settings: &ValidatorSettings,
) -> GateResult<Decision> {
    if raw.is_sandboxed() {
        debug!("Sandboxed command allowed: {}", raw.command);
        return Ok(Decision::allow(&raw.command, DecisionReason::SandboxOrReadOnly));
    }

    let decision = decide(&raw.command, ctx, oracle, cancel, settings).await?;
    info!("Gate decision for '{}': {}", raw.command, decision.behavior());
    Ok(decision)
}
