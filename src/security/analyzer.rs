//! Last-chance metacharacter net.
//!
//! Even when every sub-command is individually allowed, the raw command line
//! is only approved without consulting the prefix classifier if it contains
//! none of these characters. This overlaps with the pipeline verifier's
//! operator allow-list without being identical to it; both run, and any
//! input one accepts while the other rejects is logged.

use tracing::warn;

use crate::shell::is_pipeline_safe;

pub const DANGEROUS_CHARACTERS: &[char] = &['`', '$', '<', '>', '(', ')', '{', '}', '\n', '\r'];

pub fn has_dangerous_characters(command: &str) -> bool {
    command.contains(DANGEROUS_CHARACTERS)
}

/// Disagreement between the pipeline verifier and the metacharacter net.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDivergence {
    Agree,
    /// Verifier accepts, net rejects (e.g. `ls 2>/dev/null`, `echo "$X"`).
    VerifierOnly,
    /// Net accepts, verifier rejects (e.g. `a; b`, `ls # c`, `sleep 1 &`).
    NetOnly,
}

pub fn check_divergence(command: &str) -> CheckDivergence {
    match (is_pipeline_safe(command), has_dangerous_characters(command)) {
        (true, true) => CheckDivergence::VerifierOnly,
        (false, false) => CheckDivergence::NetOnly,
        _ => CheckDivergence::Agree,
    }
}

/// Log a divergence, if any, and return it.
pub fn report_divergence(command: &str) -> CheckDivergence {
    let divergence = check_divergence(command);
    if divergence != CheckDivergence::Agree {
        warn!(?divergence, command, "pipeline verifier and metacharacter net disagree");
    }
    divergence
}
