//! Composite command validator.
//!
//! Combines the tokenizer, splitter, pipeline verifier, read-only table,
//! rule engine and directory guard into one decision per command, and falls
//! back to the external prefix classifier only when all of those are
//! inconclusive. The checks run in a fixed order and short-circuit:
//!
//! 1. deny rules, for the whole command and every segment
//! 2. duplicate `cd`, then any `cd` leaving the allowed directories
//! 3. exact allow rule for the whole command
//! 4. top-level pipe: decide the left side, require a read-only right side
//! 5. compound commands that are not pipeline-safe
//! 6. per-segment rules, `cd` guard and read-only signatures
//! 7. one prefix classifier query for whatever is left
//!
//! Segments come from the coarse splitter, which also cuts at newlines, so
//! every line of a multi-line command is seen by the deny rules.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::PermissionContext;
use crate::error::{GateError, GateResult};
use crate::shell::{find_top_level_pipe, is_pipeline_safe, preserve_variables, split_command, tokenize, Token};

use super::allowlist::is_read_only;
use super::analyzer::{has_dangerous_characters, report_divergence};
use super::decision::{Decision, DecisionReason, RuleSuggestion, SubcommandResult};
use super::directory::{check_cd, count_effective_cd};
use super::oracle::{PrefixOracle, PrefixQueryResult};
use super::rules::{match_rule, Effect, MatchDiscipline};

pub const DEFAULT_MAX_DEPTH: usize = 8;
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorSettings {
    /// Deepest pipe recursion analysed before giving up with an Ask.
    pub max_depth: usize,
    pub oracle_timeout: Duration,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

/// Decide whether `command` may run.
///
/// Allow, Deny and Ask are all `Ok`. The only error is
/// [`GateError::Aborted`], returned when `cancel` fires while the prefix
/// classifier is being consulted.
pub async fn decide(
    command: &str,
    ctx: &PermissionContext,
    oracle: &dyn PrefixOracle,
    cancel: &CancellationToken,
    settings: &ValidatorSettings,
) -> GateResult<Decision> {
    decide_at(command.trim(), ctx, oracle, cancel, settings, 0).await
}

async fn decide_at(
    command: &str,
    ctx: &PermissionContext,
    oracle: &dyn PrefixOracle,
    cancel: &CancellationToken,
    settings: &ValidatorSettings,
    depth: usize,
) -> GateResult<Decision> {
    if depth > settings.max_depth {
        warn!("Recursion limit {} exceeded for: {}", settings.max_depth, command);
        return Ok(Decision::ask(
            format!("`{}` is nested too deeply to analyze and requires approval.", command),
            DecisionReason::UnsupportedOperator,
        ));
    }

    let segments = split_command(command);
    if segments.is_empty() {
        return Ok(Decision::ask(
            "An empty command requires approval.",
            DecisionReason::UnsupportedOperator,
        ));
    }

    if let Some(denied) = deny_sweep(command, &segments, ctx) {
        debug!("Denied by rule: {}", command);
        return Ok(denied);
    }

    if count_effective_cd(&segments, ctx) > 1 {
        return Ok(Decision::ask(
            "Changing directory more than once in a single command requires approval.",
            DecisionReason::MultipleCdDetected,
        ));
    }

    // No rule can move the session outside its allowed directories.
    if let Some(blocked) = segments
        .iter()
        .find_map(|segment| check_cd(segment, ctx).filter(|d| !d.is_allow()))
    {
        return Ok(blocked);
    }

    if let Some(rule) = ctx.rules.find(command, MatchDiscipline::Exact) {
        if rule.effect == Effect::Allow {
            return Ok(Decision::allow(
                command,
                DecisionReason::RuleMatch(rule.clone()),
            ));
        }
    }

    if let Some(pipe) = find_top_level_pipe(command) {
        return decide_pipe(command, pipe, ctx, oracle, cancel, settings, depth).await;
    }

    if segments.len() > 1 && !is_pipeline_safe(command) {
        return Ok(Decision::ask(
            format!(
                "`{}` combines commands with operators that cannot be analyzed safely and requires approval.",
                command
            ),
            DecisionReason::UnsupportedOperator,
        ));
    }

    // ========================================================================
    // Static per-segment checks
    // ========================================================================

    let statics: Vec<Option<Decision>> = segments
        .iter()
        .map(|segment| static_decision(segment, ctx))
        .collect();

    if let Some(blocked) = statics.iter().flatten().find(|d| {
        d.is_deny() || matches!(d.reason(), DecisionReason::WorkingDirectoryBlocked { .. })
    }) {
        return Ok(blocked.clone());
    }

    if statics.iter().all(|d| d.as_ref().is_some_and(Decision::is_allow)) {
        report_divergence(command);
        if !has_dangerous_characters(command) {
            return Ok(combine_allowed(command, &segments, statics));
        }
        debug!("All segments allowed but metacharacters present: {}", command);
    }

    // ========================================================================
    // Prefix classifier fallback
    // ========================================================================

    let Some(result) = query_oracle(command, ctx, oracle, cancel, settings).await? else {
        return Ok(Decision::ask(
            format!("Could not classify `{}`; it requires approval.", command),
            DecisionReason::PrefixQueryFailed,
        ));
    };

    if result.any_injection() {
        return Ok(Decision::ask(
            format!("`{}` may contain command injection and requires approval.", command),
            DecisionReason::InjectionSuspected,
        ));
    }

    if segments.len() == 1 {
        let static_decision = statics.into_iter().next().flatten();
        return Ok(decide_single(command, static_decision, &result, ctx));
    }

    let results: Vec<SubcommandResult> = segments
        .iter()
        .zip(statics)
        .map(|(segment, static_decision)| SubcommandResult {
            command: segment.clone(),
            decision: segment_after_oracle(
                segment,
                static_decision,
                result.subcommand_prefixes.get(segment),
                ctx,
            ),
        })
        .collect();
    Ok(aggregate(command, results))
}

/// First deny rule matching the whole command or any of its segments.
fn deny_sweep(command: &str, segments: &[String], ctx: &PermissionContext) -> Option<Decision> {
    std::iter::once(command)
        .chain(segments.iter().map(String::as_str))
        .find_map(|text| {
            ctx.rules
                .find_any(text)
                .filter(|rule| rule.effect == Effect::Deny)
                .map(|rule| Decision::denied_by(text, rule))
        })
}

/// `A | B`: the result is `decide(A)` when every part of `B` is read-only,
/// otherwise an Ask (or the Deny from `A`).
async fn decide_pipe(
    command: &str,
    pipe: usize,
    ctx: &PermissionContext,
    oracle: &dyn PrefixOracle,
    cancel: &CancellationToken,
    settings: &ValidatorSettings,
    depth: usize,
) -> GateResult<Decision> {
    let left = command[..pipe].trim();
    let right = command[pipe + 1..].trim();
    if left.is_empty() || right.is_empty() {
        return Ok(Decision::ask(
            format!("`{}` has an incomplete pipeline and requires approval.", command),
            DecisionReason::UnsupportedOperator,
        ));
    }

    let left_decision = Box::pin(decide_at(left, ctx, oracle, cancel, settings, depth + 1)).await?;

    let right_parts = split_command(right);
    if right_parts.iter().all(|part| is_read_only(part)) {
        return Ok(left_decision.for_command(command));
    }
    if left_decision.is_deny() {
        return Ok(left_decision);
    }

    debug!("Pipe into non-read-only command: {}", command);
    let mut results = vec![SubcommandResult {
        command: left.to_string(),
        decision: left_decision,
    }];
    results.extend(right_parts.into_iter().map(|part| {
        let decision = if is_read_only(&part) {
            Decision::allow(&part, DecisionReason::SandboxOrReadOnly)
        } else {
            Decision::ask(
                format!("`{}` receives piped input and is not read-only.", part),
                DecisionReason::NoRuleMatched,
            )
        };
        SubcommandResult {
            command: part,
            decision,
        }
    }));

    Ok(Decision::ask(
        format!(
            "Output of `{}` is piped into a command that is not read-only; this requires approval.",
            left
        ),
        DecisionReason::SubcommandResults(results),
    ))
}

/// Deny rules, `cd` guard, allow rules and read-only table for one segment.
/// `None` when none of them decides it.
fn static_decision(segment: &str, ctx: &PermissionContext) -> Option<Decision> {
    let rule = ctx.rules.find_any(segment);
    if let Some(rule) = rule.filter(|r| r.effect == Effect::Deny) {
        return Some(Decision::denied_by(segment, rule));
    }
    if let Some(decision) = check_cd(segment, ctx) {
        return Some(decision);
    }
    if let Some(rule) = rule {
        return Some(Decision::allow(segment, DecisionReason::RuleMatch(rule.clone())));
    }
    is_read_only(segment).then(|| Decision::allow(segment, DecisionReason::SandboxOrReadOnly))
}

fn combine_allowed(command: &str, segments: &[String], statics: Vec<Option<Decision>>) -> Decision {
    let mut decisions: Vec<Decision> = statics.into_iter().flatten().collect();
    if segments.len() == 1 {
        if let Some(decision) = decisions.pop() {
            return decision.for_command(command);
        }
    }
    let results = segments
        .iter()
        .cloned()
        .zip(decisions)
        .map(|(command, decision)| SubcommandResult { command, decision })
        .collect();
    Decision::allow(command, DecisionReason::SubcommandResults(results))
}

/// Query the classifier once, honoring the timeout and cancellation.
///
/// `Ok(None)` means the classifier failed, timed out or had no answer.
async fn query_oracle(
    command: &str,
    ctx: &PermissionContext,
    oracle: &dyn PrefixOracle,
    cancel: &CancellationToken,
    settings: &ValidatorSettings,
) -> GateResult<Option<PrefixQueryResult>> {
    let query = tokio::time::timeout(
        settings.oracle_timeout,
        oracle.query(command, cancel, ctx.non_interactive),
    );

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GateError::Aborted),
        outcome = query => outcome,
    };

    // A result that arrives after cancellation is never acted upon.
    if cancel.is_cancelled() {
        return Err(GateError::Aborted);
    }

    match outcome {
        Ok(Ok(result)) => {
            if result.is_none() {
                warn!("Prefix classifier returned no result for: {}", command);
            }
            Ok(result)
        }
        Ok(Err(GateError::Aborted)) => Err(GateError::Aborted),
        Ok(Err(e)) => {
            warn!("Prefix classifier failed for {}: {}", command, e);
            Ok(None)
        }
        Err(_) => {
            warn!(
                "{} for: {}",
                GateError::OracleTimeout(settings.oracle_timeout),
                command
            );
            Ok(None)
        }
    }
}

/// Classifier prefix for `segment`, if it is usable.
///
/// A prefix the segment does not actually start with is ignored, so a
/// misbehaving classifier cannot steer a command into someone else's rule.
fn usable_prefix<'a>(segment: &str, result: Option<&'a PrefixQueryResult>) -> Option<&'a str> {
    result
        .and_then(|r| r.command_prefix.as_deref())
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty() && segment.trim().starts_with(prefix))
}

/// Decision for one segment once the classifier has answered.
///
/// An Ask with no suggestions means no actionable rule could be proposed.
fn segment_after_oracle(
    segment: &str,
    static_decision: Option<Decision>,
    result: Option<&PrefixQueryResult>,
    ctx: &PermissionContext,
) -> Decision {
    if let Some(decision) = static_decision {
        if decision.is_allow() && !has_dangerous_characters(segment) {
            return decision;
        }
    }

    let Some(prefix) = usable_prefix(segment, result) else {
        return Decision::ask(approval_message(segment), DecisionReason::NoRuleMatched);
    };

    match match_rule(prefix, &ctx.rules, MatchDiscipline::Prefix) {
        Some(rule) if rule.effect == Effect::Deny => Decision::denied_by(segment, rule),
        Some(rule) => Decision::allow(segment, DecisionReason::RuleMatch(rule.clone())),
        None => Decision::ask_with_suggestions(
            approval_message(segment),
            DecisionReason::NoRuleMatched,
            vec![RuleSuggestion::prefix(prefix)],
        ),
    }
}

fn decide_single(
    command: &str,
    static_decision: Option<Decision>,
    result: &PrefixQueryResult,
    ctx: &PermissionContext,
) -> Decision {
    match segment_after_oracle(command, static_decision, Some(result), ctx) {
        Decision::Ask {
            message,
            reason,
            rule_suggestions,
        } if rule_suggestions.is_empty() => {
            let fallback = leading_word(command)
                .map(|word| vec![RuleSuggestion::prefix(&word)])
                .unwrap_or_default();
            Decision::ask_with_suggestions(message, reason, fallback)
        }
        decision => decision.for_command(command),
    }
}

/// Merge per-segment decisions after the classifier has answered.
fn aggregate(command: &str, results: Vec<SubcommandResult>) -> Decision {
    if let Some(denied) = results.iter().find(|r| r.decision.is_deny()) {
        return denied.decision.clone();
    }
    if results.iter().all(|r| r.decision.is_allow()) {
        return Decision::allow(command, DecisionReason::SubcommandResults(results));
    }

    let pending: Vec<&Decision> = results
        .iter()
        .map(|r| &r.decision)
        .filter(|d| !d.is_allow())
        .collect();
    let suggestions = if pending.iter().any(|d| d.rule_suggestions().is_empty()) {
        Vec::new()
    } else {
        let mut unique: Vec<RuleSuggestion> = Vec::new();
        for suggestion in pending.iter().flat_map(|d| d.rule_suggestions()) {
            if !unique.contains(suggestion) {
                unique.push(suggestion.clone());
            }
        }
        unique
    };

    Decision::ask_with_suggestions(
        approval_message(command),
        DecisionReason::SubcommandResults(results),
        suggestions,
    )
}

fn leading_word(command: &str) -> Option<String> {
    match tokenize(command, preserve_variables).into_iter().next() {
        Some(Token::Word(word)) if !word.is_empty() && !has_dangerous_characters(&word) => Some(word),
        _ => None,
    }
}

fn approval_message(command: &str) -> String {
    format!("Running `{}` requires approval.", command)
}
