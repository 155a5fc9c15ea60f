//! Working-directory guard for `cd` sub-commands.

use std::path::PathBuf;

use crate::context::PermissionContext;
use crate::shell::{preserve_variables, tokenize, Token};

use super::decision::{Decision, DecisionReason};

/// Where a `cd` sub-command would go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdTarget {
    /// Bare `cd`, which goes to `$HOME`.
    Home,
    Path(PathBuf),
    /// Depends on runtime state (`cd -`, `cd $X`, globs, `~user`).
    Unresolvable(String),
}

/// Parse `segment` as a `cd` invocation. `None` when it is not one.
pub fn cd_target(segment: &str, ctx: &PermissionContext) -> Option<CdTarget> {
    let tokens = tokenize(segment, preserve_variables);
    let mut iter = tokens.iter();
    match iter.next() {
        Some(Token::Word(w)) if w == "cd" => {}
        _ => return None,
    }

    let mut past_options = false;
    for token in iter {
        match token {
            Token::Word(w) if !past_options && w == "--" => past_options = true,
            Token::Word(w) if !past_options && matches!(w.as_str(), "-L" | "-P" | "-e" | "-@") => {}
            Token::Word(w) => return Some(resolve_target(w, ctx)),
            Token::Glob(pattern) => return Some(CdTarget::Unresolvable(pattern.clone())),
            Token::Operator(_) | Token::Comment(_) => break,
        }
    }
    Some(CdTarget::Home)
}

fn resolve_target(raw: &str, ctx: &PermissionContext) -> CdTarget {
    if raw == "-" || raw.contains(['$', '`', '{', '}']) {
        return CdTarget::Unresolvable(raw.to_string());
    }
    if raw == "~" || raw.starts_with("~/") {
        return match &ctx.home {
            Some(home) => {
                let rest = raw.trim_start_matches('~').trim_start_matches('/');
                CdTarget::Path(ctx.cwd.resolve(&home.join(rest).to_string_lossy()))
            }
            None => CdTarget::Unresolvable(raw.to_string()),
        };
    }
    if raw.starts_with('~') {
        return CdTarget::Unresolvable(raw.to_string());
    }
    CdTarget::Path(ctx.cwd.resolve(raw))
}

/// True for `cd` segments that change nothing, e.g. `cd .` or `cd <cwd>`.
pub fn is_noop_cd(segment: &str, ctx: &PermissionContext) -> bool {
    matches!(cd_target(segment, ctx), Some(CdTarget::Path(p)) if p == ctx.cwd.path)
}

/// Number of segments that are `cd` commands other than no-ops.
pub fn count_effective_cd(segments: &[String], ctx: &PermissionContext) -> usize {
    segments
        .iter()
        .filter(|s| cd_target(s, ctx).is_some() && !is_noop_cd(s, ctx))
        .count()
}

/// Check a `cd` segment with arguments against the allowed directories.
///
/// Returns `None` when `segment` is not a `cd` with a target, leaving the
/// decision to the other checks.
pub fn check_cd(segment: &str, ctx: &PermissionContext) -> Option<Decision> {
    let blocked = |path: String| {
        let message = format!(
            "cd to '{}' was blocked. For security, only directories inside the allowed \
             working directories for this session (including '{}') may be entered.",
            path,
            ctx.primary_directory().display()
        );
        Decision::ask(message, DecisionReason::WorkingDirectoryBlocked { path })
    };

    match cd_target(segment, ctx)? {
        CdTarget::Home => None,
        CdTarget::Unresolvable(raw) => Some(blocked(raw)),
        CdTarget::Path(path) => {
            if ctx.is_in_allowed_directory(&path) {
                Some(Decision::allow(segment, DecisionReason::SandboxOrReadOnly))
            } else {
                Some(blocked(path.display().to_string()))
            }
        }
    }
}
