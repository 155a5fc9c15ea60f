//! Pipeline safety verification.
//!
//! A command is "pipeline-safe" when every operator in it comes from a small,
//! closed allow-list, which lets the validator reason about it segment by
//! segment instead of rejecting it as an unsupported compound command.

use super::tokenizer::{preserve_variables, OperatorKind, Token, Tokenizer};

/// Descriptors that `>&` may target.
const ALLOWED_FILE_DESCRIPTORS: &[&str] = &["0", "1", "2"];

const NULL_DEVICE: &str = "/dev/null";

/// True when every operator and redirect in `command` is on the allow-list.
///
/// Allowed: `&&`, `||`, `|`, globs, `>&` to descriptor 0/1/2, and `>` to
/// the null device or an `&`-prefixed descriptor. Comments, unterminated
/// quotes, sequencing, backgrounding and every other redirect are rejected.
pub fn is_pipeline_safe(command: &str) -> bool {
    let tokenized = Tokenizer::new(command, preserve_variables).run();
    if tokenized.unterminated_quote {
        return false;
    }
    tokens_are_safe(&tokenized.tokens)
}

/// Token-level form of [`is_pipeline_safe`].
pub fn tokens_are_safe(tokens: &[Token]) -> bool {
    for (i, token) in tokens.iter().enumerate() {
        let next_word = match tokens.get(i + 1) {
            Some(Token::Word(w)) => Some(w.trim()),
            _ => None,
        };

        match token {
            Token::Word(_) | Token::Glob(_) => {}
            Token::Comment(_) => return false,
            Token::Operator(kind) => match kind {
                OperatorKind::And | OperatorKind::Or | OperatorKind::Pipe => {}
                OperatorKind::FdDuplicate => {
                    if !next_word.is_some_and(|w| ALLOWED_FILE_DESCRIPTORS.contains(&w)) {
                        return false;
                    }
                }
                OperatorKind::RedirectOut => {
                    if !next_word.is_some_and(|w| w == NULL_DEVICE || w.starts_with('&')) {
                        return false;
                    }
                }
                OperatorKind::Sequence
                | OperatorKind::CaseTerminator
                | OperatorKind::RedirectAppend
                | OperatorKind::Unsupported(_) => return false,
            },
        }
    }
    true
}
