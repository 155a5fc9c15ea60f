//! Exit code interpretation for completed commands.
//!
//! Several tools use exit code 1 for an ordinary negative answer ("no
//! match", "files differ") rather than a failure. Those are looked up by the
//! leading word of the command's final pipeline stage, which is the process
//! whose status the shell reports.

use std::path::Path;

use serde::Serialize;

use crate::shell::{preserve_variables, tokenize, Token};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInterpretation {
    pub is_error: bool,
    /// Informational text for a non-error, non-zero exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExitInterpretation {
    fn success() -> Self {
        Self {
            is_error: false,
            message: None,
        }
    }

    fn failure() -> Self {
        Self {
            is_error: true,
            message: None,
        }
    }

    fn informational(message: &str) -> Self {
        Self {
            is_error: false,
            message: Some(message.to_string()),
        }
    }
}

/// Commands whose exit code 1 is a normal negative result.
const SEMANTIC_EXIT_CODES: &[(&str, &str)] = &[
    ("grep", "No matches found"),
    ("egrep", "No matches found"),
    ("fgrep", "No matches found"),
    ("rg", "No matches found"),
    ("diff", "Files differ"),
    ("cmp", "Files differ"),
    ("test", "Condition is false"),
    ("[", "Condition is false"),
    ("find", "Some directories were inaccessible"),
];

/// Interpret `exit_code` for `command`.
///
/// Default policy: error iff the code is non-zero. For the tools in the
/// override table, code 1 carries an informational message and only codes
/// of 2 and above are errors.
pub fn interpret(command: &str, exit_code: i32) -> ExitInterpretation {
    if exit_code == 0 {
        return ExitInterpretation::success();
    }

    let semantic = final_stage_command(command).and_then(|name| {
        SEMANTIC_EXIT_CODES
            .iter()
            .find(|(tool, _)| *tool == name)
            .map(|(_, message)| *message)
    });

    match semantic {
        Some(message) if exit_code == 1 => ExitInterpretation::informational(message),
        _ => ExitInterpretation::failure(),
    }
}

/// Leading command word of the last pipeline stage, without its directory.
///
/// Leading `NAME=value` assignments are skipped.
pub fn final_stage_command(command: &str) -> Option<String> {
    let tokens = tokenize(command, preserve_variables);
    let stage_start = tokens
        .iter()
        .rposition(|t| matches!(t, Token::Operator(op) if op.is_control()))
        .map_or(0, |i| i + 1);

    tokens[stage_start..]
        .iter()
        .map_while(|t| match t {
            Token::Word(w) | Token::Glob(w) => Some(w.as_str()),
            _ => None,
        })
        .find(|w| !is_assignment(w))
        .map(|w| {
            Path::new(w)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| w.to_string())
        })
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            let mut chars = name.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}
