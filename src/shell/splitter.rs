//! Coarse, quote-unaware splitting of a command line into sub-commands.
//!
//! Line breaks separate commands just like `;`. Splitting a quoted separator
//! (`echo "a;b"`) produces extra segments, which can only make the checks
//! built on top of this stricter.

use std::sync::LazyLock;

use regex::Regex;

static SEPARATOR_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[;&|]{1,2}|[\r\n]+").ok());

/// Split `command` on runs of one or two characters drawn from `;`, `&`, `|`,
/// and on line breaks.
///
/// Returned segments are trimmed and never empty.
pub fn split_command(command: &str) -> Vec<String> {
    let pieces: Vec<&str> = match SEPARATOR_RUN.as_ref() {
        Some(re) => re.split(command).collect(),
        None => command
            .split(|c| matches!(c, ';' | '&' | '|' | '\n' | '\r'))
            .collect(),
    };

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
