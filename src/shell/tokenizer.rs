//! Quote-aware tokenizer for untrusted command text.
//!
//! This is not a shell. It performs a single left-to-right scan that tracks
//! quoting and escapes well enough to tell words apart from operators, which
//! is all the permission checks need. Anything it does not understand is
//! surfaced as an [`OperatorKind::Unsupported`] token so callers can refuse it.

use serde::Serialize;

/// Kinds of shell operators the tokenizer distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum OperatorKind {
    /// `;` or an unquoted newline
    Sequence,
    /// `;;`
    CaseTerminator,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `|`
    Pipe,
    /// `>`
    RedirectOut,
    /// `>>`
    RedirectAppend,
    /// `>&`
    FdDuplicate,
    /// Any other operator (`&`, `<`, `<<<`, `<(`, `(`, backtick, ...).
    Unsupported(String),
}

impl OperatorKind {
    fn from_text(op: &str) -> Self {
        match op {
            ";" | "\n" => Self::Sequence,
            ";;" => Self::CaseTerminator,
            "&&" => Self::And,
            "||" => Self::Or,
            "|" => Self::Pipe,
            ">" => Self::RedirectOut,
            ">>" => Self::RedirectAppend,
            ">&" => Self::FdDuplicate,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// True for operators that separate one command from the next.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Sequence | Self::CaseTerminator | Self::And | Self::Or | Self::Pipe
        )
    }
}

/// A single lexical unit of a command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Token {
    Word(String),
    Operator(OperatorKind),
    Comment(String),
    Glob(String),
}

/// Output of a tokenizer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    /// Set when input ended inside a single or double quote.
    pub unterminated_quote: bool,
}

// Longest first so that `>>` wins over `>` and so on.
const OPERATORS: &[&str] = &[
    "&>>", "<<<", "&&", "||", "|&", ";;", ">>", ">&", ">|", "&>", "<<", "<&", "<>", "<(", ">(",
    ";", "|", "&", "<", ">", "(", ")", "`", "\n",
];

/// Positional and special parameters accepted after `$`.
const SPECIAL_PARAMS: &[char] = &[
    '?', '$', '#', '@', '*', '!', '-', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split `command` into tokens, expanding variables through `resolve`.
///
/// `resolve` returns `None` for unknown names; those expand to empty text
/// unless a `${name:-default}` default is present.
pub fn tokenize<F>(command: &str, resolve: F) -> Vec<Token>
where
    F: Fn(&str) -> Option<String>,
{
    Tokenizer::new(command, resolve).run().tokens
}

/// Resolver that leaves every variable reference as written.
///
/// Used by the permission checks, which must reason about the literal text
/// the agent proposed rather than whatever the environment happens to hold.
pub fn preserve_variables(name: &str) -> Option<String> {
    Some(format!("${{{name}}}"))
}

pub struct Tokenizer<F> {
    chars: Vec<char>,
    pos: usize,
    resolve: F,
    word: String,
    // Whether the current word has any content, even an empty quoted string.
    word_started: bool,
    has_glob: bool,
    tokens: Vec<Token>,
}

impl<F> Tokenizer<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(command: &str, resolve: F) -> Self {
        Self {
            chars: command.chars().collect(),
            pos: 0,
            resolve,
            word: String::new(),
            word_started: false,
            has_glob: false,
            tokens: Vec::new(),
        }
    }

    pub fn run(mut self) -> Tokenized {
        let mut quote = Quote::None;

        while let Some(c) = self.peek(0) {
            match quote {
                Quote::Single => {
                    self.pos += 1;
                    if c == '\'' {
                        quote = Quote::None;
                    } else {
                        self.word.push(c);
                    }
                }
                Quote::Double => {
                    self.pos += 1;
                    match c {
                        '"' => quote = Quote::None,
                        '\\' => match self.peek(0) {
                            Some(next @ ('"' | '\\' | '$' | '`')) => {
                                self.word.push(next);
                                self.pos += 1;
                            }
                            Some('\n') => self.pos += 1,
                            _ => self.word.push('\\'),
                        },
                        '$' => self.expand_variable(),
                        _ => self.word.push(c),
                    }
                }
                Quote::None => {
                    if c == '\'' || c == '"' {
                        quote = if c == '\'' { Quote::Single } else { Quote::Double };
                        self.word_started = true;
                        self.pos += 1;
                    } else if c == '\\' {
                        self.pos += 1;
                        match self.peek(0) {
                            // line continuation
                            Some('\n') => self.pos += 1,
                            Some(next) => {
                                self.start_word();
                                self.word.push(next);
                                self.pos += 1;
                            }
                            None => {
                                self.start_word();
                                self.word.push('\\');
                            }
                        }
                    } else if c == '#' && !self.word_started {
                        self.read_comment();
                    } else if let Some(op) = self.match_operator() {
                        self.finish_word();
                        self.pos += op.chars().count();
                        self.tokens.push(Token::Operator(OperatorKind::from_text(op)));
                    } else if c.is_whitespace() {
                        self.finish_word();
                        self.pos += 1;
                    } else if c == '$' {
                        self.pos += 1;
                        self.start_word();
                        self.expand_variable();
                    } else {
                        self.start_word();
                        if c == '*' || c == '?' {
                            self.has_glob = true;
                        }
                        self.word.push(c);
                        self.pos += 1;
                    }
                }
            }
        }

        let unterminated_quote = quote != Quote::None;
        self.finish_word();
        Tokenized {
            tokens: self.tokens,
            unterminated_quote,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn start_word(&mut self) {
        self.word_started = true;
    }

    fn finish_word(&mut self) {
        if !self.word_started {
            return;
        }
        let word = std::mem::take(&mut self.word);
        if self.has_glob {
            self.tokens.push(Token::Glob(word));
        } else {
            self.tokens.push(Token::Word(word));
        }
        self.word_started = false;
        self.has_glob = false;
    }

    fn match_operator(&self) -> Option<&'static str> {
        OPERATORS.iter().copied().find(|op| {
            op.chars()
                .enumerate()
                .all(|(i, expected)| self.peek(i) == Some(expected))
        })
    }

    /// Consume a `#` comment up to (not including) the end of the line.
    fn read_comment(&mut self) {
        self.finish_word();
        self.pos += 1;
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.pos += 1;
        }
        self.tokens.push(Token::Comment(text));
    }

    /// Expand a variable reference. The leading `$` has been consumed.
    fn expand_variable(&mut self) {
        match self.peek(0) {
            Some('{') => {
                let close = self.chars[self.pos..].iter().position(|&c| c == '}');
                let Some(close) = close else {
                    // `${` without a closing brace stays literal.
                    self.word.push('$');
                    return;
                };
                let body: String = self.chars[self.pos + 1..self.pos + close].iter().collect();
                self.pos += close + 1;
                let (name, default) = match body.split_once(":-") {
                    Some((name, default)) => (name, Some(default)),
                    None => (body.as_str(), None),
                };
                let value = (self.resolve)(name)
                    .or_else(|| default.map(str::to_string))
                    .unwrap_or_default();
                self.word.push_str(&value);
            }
            Some(c) if SPECIAL_PARAMS.contains(&c) => {
                self.pos += 1;
                let value = (self.resolve)(&c.to_string()).unwrap_or_default();
                self.word.push_str(&value);
            }
            Some(c) if c == '_' || c.is_ascii_alphabetic() => {
                let start = self.pos;
                while self
                    .peek(0)
                    .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
                {
                    self.pos += 1;
                }
                let name: String = self.chars[start..self.pos].iter().collect();
                let value = (self.resolve)(&name).unwrap_or_default();
                self.word.push_str(&value);
            }
            // Bare `$`, including `$(` which the operator scan handles next.
            _ => self.word.push('$'),
        }
    }
}

/// Byte offset of the first top-level `|` (not `||` or `|&`), respecting
/// quotes and escapes.
pub fn find_top_level_pipe(command: &str) -> Option<usize> {
    let mut quote = Quote::None;
    let mut escaped = false;
    let mut iter = command.char_indices().peekable();

    while let Some((idx, c)) = iter.next() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                }
            }
            Quote::Double => match c {
                '\\' => escaped = true,
                '"' => quote = Quote::None,
                _ => {}
            },
            Quote::None => match c {
                '\\' => escaped = true,
                '\'' => quote = Quote::Single,
                '"' => quote = Quote::Double,
                '|' => {
                    let prev_is_pipe = idx > 0 && command[..idx].ends_with('|');
                    let next = iter.peek().map(|&(_, n)| n);
                    if next == Some('|') {
                        // skip the second half of `||`
                        iter.next();
                    } else if next != Some('&') && !prev_is_pipe {
                        return Some(idx);
                    }
                }
                _ => {}
            },
        }
    }
    None
}
