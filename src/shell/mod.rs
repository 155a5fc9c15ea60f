//! Shell command text analysis.
//!
//! Nothing in here executes anything. These are the lexical building blocks
//! the permission engine uses to take apart a proposed command line:
//! a quote-aware tokenizer, a coarse separator splitter, and the pipeline
//! safety verifier built on the tokenizer.

mod splitter;
mod tokenizer;
mod verifier;

pub use splitter::split_command;
pub use tokenizer::{
    find_top_level_pipe, preserve_variables, tokenize, OperatorKind, Token, Tokenized, Tokenizer,
};
pub use verifier::{is_pipeline_safe, tokens_are_safe};
