use crate::edit::EditError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("unterminated quoted string starting at byte {offset}")]
    UnterminatedString { offset: usize },

    #[error("unterminated comment starting at byte {offset}")]
    UnterminatedComment { offset: usize },

    #[error("'{open}' at byte {offset} is never closed")]
    Unclosed { open: char, offset: usize },

    #[error("expected '{expected}' but found '{found}' at byte {offset}")]
    Mismatched {
        expected: char,
        found: char,
        offset: usize,
    },

    #[error("unexpected '{found}' at byte {offset} ({context})")]
    UnexpectedToken {
        found: String,
        offset: usize,
        context: &'static str,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("malformed settings table: {0}")]
    Scan(#[from] ScanError),

    #[error("edit rejected: {0}")]
    Edit(#[from] EditError),

    #[error("'{key}' holds a dictionary value, which cannot be patched")]
    DictionaryValue { key: String },
}
