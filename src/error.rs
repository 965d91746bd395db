//! Errors raised while turning input text into site metadata and requests.
//!
//! These never reach the admission controller: a stream that fails to parse
//! halts the run before (or instead of) any decision being made.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("input has no site metadata line")]
    MissingMetadata,

    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("{field}: expected a whole number, found {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("malformed timestamp {0:?} (expected YYYY-MM-DD HH:MM:SS)")]
    MalformedTimestamp(String),

    #[error("order {0} has no item codes")]
    NoItems(String),

    #[error("item code {code:?} contains unknown ingredient {letter:?}")]
    UnknownIngredient { code: String, letter: char },

    #[error("request for site {found} in a stream for site {expected}")]
    SiteMismatch { expected: String, found: String },

    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    pub fn at_line(self, line: usize) -> ParseError {
        ParseError::AtLine {
            line,
            source: Box::new(self),
        }
    }

    /// Short stable label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            ParseError::MissingMetadata => "missing_metadata",
            ParseError::FieldCount { .. } => "field_count",
            ParseError::MissingField(_) => "missing_field",
            ParseError::InvalidNumber { .. } => "invalid_number",
            ParseError::MalformedTimestamp(_) => "malformed_timestamp",
            ParseError::NoItems(_) => "no_items",
            ParseError::UnknownIngredient { .. } => "unknown_ingredient",
            ParseError::SiteMismatch { .. } => "site_mismatch",
            ParseError::AtLine { source, .. } => source.as_label(),
        }
    }
}
