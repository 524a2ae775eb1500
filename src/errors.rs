use std::io;
use thiserror::Error;

/// An error returned by this crate's object, parsing, serialization, font or form APIs.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed PDF file: {0}")]
    MalformedFile(String),

    #[error("corrupt cross-reference table at offset {offset}: {reason}")]
    CorruptXref { offset: usize, reason: String },

    #[error("unknown stream filter {0:?}")]
    UnknownFilter(String),

    #[error("failed to decode stream with filter {filter:?}: {reason}")]
    FilterDecodeError { filter: String, reason: String },

    #[error("TrueType font is missing a required table {0:?}")]
    MissingRequiredTable(String),

    #[error("font {font:?} cannot encode character {ch:?}")]
    FontCannotEncode { font: String, ch: char },

    #[error("a form field named {0:?} already exists")]
    DuplicateFieldName(String),

    #[error("{value:?} is not a valid option for field {field:?}")]
    InvalidFieldOption { field: String, value: String },

    #[error("field {field:?} expected a {expected} value, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Font(#[from] crate::fonts::FontError),
}

pub type PdfResult<T> = Result<T, PdfError>;
