use std::path::PathBuf;

use thiserror::Error;

/// Offsets are absolute byte positions in the file, except inside the
/// inner message where they are relative to the envelope payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("truncated input at byte {offset}")]
    Truncated { offset: usize },

    #[error("indefinite length at byte {offset} is not supported")]
    IndefiniteLength { offset: usize },

    #[error("length field too large at byte {offset}")]
    LengthOverflow { offset: usize },

    #[error("tag number too large at byte {offset}")]
    TagOverflow { offset: usize },

    #[error("expected {expected} at byte {offset}")]
    Unexpected {
        expected: &'static str,
        offset: usize,
    },

    #[error("invalid {len}-byte integer at byte {offset}")]
    BadInteger { offset: usize, len: usize },

    #[error("value {value} out of range at byte {offset}")]
    OutOfRange { offset: usize, value: i64 },

    #[error("invalid text at byte {offset}")]
    InvalidText { offset: usize },

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
