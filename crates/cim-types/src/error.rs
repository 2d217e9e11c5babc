use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by value-model operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown data type code: {0:#06x}")]
    UnknownTypeCode(u16),

    #[error("unknown data type name: {0}")]
    UnknownTypeName(String),

    #[error("value of type {actual} does not match declared type {expected}")]
    TypeMismatch { expected: String, actual: String },

    #[error("invalid object path `{input}`: {reason}")]
    InvalidPath { input: String, reason: String },
}

/// Error kinds reported at the repository boundary.
///
/// Every crate-level error enum maps onto one of these through a `kind()`
/// method, so callers that only care about the category (for example a
/// protocol layer translating to status codes) never match on crate-specific
/// variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidSuperclass,
    ClassHasChildren,
    FormatError,
    InvalidHandle,
    InvalidNamespace,
    NoSuchProperty,
    ReadOnly,
    Io,
}

impl ErrorKind {
    /// Stable upper-case name used in diagnostics and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::InvalidSuperclass => "INVALID_SUPERCLASS",
            Self::ClassHasChildren => "CLASS_HAS_CHILDREN",
            Self::FormatError => "FORMAT_ERROR",
            Self::InvalidHandle => "INVALID_HANDLE",
            Self::InvalidNamespace => "INVALID_NAMESPACE",
            Self::NoSuchProperty => "NO_SUCH_PROPERTY",
            Self::ReadOnly => "READ_ONLY",
            Self::Io => "IO",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
