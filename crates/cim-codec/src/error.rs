use cim_types::{ErrorKind, TypeError};

use crate::layout::RecordKind;

/// Errors from encoding or decoding repository records.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Fewer bytes than a fixed-size structure needs.
    #[error("truncated record: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// The self-described record size disagrees with the buffer.
    #[error("declared record size {declared} is inconsistent with {available} available bytes")]
    SizeMismatch { declared: u32, available: usize },

    /// The record was written with the opposite byte order.
    #[error("record written with foreign byte order (wrong endian)")]
    WrongEndian,

    #[error("unknown record type {0:#06x}")]
    UnknownRecordType(u16),

    #[error("expected {expected:?} record, found {found:?}")]
    UnexpectedRecord { expected: RecordKind, found: RecordKind },

    #[error("version record signature mismatch")]
    BadSignature,

    /// The store was written by a newer object implementation.
    #[error("unsupported object implementation level {found} (this build supports up to {supported})")]
    UnsupportedLevel { found: u16, supported: u16 },

    /// A reference inside the record points outside its bounds or is malformed.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: usize, reason: String },

    #[error("encoded record would exceed 4 GiB ({0} bytes)")]
    TooLarge(usize),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl CodecError {
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    /// Every codec failure surfaces as a format error at the boundary.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::FormatError
    }
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
