use crate::error::{CodecError, CodecResult};
use crate::layout::{read_u16, RecordHeader, RecordKind, HEADER_LEN};

/// Length of an encoded version record.
pub const VERSION_RECORD_LEN: usize = 24;

/// Signature identifying a class store written by this repository.
pub const SIGNATURE: [u8; 8] = *b"CIMREPO\0";

/// Store format version written by this build.
pub const FORMAT_VERSION: u16 = 2;

/// Highest object implementation level this build can decode.
pub const SUPPORTED_OBJ_IMPL_LEVEL: u16 = 1;

/// Leading record of a versioned class store.
///
/// ```text
/// [8 bytes: record header, type = 1, size = 24]
/// [8 bytes: signature "CIMREPO\0"]
/// [2 bytes: format version]      [2 bytes: level]
/// [2 bytes: object impl level]   [2 bytes: options]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct VersionRecord {
    pub version: u16,
    pub level: u16,
    pub obj_impl_level: u16,
    pub options: u16,
}

impl VersionRecord {
    /// The record this build writes at the start of new stores.
    pub fn current() -> Self {
        Self {
            version: FORMAT_VERSION,
            level: 0,
            obj_impl_level: SUPPORTED_OBJ_IMPL_LEVEL,
            options: 0,
        }
    }

    pub fn encode(&self) -> [u8; VERSION_RECORD_LEN] {
        let mut out = [0u8; VERSION_RECORD_LEN];
        let header = RecordHeader {
            size: VERSION_RECORD_LEN as u32,
            kind: RecordKind::Version,
            flags: 0,
        };
        out[..HEADER_LEN].copy_from_slice(&header.to_bytes());
        out[8..16].copy_from_slice(&SIGNATURE);
        out[16..18].copy_from_slice(&self.version.to_le_bytes());
        out[18..20].copy_from_slice(&self.level.to_le_bytes());
        out[20..22].copy_from_slice(&self.obj_impl_level.to_le_bytes());
        out[22..24].copy_from_slice(&self.options.to_le_bytes());
        out
    }

    /// Decode and validate a version record.
    ///
    /// A record whose size field only matches after a byte swap is reported
    /// as [`CodecError::WrongEndian`].
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let header = RecordHeader::peek(bytes)?;
        if header.kind != RecordKind::Version {
            return Err(CodecError::UnexpectedRecord {
                expected: RecordKind::Version,
                found: header.kind,
            });
        }
        if header.size as usize != VERSION_RECORD_LEN {
            if header.size == (VERSION_RECORD_LEN as u32).swap_bytes() {
                return Err(CodecError::WrongEndian);
            }
            return Err(CodecError::SizeMismatch {
                declared: header.size,
                available: bytes.len(),
            });
        }
        if bytes.len() < VERSION_RECORD_LEN {
            return Err(CodecError::Truncated {
                needed: VERSION_RECORD_LEN,
                available: bytes.len(),
            });
        }
        if bytes[8..16] != SIGNATURE {
            return Err(CodecError::BadSignature);
        }
        let record = Self {
            version: read_u16(bytes, 16).unwrap_or(0),
            level: read_u16(bytes, 18).unwrap_or(0),
            obj_impl_level: read_u16(bytes, 20).unwrap_or(0),
            options: read_u16(bytes, 22).unwrap_or(0),
        };
        if record.obj_impl_level > SUPPORTED_OBJ_IMPL_LEVEL {
            return Err(CodecError::UnsupportedLevel {
                found: record.obj_impl_level,
                supported: SUPPORTED_OBJ_IMPL_LEVEL,
            });
        }
        Ok(record)
    }
}
