//! Byte layout shared by every record type.
//!
//! All integers are little-endian. Every cross reference inside a record is
//! a `u32` offset from the first byte of the record, so a record can be copied
//! to any address (or written to disk and read back) without fix-ups.
//!
//! ```text
//! record header (8 bytes)
//! [4 bytes: size of the whole record, header included]
//! [2 bytes: record type (1 = version, 2 = class, 3 = instance)]
//! [2 bytes: flags (reserved, written as 0)]
//!
//! class record
//! [8  header]
//! [4  name string id]             [4  superclass string id (0 = none)]
//! [4  class flags]                [8  class qualifiers (first index, count)]
//! [8  qualifier table (offset, count)]
//! [8  property table (offset, count)]
//! [8  method table (offset, count)]
//! [8  parameter table (offset, count)]
//! [8  array element table (offset, count)]
//! [8  string pool (offset, byte length)]
//! [tables and pool follow, in that order]
//!
//! instance record
//! [8  header]
//! [4  namespace string id]        [4  class name string id]
//! [4  flags (reserved)]
//! [8  property table (offset, count)]
//! [8  array element table (offset, count)]
//! [8  string pool (offset, byte length)]
//! ```
//!
//! String ids are one-based byte offsets into the record's string pool; 0
//! means absent. Pool entries are NUL-terminated UTF-8.

use crate::error::{CodecError, CodecResult};

pub const HEADER_LEN: usize = 8;

pub const CLASS_FIXED_LEN: usize = 76;
pub const INSTANCE_FIXED_LEN: usize = 44;

pub const QUALIFIER_ENTRY_LEN: usize = 24;
pub const PROPERTY_ENTRY_LEN: usize = 40;
pub const METHOD_ENTRY_LEN: usize = 32;
pub const PARAMETER_ENTRY_LEN: usize = 20;
pub const VALUE_ENTRY_LEN: usize = 16;

/// Class flag bits cached from the class qualifiers.
pub const CLASS_ABSTRACT: u32 = 0x01;
pub const CLASS_ASSOCIATION: u32 = 0x02;
pub const CLASS_INDICATION: u32 = 0x04;

/// Property flag bits cached from the property qualifiers.
pub const PROP_KEY: u32 = 0x01;
pub const PROP_EMBEDDED_OBJECT: u32 = 0x02;
pub const PROP_EMBEDDED_INSTANCE: u32 = 0x04;
pub const PROP_PROPAGATED: u32 = 0x08;

pub const METHOD_PROPAGATED: u32 = 0x01;

/// Record types carried in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Version,
    Class,
    Instance,
}

impl RecordKind {
    pub fn code(&self) -> u16 {
        match self {
            Self::Version => 1,
            Self::Class => 2,
            Self::Instance => 3,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Version),
            2 => Some(Self::Class),
            3 => Some(Self::Instance),
            _ => None,
        }
    }
}

/// The fixed 8-byte prefix of every record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub size: u32,
    pub kind: RecordKind,
    pub flags: u16,
}

impl RecordHeader {
    /// Parse the header at the start of `bytes`.
    ///
    /// A type code that is only valid after swapping its bytes means the
    /// record came from a machine with the other byte order.
    pub fn peek(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }
        let size = read_u32(bytes, 0).unwrap_or(0);
        let code = read_u16(bytes, 4).unwrap_or(0);
        let flags = read_u16(bytes, 6).unwrap_or(0);

        let kind = match RecordKind::from_code(code) {
            Some(kind) => kind,
            None if RecordKind::from_code(code.swap_bytes()).is_some() => {
                return Err(CodecError::WrongEndian)
            }
            None => return Err(CodecError::UnknownRecordType(code)),
        };
        if (size as usize) < HEADER_LEN {
            return Err(CodecError::SizeMismatch {
                declared: size,
                available: bytes.len(),
            });
        }
        Ok(Self { size, kind, flags })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..6].copy_from_slice(&self.kind.code().to_le_bytes());
        out[6..8].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    /// Check that `bytes` holds at least the declared size and has the
    /// expected type; returns the declared size.
    pub fn expect(bytes: &[u8], kind: RecordKind, fixed_len: usize) -> CodecResult<usize> {
        let header = Self::peek(bytes)?;
        if header.kind != kind {
            return Err(CodecError::UnexpectedRecord {
                expected: kind,
                found: header.kind,
            });
        }
        let size = header.size as usize;
        if size > bytes.len() || size < fixed_len {
            return Err(CodecError::SizeMismatch {
                declared: header.size,
                available: bytes.len(),
            });
        }
        Ok(size)
    }
}

/// Location of a table inside a record: byte offset and entry count (byte
/// length for the string pool).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableRef {
    pub offset: u32,
    pub count: u32,
}

impl TableRef {
    pub fn read(bytes: &[u8], at: usize) -> Self {
        Self {
            offset: read_u32(bytes, at).unwrap_or(0),
            count: read_u32(bytes, at + 4).unwrap_or(0),
        }
    }

    pub fn write(&self, out: &mut [u8], at: usize) {
        write_u32(out, at, self.offset);
        write_u32(out, at + 4, self.count);
    }

    /// Byte offset of entry `index`.
    pub fn entry(&self, index: usize, entry_len: usize) -> usize {
        self.offset as usize + index * entry_len
    }

    /// Verify the table lies within `[fixed_len, size)`.
    pub fn check(&self, entry_len: usize, fixed_len: usize, size: usize, what: &str) -> CodecResult<()> {
        let start = self.offset as usize;
        let len = (self.count as usize)
            .checked_mul(entry_len)
            .ok_or_else(|| CodecError::corrupt(start, format!("{what} table length overflows")))?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| CodecError::corrupt(start, format!("{what} table end overflows")))?;
        if len > 0 && (start < fixed_len || end > size) {
            return Err(CodecError::corrupt(
                start,
                format!("{what} table [{start}, {end}) outside record of {size} bytes"),
            ));
        }
        Ok(())
    }
}

pub fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw = bytes.get(at..at.checked_add(2)?)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

pub fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

pub fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let raw = bytes.get(at..at.checked_add(8)?)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Some(u64::from_le_bytes(buf))
}

pub fn write_u32(out: &mut [u8], at: usize, value: u32) {
    if let Some(slot) = out.get_mut(at..at + 4) {
        slot.copy_from_slice(&value.to_le_bytes());
    }
}

/// Resolve a string id against a pool located at `pool`.
pub fn read_str(bytes: &[u8], pool: TableRef, id: u32) -> Option<&str> {
    if id == 0 || id > pool.count {
        return None;
    }
    let start = pool.offset as usize + id as usize - 1;
    let end = pool.offset as usize + pool.count as usize;
    let region = bytes.get(start..end)?;
    let nul = region.iter().position(|b| *b == 0)?;
    std::str::from_utf8(&region[..nul]).ok()
}

/// Like [`read_str`] but reports why the id is unusable.
pub fn check_str(bytes: &[u8], pool: TableRef, id: u32, at: usize) -> CodecResult<Option<&str>> {
    if id == 0 {
        return Ok(None);
    }
    read_str(bytes, pool, id)
        .map(Some)
        .ok_or_else(|| CodecError::corrupt(at, format!("bad string id {id}")))
}
