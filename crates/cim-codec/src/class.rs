use std::fmt;

use tracing::trace;

use crate::descriptor::ClassDescriptor;
use crate::encode::encode_class;
use crate::error::{CodecError, CodecResult};
use crate::layout::*;
use crate::value::decode_value;

/// Section table of a class record, read from its fixed part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ClassLayout {
    pub name: u32,
    pub parent: u32,
    pub flags: u32,
    pub class_quals: TableRef,
    pub qualifiers: TableRef,
    pub properties: TableRef,
    pub methods: TableRef,
    pub parameters: TableRef,
    pub arrays: TableRef,
    pub strings: TableRef,
}

impl ClassLayout {
    /// Read the fixed part and bounds-check every table against the record size.
    fn read(bytes: &[u8]) -> CodecResult<(Self, usize)> {
        let size = RecordHeader::expect(bytes, RecordKind::Class, CLASS_FIXED_LEN)?;
        let layout = Self {
            name: read_u32(bytes, 8).unwrap_or(0),
            parent: read_u32(bytes, 12).unwrap_or(0),
            flags: read_u32(bytes, 16).unwrap_or(0),
            class_quals: TableRef::read(bytes, 20),
            qualifiers: TableRef::read(bytes, 28),
            properties: TableRef::read(bytes, 36),
            methods: TableRef::read(bytes, 44),
            parameters: TableRef::read(bytes, 52),
            arrays: TableRef::read(bytes, 60),
            strings: TableRef::read(bytes, 68),
        };
        layout.qualifiers.check(QUALIFIER_ENTRY_LEN, CLASS_FIXED_LEN, size, "qualifier")?;
        layout.properties.check(PROPERTY_ENTRY_LEN, CLASS_FIXED_LEN, size, "property")?;
        layout.methods.check(METHOD_ENTRY_LEN, CLASS_FIXED_LEN, size, "method")?;
        layout.parameters.check(PARAMETER_ENTRY_LEN, CLASS_FIXED_LEN, size, "parameter")?;
        layout.arrays.check(VALUE_ENTRY_LEN, CLASS_FIXED_LEN, size, "array")?;
        layout.strings.check(1, CLASS_FIXED_LEN, size, "string")?;
        check_range(layout.class_quals, layout.qualifiers.count, 20, "class qualifier")?;
        Ok((layout, size))
    }
}

/// Verify a (first index, count) range lies within a table of `len` entries.
pub(crate) fn check_range(range: TableRef, len: u32, at: usize, what: &str) -> CodecResult<()> {
    let end = range.offset.checked_add(range.count);
    if end.map_or(true, |end| end > len) {
        return Err(CodecError::corrupt(
            at,
            format!("{what} range {}+{} exceeds table of {len}", range.offset, range.count),
        ));
    }
    Ok(())
}

/// An immutable, decoded class record.
///
/// The record bytes are owned by the view; every accessor reads directly from
/// them. Views are shared between threads through `Arc` and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct ConstClass {
    pub(crate) bytes: Vec<u8>,
    pub(crate) layout: ClassLayout,
}

impl ConstClass {
    /// Decode and fully validate a class record.
    ///
    /// Trailing bytes beyond the declared record size are discarded.
    pub fn decode(mut bytes: Vec<u8>) -> CodecResult<Self> {
        let (layout, size) = ClassLayout::read(&bytes)?;
        bytes.truncate(size);
        let class = Self { bytes, layout };
        class.validate()?;
        trace!(class = class.name(), size, "decoded class record");
        Ok(class)
    }

    pub fn from_slice(bytes: &[u8]) -> CodecResult<Self> {
        let size = RecordHeader::expect(bytes, RecordKind::Class, CLASS_FIXED_LEN)?;
        Self::decode(bytes[..size].to_vec())
    }

    /// Re-establish a view over bytes that were produced by [`encode_class`]
    /// and moved to a new owner.
    ///
    /// Only the header and section table are checked; the per-entry
    /// validation walk of [`ConstClass::decode`] is skipped.
    pub fn relocate(mut bytes: Vec<u8>) -> CodecResult<Self> {
        let (layout, size) = ClassLayout::read(&bytes)?;
        bytes.truncate(size);
        Ok(Self { bytes, layout })
    }

    pub fn from_descriptor(class: &ClassDescriptor) -> CodecResult<Self> {
        Self::relocate(encode_class(class)?)
    }

    /// A freshly laid-out copy of this class.
    pub fn rebuild(&self) -> CodecResult<Self> {
        Self::from_descriptor(&self.to_descriptor())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size of the record when written to a store or message.
    pub fn serialized_size(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn str_at(&self, id: u32) -> Option<&str> {
        read_str(&self.bytes, self.layout.strings, id)
    }

    fn validate(&self) -> CodecResult<()> {
        let bytes = &self.bytes;
        let l = &self.layout;
        let strings = l.strings;

        if l.strings.count > 0 && bytes.get((l.strings.offset + l.strings.count - 1) as usize) != Some(&0) {
            return Err(CodecError::corrupt(l.strings.offset as usize, "string pool is not NUL-terminated"));
        }
        match check_str(bytes, strings, l.name, 8)? {
            Some(name) if !name.is_empty() => {}
            _ => return Err(CodecError::corrupt(8, "class record without a name")),
        }
        check_str(bytes, strings, l.parent, 12)?;

        for i in 0..l.qualifiers.count as usize {
            let at = l.qualifiers.entry(i, QUALIFIER_ENTRY_LEN);
            check_str(bytes, strings, read_u32(bytes, at).unwrap_or(0), at)?
                .ok_or_else(|| CodecError::corrupt(at, "qualifier without a name"))?;
            decode_value(bytes, strings, l.arrays, at + 8)?;
        }

        for i in 0..l.properties.count as usize {
            let at = l.properties.entry(i, PROPERTY_ENTRY_LEN);
            check_str(bytes, strings, read_u32(bytes, at).unwrap_or(0), at)?
                .ok_or_else(|| CodecError::corrupt(at, "property without a name"))?;
            decode_value(bytes, strings, l.arrays, at + 8)?;
            check_str(bytes, strings, read_u32(bytes, at + 24).unwrap_or(0), at + 24)?;
            check_str(bytes, strings, read_u32(bytes, at + 28).unwrap_or(0), at + 28)?;
            check_range(TableRef::read(bytes, at + 32), l.qualifiers.count, at + 32, "property qualifier")?;
        }

        for i in 0..l.methods.count as usize {
            let at = l.methods.entry(i, METHOD_ENTRY_LEN);
            check_str(bytes, strings, read_u32(bytes, at).unwrap_or(0), at)?
                .ok_or_else(|| CodecError::corrupt(at, "method without a name"))?;
            check_type_code(bytes, at + 8)?;
            check_str(bytes, strings, read_u32(bytes, at + 12).unwrap_or(0), at + 12)?;
            check_range(TableRef::read(bytes, at + 16), l.qualifiers.count, at + 16, "method qualifier")?;
            check_range(TableRef::read(bytes, at + 24), l.parameters.count, at + 24, "parameter")?;
        }

        for i in 0..l.parameters.count as usize {
            let at = l.parameters.entry(i, PARAMETER_ENTRY_LEN);
            check_str(bytes, strings, read_u32(bytes, at).unwrap_or(0), at)?
                .ok_or_else(|| CodecError::corrupt(at, "parameter without a name"))?;
            check_type_code(bytes, at + 4)?;
            check_str(bytes, strings, read_u32(bytes, at + 8).unwrap_or(0), at + 8)?;
            check_range(TableRef::read(bytes, at + 12), l.qualifiers.count, at + 12, "parameter qualifier")?;
        }
        Ok(())
    }
}

fn check_type_code(bytes: &[u8], at: usize) -> CodecResult<()> {
    let code = read_u32(bytes, at).unwrap_or(0);
    u16::try_from(code)
        .ok()
        .and_then(|c| cim_types::DataType::from_code(c).ok())
        .map(|_| ())
        .ok_or_else(|| CodecError::corrupt(at, format!("bad type code {code:#x}")))
}

impl fmt::Debug for ConstClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstClass")
            .field("name", &self.name())
            .field("superclass", &self.superclass())
            .field("properties", &self.property_count())
            .field("size", &self.bytes.len())
            .finish()
    }
}
