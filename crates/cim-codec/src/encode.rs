//! Serialization of owned descriptors into relocatable records.

use cim_types::{CimValue, Qualifier, ValueState};

use crate::descriptor::{ClassDescriptor, InstanceDescriptor, MethodDecl, ParameterDecl, PropertyDecl};
use crate::error::{CodecError, CodecResult};
use crate::layout::*;
use crate::pool::{Section, StringPool};
use crate::value::encode_value;

/// Builds the tables of one class record before they are laid out.
#[derive(Default)]
struct ClassEncoder {
    strings: StringPool,
    qualifiers: Section,
    properties: Section,
    methods: Section,
    parameters: Section,
    arrays: Section,
}

impl ClassEncoder {
    /// Append a qualifier list; returns (first index, count).
    fn qualifiers(&mut self, list: &[Qualifier]) -> CodecResult<(u32, u32)> {
        let start = (self.qualifiers.used() / QUALIFIER_ENTRY_LEN) as u32;
        for q in list {
            let mut e = [0u8; QUALIFIER_ENTRY_LEN];
            write_u32(&mut e, 0, self.strings.add(&q.name));
            write_u32(&mut e, 4, q.flavor.bits());
            let value = encode_value(
                &mut self.strings,
                &mut self.arrays,
                q.data_type,
                q.value.as_ref(),
                ValueState::default(),
            )?;
            e[8..24].copy_from_slice(&value);
            self.qualifiers.push(&e);
        }
        Ok((start, list.len() as u32))
    }

    fn property(&mut self, p: &PropertyDecl) -> CodecResult<()> {
        let name = self.strings.add(&p.name);
        let value = encode_value(
            &mut self.strings,
            &mut self.arrays,
            p.data_type,
            p.value.as_ref(),
            ValueState::default(),
        )?;
        let ref_class = self.strings.add_opt(p.reference_class.as_deref());
        let origin = self.strings.add_opt(p.class_origin.as_deref());
        let (qual_start, qual_count) = self.qualifiers(&p.qualifiers)?;

        let mut e = [0u8; PROPERTY_ENTRY_LEN];
        write_u32(&mut e, 0, name);
        write_u32(&mut e, 4, property_flags(p));
        e[8..24].copy_from_slice(&value);
        write_u32(&mut e, 24, ref_class);
        write_u32(&mut e, 28, origin);
        write_u32(&mut e, 32, qual_start);
        write_u32(&mut e, 36, qual_count);
        self.properties.push(&e);
        Ok(())
    }

    fn method(&mut self, m: &MethodDecl) -> CodecResult<()> {
        let name = self.strings.add(&m.name);
        let origin = self.strings.add_opt(m.class_origin.as_deref());
        let (qual_start, qual_count) = self.qualifiers(&m.qualifiers)?;
        let param_start = (self.parameters.used() / PARAMETER_ENTRY_LEN) as u32;
        for param in &m.parameters {
            self.parameter(param)?;
        }

        let mut e = [0u8; METHOD_ENTRY_LEN];
        write_u32(&mut e, 0, name);
        write_u32(&mut e, 4, if m.propagated { METHOD_PROPAGATED } else { 0 });
        write_u32(&mut e, 8, u32::from(m.return_type.code()));
        write_u32(&mut e, 12, origin);
        write_u32(&mut e, 16, qual_start);
        write_u32(&mut e, 20, qual_count);
        write_u32(&mut e, 24, param_start);
        write_u32(&mut e, 28, m.parameters.len() as u32);
        self.methods.push(&e);
        Ok(())
    }

    fn parameter(&mut self, p: &ParameterDecl) -> CodecResult<()> {
        let name = self.strings.add(&p.name);
        let ref_class = self.strings.add_opt(p.reference_class.as_deref());
        let (qual_start, qual_count) = self.qualifiers(&p.qualifiers)?;

        let mut e = [0u8; PARAMETER_ENTRY_LEN];
        write_u32(&mut e, 0, name);
        write_u32(&mut e, 4, u32::from(p.data_type.code()));
        write_u32(&mut e, 8, ref_class);
        write_u32(&mut e, 12, qual_start);
        write_u32(&mut e, 16, qual_count);
        self.parameters.push(&e);
        Ok(())
    }
}

fn class_flags(class: &ClassDescriptor) -> u32 {
    let mut flags = 0;
    if class.has_flag("Abstract") {
        flags |= CLASS_ABSTRACT;
    }
    if class.has_flag("Association") {
        flags |= CLASS_ASSOCIATION;
    }
    if class.has_flag("Indication") {
        flags |= CLASS_INDICATION;
    }
    flags
}

fn property_flags(p: &PropertyDecl) -> u32 {
    let mut flags = 0;
    for q in &p.qualifiers {
        if q.is_true("Key") {
            flags |= PROP_KEY;
        }
        if q.is_true("EmbeddedObject") {
            flags |= PROP_EMBEDDED_OBJECT;
        }
        if q.name.eq_ignore_ascii_case("EmbeddedInstance") && matches!(q.value, Some(CimValue::String(_))) {
            flags |= PROP_EMBEDDED_INSTANCE;
        }
    }
    if p.propagated {
        flags |= PROP_PROPAGATED;
    }
    flags
}

/// Lay out `tables` after a fixed part of `fixed_len` bytes and return the
/// table references in order.
fn layout_tables(fixed_len: usize, tables: &[(&[u8], usize)]) -> CodecResult<(Vec<TableRef>, usize)> {
    let mut offset = fixed_len;
    let mut refs = Vec::with_capacity(tables.len());
    for (bytes, entry_len) in tables {
        let count = if *entry_len == 0 { bytes.len() } else { bytes.len() / entry_len };
        refs.push(TableRef {
            offset: if bytes.is_empty() { 0 } else { offset as u32 },
            count: count as u32,
        });
        offset += bytes.len();
    }
    if offset > u32::MAX as usize {
        return Err(CodecError::TooLarge(offset));
    }
    Ok((refs, offset))
}

/// Encode a class descriptor.
///
/// The output is a pure function of the descriptor: strings are never
/// deduplicated and tables are written in declaration order, so decoding and
/// re-encoding reproduces the same bytes.
pub fn encode_class(class: &ClassDescriptor) -> CodecResult<Vec<u8>> {
    let mut enc = ClassEncoder::default();
    let name = enc.strings.add(&class.name);
    let parent = enc.strings.add_opt(class.superclass.as_deref());
    let (class_qual_start, class_qual_count) = enc.qualifiers(&class.qualifiers)?;
    for p in &class.properties {
        enc.property(p)?;
    }
    for m in &class.methods {
        enc.method(m)?;
    }

    let tables: [(&[u8], usize); 6] = [
        (enc.qualifiers.as_bytes(), QUALIFIER_ENTRY_LEN),
        (enc.properties.as_bytes(), PROPERTY_ENTRY_LEN),
        (enc.methods.as_bytes(), METHOD_ENTRY_LEN),
        (enc.parameters.as_bytes(), PARAMETER_ENTRY_LEN),
        (enc.arrays.as_bytes(), VALUE_ENTRY_LEN),
        (enc.strings.as_bytes(), 0),
    ];
    let (refs, size) = layout_tables(CLASS_FIXED_LEN, &tables)?;

    let mut out = vec![0u8; CLASS_FIXED_LEN];
    let header = RecordHeader {
        size: size as u32,
        kind: RecordKind::Class,
        flags: 0,
    };
    out[..HEADER_LEN].copy_from_slice(&header.to_bytes());
    write_u32(&mut out, 8, name);
    write_u32(&mut out, 12, parent);
    write_u32(&mut out, 16, class_flags(class));
    write_u32(&mut out, 20, class_qual_start);
    write_u32(&mut out, 24, class_qual_count);
    for (i, r) in refs.iter().enumerate() {
        r.write(&mut out, 28 + i * 8);
    }
    out.reserve(size - CLASS_FIXED_LEN);
    for (bytes, _) in tables {
        out.extend_from_slice(bytes);
    }
    Ok(out)
}

/// Encode an instance descriptor.
pub fn encode_instance(instance: &InstanceDescriptor) -> CodecResult<Vec<u8>> {
    let mut strings = StringPool::new();
    let mut arrays = Section::default();
    let mut properties = Section::default();

    let namespace = strings.add_opt(instance.namespace.as_deref());
    let class_name = strings.add(&instance.class_name);
    for p in &instance.properties {
        let name = strings.add(&p.name);
        let value = encode_value(
            &mut strings,
            &mut arrays,
            p.data_type,
            p.value.as_ref(),
            ValueState { key: p.key, null: false },
        )?;
        let mut e = [0u8; PROPERTY_ENTRY_LEN];
        write_u32(&mut e, 0, name);
        write_u32(&mut e, 4, if p.key { PROP_KEY } else { 0 });
        e[8..24].copy_from_slice(&value);
        properties.push(&e);
    }

    let tables: [(&[u8], usize); 3] = [
        (properties.as_bytes(), PROPERTY_ENTRY_LEN),
        (arrays.as_bytes(), VALUE_ENTRY_LEN),
        (strings.as_bytes(), 0),
    ];
    let (refs, size) = layout_tables(INSTANCE_FIXED_LEN, &tables)?;

    let mut out = vec![0u8; INSTANCE_FIXED_LEN];
    let header = RecordHeader {
        size: size as u32,
        kind: RecordKind::Instance,
        flags: 0,
    };
    out[..HEADER_LEN].copy_from_slice(&header.to_bytes());
    write_u32(&mut out, 8, namespace);
    write_u32(&mut out, 12, class_name);
    for (i, r) in refs.iter().enumerate() {
        r.write(&mut out, 20 + i * 8);
    }
    out.reserve(size - INSTANCE_FIXED_LEN);
    for (bytes, _) in tables {
        out.extend_from_slice(bytes);
    }
    Ok(out)
}
