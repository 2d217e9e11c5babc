use std::fmt;

use cim_types::{CimValue, DataType, ValueState};

use crate::descriptor::{InstanceDescriptor, InstanceProperty};
use crate::encode::encode_instance;
use crate::error::{CodecError, CodecResult};
use crate::layout::*;
use crate::value::decode_value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct InstanceLayout {
    namespace: u32,
    class_name: u32,
    properties: TableRef,
    arrays: TableRef,
    strings: TableRef,
}

impl InstanceLayout {
    fn read(bytes: &[u8]) -> CodecResult<(Self, usize)> {
        let size = RecordHeader::expect(bytes, RecordKind::Instance, INSTANCE_FIXED_LEN)?;
        let layout = Self {
            namespace: read_u32(bytes, 8).unwrap_or(0),
            class_name: read_u32(bytes, 12).unwrap_or(0),
            properties: TableRef::read(bytes, 20),
            arrays: TableRef::read(bytes, 28),
            strings: TableRef::read(bytes, 36),
        };
        layout.properties.check(PROPERTY_ENTRY_LEN, INSTANCE_FIXED_LEN, size, "property")?;
        layout.arrays.check(VALUE_ENTRY_LEN, INSTANCE_FIXED_LEN, size, "array")?;
        layout.strings.check(1, INSTANCE_FIXED_LEN, size, "string")?;
        Ok((layout, size))
    }
}

/// An immutable, encoded instance.
///
/// Property values are decoded on access, so array and reference values
/// are only materialized when asked for.
#[derive(Clone, PartialEq, Eq)]
pub struct InstanceView {
    bytes: Vec<u8>,
    layout: InstanceLayout,
}

impl InstanceView {
    /// Decode and validate every property entry.
    pub fn decode(mut bytes: Vec<u8>) -> CodecResult<Self> {
        let (layout, size) = InstanceLayout::read(&bytes)?;
        bytes.truncate(size);
        let view = Self { bytes, layout };
        check_str(&view.bytes, layout.strings, layout.namespace, 8)?;
        if check_str(&view.bytes, layout.strings, layout.class_name, 12)?.is_none() {
            return Err(CodecError::corrupt(12, "instance record without a class name"));
        }
        for i in 0..layout.properties.count as usize {
            let at = layout.properties.entry(i, PROPERTY_ENTRY_LEN);
            check_str(&view.bytes, layout.strings, read_u32(&view.bytes, at).unwrap_or(0), at)?
                .ok_or_else(|| CodecError::corrupt(at, "property without a name"))?;
            decode_value(&view.bytes, layout.strings, layout.arrays, at + 8)?;
        }
        Ok(view)
    }

    /// Re-establish a view over moved bytes, checking only the section table.
    pub fn relocate(mut bytes: Vec<u8>) -> CodecResult<Self> {
        let (layout, size) = InstanceLayout::read(&bytes)?;
        bytes.truncate(size);
        Ok(Self { bytes, layout })
    }

    pub fn from_descriptor(instance: &InstanceDescriptor) -> CodecResult<Self> {
        Self::relocate(encode_instance(instance)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn str_at(&self, id: u32) -> Option<&str> {
        read_str(&self.bytes, self.layout.strings, id)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at(self.layout.namespace)
    }

    pub fn class_name(&self) -> &str {
        self.str_at(self.layout.class_name).unwrap_or_default()
    }

    pub fn property_count(&self) -> usize {
        self.layout.properties.count as usize
    }

    pub fn property_at(&self, index: usize) -> Option<InstancePropertyView<'_>> {
        (index < self.property_count()).then(|| InstancePropertyView {
            view: self,
            base: self.layout.properties.entry(index, PROPERTY_ENTRY_LEN),
        })
    }

    pub fn property(&self, name: &str) -> Option<InstancePropertyView<'_>> {
        self.properties().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn properties(&self) -> impl Iterator<Item = InstancePropertyView<'_>> + '_ {
        (0..self.property_count()).filter_map(|i| self.property_at(i))
    }

    pub fn to_descriptor(&self) -> CodecResult<InstanceDescriptor> {
        let mut properties = Vec::with_capacity(self.property_count());
        for p in self.properties() {
            let (data_type, state, value) = p.decode()?;
            properties.push(InstanceProperty {
                name: p.name().to_string(),
                data_type,
                value,
                key: state.key,
            });
        }
        Ok(InstanceDescriptor {
            namespace: self.namespace().map(str::to_string),
            class_name: self.class_name().to_string(),
            properties,
        })
    }
}

impl fmt::Debug for InstanceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceView")
            .field("namespace", &self.namespace())
            .field("class_name", &self.class_name())
            .field("properties", &self.property_count())
            .finish()
    }
}

/// One property entry of an [`InstanceView`].
#[derive(Clone, Copy)]
pub struct InstancePropertyView<'a> {
    view: &'a InstanceView,
    base: usize,
}

impl<'a> InstancePropertyView<'a> {
    pub fn name(&self) -> &'a str {
        let id = read_u32(&self.view.bytes, self.base).unwrap_or(0);
        self.view.str_at(id).unwrap_or_default()
    }

    /// Type code and state, without touching the payload.
    pub fn data_type(&self) -> Option<DataType> {
        read_u16(&self.view.bytes, self.base + 8).and_then(|c| DataType::from_code(c).ok())
    }

    pub fn state(&self) -> ValueState {
        ValueState::from_bits(read_u16(&self.view.bytes, self.base + 10).unwrap_or(0))
    }

    /// Decode the value; arrays and references are materialized here.
    pub fn decode(&self) -> CodecResult<(DataType, ValueState, Option<CimValue>)> {
        let l = &self.view.layout;
        let d = decode_value(&self.view.bytes, l.strings, l.arrays, self.base + 8)?;
        Ok((d.data_type, d.state, d.value))
    }

    pub fn value(&self) -> Option<CimValue> {
        self.decode().ok().and_then(|(_, _, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_types::{CimType, ObjectPath};

    fn sample() -> InstanceDescriptor {
        InstanceDescriptor::new(Some("root/cimv2"), "CIM_Foo")
            .with_property(InstanceProperty::new("Name", "disk0".into()).key())
            .with_property(InstanceProperty::new(
                "Tags",
                CimValue::array(CimType::String, vec!["a".into(), "b".into()]).unwrap(),
            ))
            .with_property(InstanceProperty::new(
                "Owner",
                CimValue::Reference(ObjectPath::new(None, "CIM_System").with_key("Name", "host")),
            ))
            .with_property(InstanceProperty {
                name: "Unset".into(),
                data_type: DataType::scalar(CimType::Uint32),
                value: None,
                key: false,
            })
    }

    #[test]
    fn instance_roundtrip() {
        let view = InstanceView::decode(encode_instance(&sample()).unwrap()).unwrap();
        assert_eq!(view.namespace(), Some("root/cimv2"));
        assert_eq!(view.class_name(), "CIM_Foo");
        assert_eq!(view.property_count(), 4);
        assert_eq!(view.to_descriptor().unwrap(), sample());
    }

    #[test]
    fn state_and_type_without_decoding() {
        let view = InstanceView::from_descriptor(&sample()).unwrap();
        let name = view.property("name").unwrap();
        assert!(name.state().key);
        let unset = view.property("Unset").unwrap();
        assert!(unset.state().null);
        assert_eq!(unset.data_type(), Some(DataType::scalar(CimType::Uint32)));
        assert!(unset.value().is_none());
        let tags = view.property_at(1).unwrap();
        assert_eq!(tags.data_type(), Some(DataType::array_of(CimType::String)));
    }

    #[test]
    fn corrupt_instance_rejected() {
        let mut bytes = encode_instance(&sample()).unwrap();
        write_u32(&mut bytes, 12, 0);
        assert!(InstanceView::decode(bytes).is_err());
    }
}
