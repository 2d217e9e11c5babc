//! Relocatable binary encoding for CIM class and instance descriptors.
//!
//! A class or instance is encoded into a single contiguous record whose
//! internal references are offsets from the record start. Records can be
//! appended to a store file, shipped between processes, or copied in memory
//! and re-attached with [`ConstClass::relocate`] without any pointer fix-up.
//!
//! # Layers
//!
//! - [`ClassDescriptor`] / [`InstanceDescriptor`]: owned, mutable forms
//! - [`encode_class`] / [`encode_instance`]: deterministic serialization
//! - [`ConstClass`]: validated read-only class view with the accessor API
//!   (qualifiers, properties, methods, parameters, key list, class flags)
//! - [`InstanceView`]: read-only instance view with lazy value decoding
//! - [`merge`]: copy-down inheritance flattening of a subclass
//! - [`VersionRecord`]: leading record of a versioned store
//! - [`MsgSegment`]: opaque transport unit
//!
//! This crate performs no I/O and takes no locks.

pub mod accessor;
pub mod class;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod instance;
pub mod layout;
pub mod merge;
pub mod pool;
pub mod segment;
pub mod value;
pub mod version;

pub use accessor::{MethodView, ParameterView, PropertyView, QualifierList, QualifierView};
pub use class::ConstClass;
pub use descriptor::{
    ClassDescriptor, InstanceDescriptor, InstanceProperty, MethodDecl, ParameterDecl, PropertyDecl,
};
pub use encode::{encode_class, encode_instance};
pub use error::{CodecError, CodecResult};
pub use instance::{InstancePropertyView, InstanceView};
pub use layout::{RecordHeader, RecordKind, HEADER_LEN};
pub use merge::{flatten, merge};
pub use segment::{MsgSegment, SegmentKind};
pub use version::{VersionRecord, SUPPORTED_OBJ_IMPL_LEVEL, VERSION_RECORD_LEN};

#[cfg(test)]
mod tests {
    use super::*;
    use cim_types::{CimType, CimValue, Qualifier, QualifierFlavor};
    use proptest::prelude::*;

    fn arb_scalar() -> impl Strategy<Value = (CimType, CimValue)> {
        prop_oneof![
            any::<bool>().prop_map(|v| (CimType::Boolean, CimValue::Boolean(v))),
            any::<u8>().prop_map(|v| (CimType::Uint8, CimValue::Uint8(v))),
            any::<i16>().prop_map(|v| (CimType::Sint16, CimValue::Sint16(v))),
            any::<u32>().prop_map(|v| (CimType::Uint32, CimValue::Uint32(v))),
            any::<i64>().prop_map(|v| (CimType::Sint64, CimValue::Sint64(v))),
            (-1.0e6f64..1.0e6).prop_map(|v| (CimType::Real64, CimValue::Real64(v))),
            "[a-zA-Z0-9 _]{0,12}".prop_map(|v| (CimType::String, CimValue::String(v))),
        ]
    }

    fn arb_qualifier() -> impl Strategy<Value = Qualifier> {
        ("[A-Z][a-z]{1,8}", arb_scalar(), any::<u8>()).prop_map(|(name, (_, value), bits)| {
            Qualifier::new(name, value).with_flavor(QualifierFlavor::from_bits(u32::from(bits & 0x1f)))
        })
    }

    fn arb_property() -> impl Strategy<Value = PropertyDecl> {
        (
            "[A-Z][a-zA-Z]{1,10}",
            arb_scalar(),
            any::<bool>(),
            prop::collection::vec(arb_qualifier(), 0..3),
            any::<bool>(),
        )
            .prop_map(|(name, (ty, value), with_default, qualifiers, as_array)| {
                let (data_type, value) = if as_array {
                    let arr = CimValue::Array {
                        element: ty,
                        items: vec![value.clone(), value],
                    };
                    (arr.data_type(), arr)
                } else {
                    (value.data_type(), value)
                };
                PropertyDecl {
                    name,
                    data_type,
                    value: with_default.then_some(value),
                    qualifiers,
                    class_origin: None,
                    propagated: false,
                    reference_class: None,
                }
            })
    }

    fn arb_class() -> impl Strategy<Value = ClassDescriptor> {
        (
            "CIM_[A-Za-z]{1,12}",
            prop::option::of("CIM_[A-Za-z]{1,12}"),
            prop::collection::vec(arb_qualifier(), 0..4),
            prop::collection::vec(arb_property(), 0..6),
            prop::collection::vec(("[A-Z][a-z]{1,8}", prop::collection::vec("[A-Z][a-z]{1,6}", 0..3)), 0..3),
        )
            .prop_map(|(name, superclass, qualifiers, properties, methods)| ClassDescriptor {
                name,
                superclass,
                qualifiers,
                properties,
                methods: methods
                    .into_iter()
                    .map(|(m, params)| {
                        params.into_iter().fold(MethodDecl::new(m, CimType::Uint32), |m, p| {
                            m.with_parameter(ParameterDecl::new(p, CimType::String))
                        })
                    })
                    .collect(),
            })
    }

    proptest! {
        #[test]
        fn reencoding_is_byte_identical(class in arb_class()) {
            let bytes = encode_class(&class).unwrap();
            let decoded = ConstClass::decode(bytes.clone()).unwrap();
            prop_assert_eq!(encode_class(&decoded.to_descriptor()).unwrap(), bytes);
        }

        #[test]
        fn relocation_preserves_accessors(class in arb_class()) {
            let original = ConstClass::decode(encode_class(&class).unwrap()).unwrap();
            let mut moved = vec![0u8; 3];
            moved.extend_from_slice(original.as_bytes());
            let relocated = ConstClass::relocate(moved[3..].to_vec()).unwrap();
            prop_assert_eq!(relocated.to_descriptor(), original.to_descriptor());
            prop_assert_eq!(relocated.key_list(), original.key_list());
            prop_assert_eq!(relocated.is_association(), original.is_association());
        }

        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = ConstClass::decode(bytes.clone());
            let _ = InstanceView::decode(bytes);
        }
    }
}
