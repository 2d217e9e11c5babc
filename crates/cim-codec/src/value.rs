//! Encoding of a single typed value into a fixed 16-byte entry.
//!
//! ```text
//! [2 bytes: data type code]  [2 bytes: state bits (null, key)]
//! [4 bytes: aux (array length)]
//! [8 bytes: payload]
//! ```
//!
//! Numeric payloads are stored in place (signed values sign-extended, reals
//! as their IEEE bit patterns). Strings, datetimes and references store a
//! string id. Arrays store the index of their first element in the record's
//! array element table, with the element count in `aux`.

use cim_types::{CimType, CimValue, DataType, ObjectPath, ValueState};

use crate::error::{CodecError, CodecResult};
use crate::layout::{read_str, read_u16, read_u32, read_u64, TableRef, VALUE_ENTRY_LEN};
use crate::pool::{Section, StringPool};

/// Decoded contents of a value entry.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedValue {
    pub data_type: DataType,
    pub state: ValueState,
    pub value: Option<CimValue>,
}

pub(crate) fn encode_value(
    strings: &mut StringPool,
    arrays: &mut Section,
    data_type: DataType,
    value: Option<&CimValue>,
    state: ValueState,
) -> CodecResult<[u8; VALUE_ENTRY_LEN]> {
    let state = ValueState {
        null: value.is_none(),
        ..state
    };
    let (aux, payload) = match value {
        None => (0, 0),
        Some(v) => {
            v.check_type(data_type)?;
            match v {
                CimValue::Array { items, .. } => {
                    let start = arrays.used() / VALUE_ENTRY_LEN;
                    let mut elements = Vec::with_capacity(items.len());
                    for item in items {
                        elements.push(entry(item.data_type(), ValueState::default(), 0, scalar_payload(strings, item)));
                    }
                    for e in &elements {
                        arrays.push(e);
                    }
                    (items.len() as u32, start as u64)
                }
                scalar => (0, scalar_payload(strings, scalar)),
            }
        }
    };
    Ok(entry(data_type, state, aux, payload))
}

fn entry(data_type: DataType, state: ValueState, aux: u32, payload: u64) -> [u8; VALUE_ENTRY_LEN] {
    let mut out = [0u8; VALUE_ENTRY_LEN];
    out[0..2].copy_from_slice(&data_type.code().to_le_bytes());
    out[2..4].copy_from_slice(&state.bits().to_le_bytes());
    out[4..8].copy_from_slice(&aux.to_le_bytes());
    out[8..16].copy_from_slice(&payload.to_le_bytes());
    out
}

fn scalar_payload(strings: &mut StringPool, value: &CimValue) -> u64 {
    match value {
        CimValue::Boolean(b) => u64::from(*b),
        CimValue::Char16(c) => u64::from(*c),
        CimValue::Uint8(v) => u64::from(*v),
        CimValue::Sint8(v) => i64::from(*v) as u64,
        CimValue::Uint16(v) => u64::from(*v),
        CimValue::Sint16(v) => i64::from(*v) as u64,
        CimValue::Uint32(v) => u64::from(*v),
        CimValue::Sint32(v) => i64::from(*v) as u64,
        CimValue::Uint64(v) => *v,
        CimValue::Sint64(v) => *v as u64,
        CimValue::Real32(v) => u64::from(v.to_bits()),
        CimValue::Real64(v) => v.to_bits(),
        CimValue::String(s) | CimValue::DateTime(s) => u64::from(strings.add(s)),
        CimValue::Reference(p) => u64::from(strings.add(&p.to_string())),
        // Nested arrays are rejected by the element type check.
        CimValue::Array { .. } => 0,
    }
}

/// Decode the value entry at byte offset `at`.
pub(crate) fn decode_value(
    bytes: &[u8],
    strings: TableRef,
    arrays: TableRef,
    at: usize,
) -> CodecResult<DecodedValue> {
    let code = read_u16(bytes, at).ok_or_else(|| CodecError::corrupt(at, "value entry out of bounds"))?;
    let data_type = DataType::from_code(code).map_err(|_| CodecError::corrupt(at, format!("bad type code {code:#06x}")))?;
    let state = ValueState::from_bits(read_u16(bytes, at + 2).unwrap_or(0));
    let aux = read_u32(bytes, at + 4).unwrap_or(0);
    let payload = read_u64(bytes, at + 8).ok_or_else(|| CodecError::corrupt(at, "value entry out of bounds"))?;

    if state.null {
        return Ok(DecodedValue {
            data_type,
            state,
            value: None,
        });
    }

    let value = if data_type.array {
        let start = usize::try_from(payload).map_err(|_| CodecError::corrupt(at, "array start overflows"))?;
        let len = aux as usize;
        if start.checked_add(len).map_or(true, |end| end > arrays.count as usize) {
            return Err(CodecError::corrupt(at, format!("array [{start}, +{len}) outside element table")));
        }
        let mut items = Vec::with_capacity(len);
        for i in 0..len {
            let elem_at = arrays.entry(start + i, VALUE_ENTRY_LEN);
            let elem_code = read_u16(bytes, elem_at).unwrap_or(0);
            if elem_code != data_type.element().code() {
                return Err(CodecError::corrupt(elem_at, "array element type mismatch"));
            }
            let elem_payload = read_u64(bytes, elem_at + 8)
                .ok_or_else(|| CodecError::corrupt(elem_at, "array element out of bounds"))?;
            items.push(decode_scalar(bytes, strings, data_type.base, elem_payload, elem_at)?);
        }
        CimValue::Array {
            element: data_type.base,
            items,
        }
    } else {
        decode_scalar(bytes, strings, data_type.base, payload, at)?
    };

    Ok(DecodedValue {
        data_type,
        state,
        value: Some(value),
    })
}

fn decode_scalar(bytes: &[u8], strings: TableRef, base: CimType, payload: u64, at: usize) -> CodecResult<CimValue> {
    let text = || {
        let id = u32::try_from(payload).unwrap_or(0);
        read_str(bytes, strings, id).ok_or_else(|| CodecError::corrupt(at, format!("bad string id {payload}")))
    };
    Ok(match base {
        CimType::Boolean => CimValue::Boolean(payload != 0),
        CimType::Char16 => CimValue::Char16(payload as u16),
        CimType::Uint8 => CimValue::Uint8(payload as u8),
        CimType::Sint8 => CimValue::Sint8(payload as i64 as i8),
        CimType::Uint16 => CimValue::Uint16(payload as u16),
        CimType::Sint16 => CimValue::Sint16(payload as i64 as i16),
        CimType::Uint32 => CimValue::Uint32(payload as u32),
        CimType::Sint32 => CimValue::Sint32(payload as i64 as i32),
        CimType::Uint64 => CimValue::Uint64(payload),
        CimType::Sint64 => CimValue::Sint64(payload as i64),
        CimType::Real32 => CimValue::Real32(f32::from_bits(payload as u32)),
        CimType::Real64 => CimValue::Real64(f64::from_bits(payload)),
        CimType::String => CimValue::String(text()?.to_string()),
        CimType::DateTime => CimValue::DateTime(text()?.to_string()),
        CimType::Reference => CimValue::Reference(text()?.parse::<ObjectPath>()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(dt: DataType, value: Option<CimValue>, state: ValueState) -> DecodedValue {
        let mut strings = StringPool::new();
        let mut arrays = Section::default();
        let e = encode_value(&mut strings, &mut arrays, dt, value.as_ref(), state).unwrap();

        let mut bytes = e.to_vec();
        let arrays_at = bytes.len();
        bytes.extend_from_slice(arrays.as_bytes());
        let strings_at = bytes.len();
        bytes.extend_from_slice(strings.as_bytes());
        let arrays_ref = TableRef {
            offset: arrays_at as u32,
            count: (arrays.used() / VALUE_ENTRY_LEN) as u32,
        };
        let strings_ref = TableRef {
            offset: strings_at as u32,
            count: strings.len() as u32,
        };
        decode_value(&bytes, strings_ref, arrays_ref, 0).unwrap()
    }

    #[test]
    fn scalars_roundtrip() {
        let cases = vec![
            CimValue::Boolean(true),
            CimValue::Char16(0x41),
            CimValue::Sint8(-5),
            CimValue::Sint16(-300),
            CimValue::Sint32(i32::MIN),
            CimValue::Uint64(u64::MAX),
            CimValue::Sint64(-1),
            CimValue::Real32(1.5),
            CimValue::Real64(-2.25),
            CimValue::String("hello".into()),
            CimValue::DateTime("20240101000000.000000+000".into()),
        ];
        for v in cases {
            let d = roundtrip(v.data_type(), Some(v.clone()), ValueState::default());
            assert_eq!(d.value, Some(v));
            assert!(!d.state.null);
        }
    }

    #[test]
    fn reference_roundtrip() {
        let p = ObjectPath::new(Some("root/cimv2"), "CIM_Foo").with_key("Name", "x");
        let d = roundtrip(DataType::scalar(CimType::Reference), Some(CimValue::Reference(p.clone())), ValueState::default());
        assert_eq!(d.value, Some(CimValue::Reference(p)));
    }

    #[test]
    fn arrays_roundtrip() {
        let v = CimValue::array(CimType::String, vec!["a".into(), "bb".into()]).unwrap();
        let d = roundtrip(v.data_type(), Some(v.clone()), ValueState::default());
        assert_eq!(d.value, Some(v));

        let empty = CimValue::array(CimType::Uint8, vec![]).unwrap();
        let d = roundtrip(empty.data_type(), Some(empty.clone()), ValueState::default());
        assert_eq!(d.value, Some(empty));
    }

    #[test]
    fn null_keeps_type_and_key_state() {
        let dt = DataType::scalar(CimType::Uint32);
        let d = roundtrip(dt, None, ValueState { key: true, null: false });
        assert_eq!(d.data_type, dt);
        assert!(d.state.null);
        assert!(d.state.key);
        assert!(d.value.is_none());
    }

    #[test]
    fn type_mismatch_rejected() {
        let mut strings = StringPool::new();
        let mut arrays = Section::default();
        let r = encode_value(
            &mut strings,
            &mut arrays,
            DataType::scalar(CimType::Uint32),
            Some(&CimValue::String("x".into())),
            ValueState::default(),
        );
        assert!(matches!(r, Err(CodecError::Type(_))));
    }

    #[test]
    fn array_outside_table_is_corrupt() {
        let mut bytes = entry(DataType::array_of(CimType::Uint8), ValueState::default(), 3, 0).to_vec();
        bytes.extend_from_slice(&[0; 16]);
        let arrays = TableRef { offset: 16, count: 1 };
        let r = decode_value(&bytes, TableRef::default(), arrays, 0);
        assert!(matches!(r, Err(CodecError::Corrupt { .. })));
    }
}
