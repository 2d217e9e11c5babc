use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::path::ObjectPath;
use crate::types::{CimType, DataType};

/// A typed CIM value.
///
/// Arrays carry their element type explicitly so that an empty array still
/// knows what it is an array of.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CimValue {
    Boolean(bool),
    Char16(u16),
    Uint8(u8),
    Sint8(i8),
    Uint16(u16),
    Sint16(i16),
    Uint32(u32),
    Sint32(i32),
    Uint64(u64),
    Sint64(i64),
    Real32(f32),
    Real64(f64),
    String(String),
    DateTime(String),
    Reference(ObjectPath),
    Array { element: CimType, items: Vec<CimValue> },
}

impl CimValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Array { element, .. } => DataType::array_of(*element),
            scalar => DataType::scalar(scalar.scalar_type()),
        }
    }

    fn scalar_type(&self) -> CimType {
        match self {
            Self::Boolean(_) => CimType::Boolean,
            Self::Char16(_) => CimType::Char16,
            Self::Uint8(_) => CimType::Uint8,
            Self::Sint8(_) => CimType::Sint8,
            Self::Uint16(_) => CimType::Uint16,
            Self::Sint16(_) => CimType::Sint16,
            Self::Uint32(_) => CimType::Uint32,
            Self::Sint32(_) => CimType::Sint32,
            Self::Uint64(_) => CimType::Uint64,
            Self::Sint64(_) => CimType::Sint64,
            Self::Real32(_) => CimType::Real32,
            Self::Real64(_) => CimType::Real64,
            Self::String(_) => CimType::String,
            Self::DateTime(_) => CimType::DateTime,
            Self::Reference(_) => CimType::Reference,
            Self::Array { element, .. } => *element,
        }
    }

    /// Build an array value, checking every item against the element type.
    pub fn array(element: CimType, items: Vec<CimValue>) -> Result<Self, TypeError> {
        for item in &items {
            item.check_type(DataType::scalar(element))?;
        }
        Ok(Self::Array { element, items })
    }

    /// Fails with [`TypeError::TypeMismatch`] unless this value has type `expected`.
    pub fn check_type(&self, expected: DataType) -> Result<(), TypeError> {
        let actual = self.data_type();
        if actual == expected {
            Ok(())
        } else {
            Err(TypeError::TypeMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::DateTime(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ObjectPath> {
        match self {
            Self::Reference(p) => Some(p),
            _ => None,
        }
    }
}

impl From<&str> for CimValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for CimValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for CimValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<u32> for CimValue {
    fn from(v: u32) -> Self {
        Self::Uint32(v)
    }
}

impl From<u64> for CimValue {
    fn from(v: u64) -> Self {
        Self::Uint64(v)
    }
}

impl From<ObjectPath> for CimValue {
    fn from(p: ObjectPath) -> Self {
        Self::Reference(p)
    }
}

pub(crate) fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

/// MOF literal syntax.
impl fmt::Display for CimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Char16(c) => match char::from_u32(u32::from(*c)) {
                Some(ch) => write!(f, "'{ch}'"),
                None => write!(f, "{c:#06x}"),
            },
            Self::Uint8(v) => write!(f, "{v}"),
            Self::Sint8(v) => write!(f, "{v}"),
            Self::Uint16(v) => write!(f, "{v}"),
            Self::Sint16(v) => write!(f, "{v}"),
            Self::Uint32(v) => write!(f, "{v}"),
            Self::Sint32(v) => write!(f, "{v}"),
            Self::Uint64(v) => write!(f, "{v}"),
            Self::Sint64(v) => write!(f, "{v}"),
            Self::Real32(v) => write!(f, "{v:?}"),
            Self::Real64(v) => write!(f, "{v:?}"),
            Self::String(s) | Self::DateTime(s) => write_quoted(f, s),
            Self::Reference(p) => write_quoted(f, &p.to_string()),
            Self::Array { items, .. } => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// State bits carried alongside every encoded value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueState {
    /// The value participates in the instance's object path.
    pub key: bool,
    /// No value is present.
    pub null: bool,
}

impl ValueState {
    pub const NULL_BIT: u16 = 0x0001;
    pub const KEY_BIT: u16 = 0x0002;

    pub fn bits(&self) -> u16 {
        let mut bits = 0;
        if self.null {
            bits |= Self::NULL_BIT;
        }
        if self.key {
            bits |= Self::KEY_BIT;
        }
        bits
    }

    pub fn from_bits(bits: u16) -> Self {
        Self {
            null: bits & Self::NULL_BIT != 0,
            key: bits & Self::KEY_BIT != 0,
        }
    }

    /// A present, non-key value.
    pub fn is_good(&self) -> bool {
        !self.null && !self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_of_values() {
        assert_eq!(CimValue::Uint16(3).data_type(), DataType::scalar(CimType::Uint16));
        let arr = CimValue::array(CimType::String, vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(arr.data_type(), DataType::array_of(CimType::String));
    }

    #[test]
    fn array_rejects_mixed_items() {
        let err = CimValue::array(CimType::String, vec!["a".into(), CimValue::Uint8(1)]);
        assert!(matches!(err, Err(TypeError::TypeMismatch { .. })));
    }

    #[test]
    fn display_escapes_strings() {
        let v = CimValue::from(r#"a"b\c"#);
        assert_eq!(v.to_string(), r#""a\"b\\c""#);
        assert_eq!(CimValue::Boolean(true).to_string(), "TRUE");
        let arr = CimValue::array(CimType::Uint8, vec![CimValue::Uint8(1), CimValue::Uint8(2)]).unwrap();
        assert_eq!(arr.to_string(), "{1, 2}");
    }

    #[test]
    fn state_bits_roundtrip() {
        for key in [false, true] {
            for null in [false, true] {
                let s = ValueState { key, null };
                assert_eq!(ValueState::from_bits(s.bits()), s);
            }
        }
        assert!(ValueState::default().is_good());
    }

    #[test]
    fn serde_roundtrip() {
        let v = CimValue::array(CimType::Sint32, vec![CimValue::Sint32(-4)]).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        let back: CimValue = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
