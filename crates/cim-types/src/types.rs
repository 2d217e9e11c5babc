use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Scalar kinds a CIM property, qualifier, or parameter can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CimType {
    Boolean,
    Char16,
    Uint8,
    Sint8,
    Uint16,
    Sint16,
    Uint32,
    Sint32,
    Uint64,
    Sint64,
    Real32,
    Real64,
    String,
    DateTime,
    Reference,
}

impl CimType {
    /// All scalar kinds, in code order.
    pub const ALL: [CimType; 15] = [
        Self::Boolean,
        Self::Char16,
        Self::Uint8,
        Self::Sint8,
        Self::Uint16,
        Self::Sint16,
        Self::Uint32,
        Self::Sint32,
        Self::Uint64,
        Self::Sint64,
        Self::Real32,
        Self::Real64,
        Self::String,
        Self::DateTime,
        Self::Reference,
    ];

    /// Wire code used by the binary encoding (never zero).
    pub fn code(&self) -> u8 {
        match self {
            Self::Boolean => 1,
            Self::Char16 => 2,
            Self::Uint8 => 3,
            Self::Sint8 => 4,
            Self::Uint16 => 5,
            Self::Sint16 => 6,
            Self::Uint32 => 7,
            Self::Sint32 => 8,
            Self::Uint64 => 9,
            Self::Sint64 => 10,
            Self::Real32 => 11,
            Self::Real64 => 12,
            Self::String => 13,
            Self::DateTime => 14,
            Self::Reference => 15,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// MOF keyword for this type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Char16 => "char16",
            Self::Uint8 => "uint8",
            Self::Sint8 => "sint8",
            Self::Uint16 => "uint16",
            Self::Sint16 => "sint16",
            Self::Uint32 => "uint32",
            Self::Sint32 => "sint32",
            Self::Uint64 => "uint64",
            Self::Sint64 => "sint64",
            Self::Real32 => "real32",
            Self::Real64 => "real64",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Reference => "ref",
        }
    }

    /// Types whose encoded payload is a string-pool reference.
    pub fn is_string_like(&self) -> bool {
        matches!(self, Self::String | Self::DateTime | Self::Reference)
    }
}

impl fmt::Display for CimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar kind plus an array flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub base: CimType,
    pub array: bool,
}

const ARRAY_BIT: u16 = 0x0100;

impl DataType {
    pub const fn scalar(base: CimType) -> Self {
        Self { base, array: false }
    }

    pub const fn array_of(base: CimType) -> Self {
        Self { base, array: true }
    }

    /// 16-bit wire code: scalar code in the low byte, bit 8 set for arrays.
    pub fn code(&self) -> u16 {
        let base = u16::from(self.base.code());
        if self.array {
            base | ARRAY_BIT
        } else {
            base
        }
    }

    pub fn from_code(code: u16) -> Result<Self, TypeError> {
        if code & !(ARRAY_BIT | 0x00ff) != 0 {
            return Err(TypeError::UnknownTypeCode(code));
        }
        let base = CimType::from_code((code & 0x00ff) as u8)
            .ok_or(TypeError::UnknownTypeCode(code))?;
        Ok(Self {
            base,
            array: code & ARRAY_BIT != 0,
        })
    }

    /// The element type of an array type (identity for scalars).
    pub fn element(&self) -> Self {
        Self::scalar(self.base)
    }
}

impl From<CimType> for DataType {
    fn from(base: CimType) -> Self {
        Self::scalar(base)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.array {
            write!(f, "{}[]", self.base)
        } else {
            write!(f, "{}", self.base)
        }
    }
}

impl FromStr for DataType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (name, array) = match trimmed.strip_suffix("[]") {
            Some(inner) => (inner.trim_end(), true),
            None => (trimmed, false),
        };
        let base = CimType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
            .or_else(|| name.eq_ignore_ascii_case("reference").then_some(CimType::Reference))
            .ok_or_else(|| TypeError::UnknownTypeName(s.to_string()))?;
        Ok(Self { base, array })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_nonzero() {
        for (i, a) in CimType::ALL.iter().enumerate() {
            assert_ne!(a.code(), 0);
            for b in &CimType::ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn data_type_code_roundtrip() {
        for base in CimType::ALL {
            for dt in [DataType::scalar(base), DataType::array_of(base)] {
                assert_eq!(DataType::from_code(dt.code()).unwrap(), dt);
            }
        }
    }

    #[test]
    fn unknown_codes_rejected() {
        assert!(DataType::from_code(0).is_err());
        assert!(DataType::from_code(0x0040).is_err());
        assert!(DataType::from_code(0x0201).is_err());
    }

    #[test]
    fn parse_and_display() {
        let dt: DataType = "uint32[]".parse().unwrap();
        assert_eq!(dt, DataType::array_of(CimType::Uint32));
        assert_eq!(dt.to_string(), "uint32[]");
        assert_eq!("String".parse::<DataType>().unwrap(), DataType::scalar(CimType::String));
        assert!("uint128".parse::<DataType>().is_err());
    }
}
