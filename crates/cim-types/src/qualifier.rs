use serde::{Deserialize, Serialize};

use crate::types::{CimType, DataType};
use crate::value::CimValue;

/// Propagation flavor of a qualifier.
///
/// The default matches the CIM defaults: overridable and inherited by
/// subclasses, not copied to instances, not translatable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifierFlavor {
    pub overridable: bool,
    pub to_subclass: bool,
    pub to_instance: bool,
    pub translatable: bool,
    /// Set on copies inherited from a superclass.
    pub propagated: bool,
}

impl Default for QualifierFlavor {
    fn default() -> Self {
        Self {
            overridable: true,
            to_subclass: true,
            to_instance: false,
            translatable: false,
            propagated: false,
        }
    }
}

impl QualifierFlavor {
    const OVERRIDABLE: u32 = 0x01;
    const TO_SUBCLASS: u32 = 0x02;
    const TO_INSTANCE: u32 = 0x04;
    const TRANSLATABLE: u32 = 0x08;
    const PROPAGATED: u32 = 0x10;

    /// Flavor for qualifiers that stay on the declaring element only.
    pub fn restricted() -> Self {
        Self {
            to_subclass: false,
            ..Self::default()
        }
    }

    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.overridable {
            bits |= Self::OVERRIDABLE;
        }
        if self.to_subclass {
            bits |= Self::TO_SUBCLASS;
        }
        if self.to_instance {
            bits |= Self::TO_INSTANCE;
        }
        if self.translatable {
            bits |= Self::TRANSLATABLE;
        }
        if self.propagated {
            bits |= Self::PROPAGATED;
        }
        bits
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            overridable: bits & Self::OVERRIDABLE != 0,
            to_subclass: bits & Self::TO_SUBCLASS != 0,
            to_instance: bits & Self::TO_INSTANCE != 0,
            translatable: bits & Self::TRANSLATABLE != 0,
            propagated: bits & Self::PROPAGATED != 0,
        }
    }
}

/// A named, typed piece of metadata attached to a class or one of its members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Qualifier {
    pub name: String,
    pub data_type: DataType,
    /// `None` for a declared-but-null qualifier.
    pub value: Option<CimValue>,
    pub flavor: QualifierFlavor,
}

impl Qualifier {
    pub fn new(name: impl Into<String>, value: CimValue) -> Self {
        Self {
            name: name.into(),
            data_type: value.data_type(),
            value: Some(value),
            flavor: QualifierFlavor::default(),
        }
    }

    /// A boolean `TRUE` qualifier such as `Key` or `Abstract`.
    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, CimValue::Boolean(true))
    }

    pub fn null(name: impl Into<String>, base: CimType) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::scalar(base),
            value: None,
            flavor: QualifierFlavor::default(),
        }
    }

    pub fn with_flavor(mut self, flavor: QualifierFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// True when this is a boolean qualifier named `name` whose value is `TRUE`.
    pub fn is_true(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            && matches!(self.value, Some(CimValue::Boolean(true)))
    }
}
