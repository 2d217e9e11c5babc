//! Read-only projections over a [`ConstClass`].
//!
//! Qualifier, property, method and parameter entries are fixed size, so
//! at-index access is a multiplication and by-name access a linear scan.
//! Names compare case-insensitively.

use std::fmt;

use cim_types::{CimValue, DataType, Qualifier, QualifierFlavor};

use crate::class::ConstClass;
use crate::descriptor::{ClassDescriptor, MethodDecl, ParameterDecl, PropertyDecl};
use crate::error::CodecResult;
use crate::layout::*;
use crate::value::{decode_value, DecodedValue};

/// A range of qualifier entries belonging to one element of a class.
#[derive(Clone, Copy)]
pub struct QualifierList<'a> {
    class: &'a ConstClass,
    start: u32,
    count: u32,
}

impl<'a> QualifierList<'a> {
    fn at(class: &'a ConstClass, bytes_at: usize) -> Self {
        let range = TableRef::read(&class.bytes, bytes_at);
        Self {
            class,
            start: range.offset,
            count: range.count,
        }
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> Option<QualifierView<'a>> {
        if index >= self.len() {
            return None;
        }
        let base = self
            .class
            .layout
            .qualifiers
            .entry(self.start as usize + index, QUALIFIER_ENTRY_LEN);
        Some(QualifierView {
            class: self.class,
            base,
        })
    }

    pub fn find(&self, name: &str) -> Option<QualifierView<'a>> {
        self.iter().find(|q| q.name().eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = QualifierView<'a>> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    pub fn to_vec(&self) -> Vec<Qualifier> {
        self.iter().map(|q| q.to_qualifier()).collect()
    }

    /// True when a boolean qualifier `name` is present and `TRUE`.
    pub fn is_true(&self, name: &str) -> bool {
        self.find(name)
            .is_some_and(|q| matches!(q.value(), Some(CimValue::Boolean(true))))
    }
}

fn decoded(class: &ConstClass, at: usize) -> Option<DecodedValue> {
    decode_value(&class.bytes, class.layout.strings, class.layout.arrays, at).ok()
}

/// A single qualifier.
#[derive(Clone, Copy)]
pub struct QualifierView<'a> {
    class: &'a ConstClass,
    base: usize,
}

impl<'a> QualifierView<'a> {
    pub fn name(&self) -> &'a str {
        let id = read_u32(&self.class.bytes, self.base).unwrap_or(0);
        self.class.str_at(id).unwrap_or_default()
    }

    pub fn flavor(&self) -> QualifierFlavor {
        QualifierFlavor::from_bits(read_u32(&self.class.bytes, self.base + 4).unwrap_or(0))
    }

    pub fn data_type(&self) -> Option<DataType> {
        decoded(self.class, self.base + 8).map(|d| d.data_type)
    }

    pub fn value(&self) -> Option<CimValue> {
        decoded(self.class, self.base + 8).and_then(|d| d.value)
    }

    pub fn to_qualifier(&self) -> Qualifier {
        let d = decoded(self.class, self.base + 8);
        Qualifier {
            name: self.name().to_string(),
            data_type: d
                .as_ref()
                .map_or(DataType::scalar(cim_types::CimType::Boolean), |d| d.data_type),
            value: d.and_then(|d| d.value),
            flavor: self.flavor(),
        }
    }
}

/// A single property of a class.
#[derive(Clone, Copy)]
pub struct PropertyView<'a> {
    class: &'a ConstClass,
    base: usize,
}

impl<'a> PropertyView<'a> {
    fn u32_at(&self, offset: usize) -> u32 {
        read_u32(&self.class.bytes, self.base + offset).unwrap_or(0)
    }

    pub fn name(&self) -> &'a str {
        self.class.str_at(self.u32_at(0)).unwrap_or_default()
    }

    fn flags(&self) -> u32 {
        self.u32_at(4)
    }

    pub fn data_type(&self) -> Option<DataType> {
        decoded(self.class, self.base + 8).map(|d| d.data_type)
    }

    /// The default value, if one was declared.
    pub fn value(&self) -> Option<CimValue> {
        decoded(self.class, self.base + 8).and_then(|d| d.value)
    }

    pub fn reference_class(&self) -> Option<&'a str> {
        self.class.str_at(self.u32_at(24))
    }

    pub fn class_origin(&self) -> Option<&'a str> {
        self.class.str_at(self.u32_at(28))
    }

    pub fn is_key(&self) -> bool {
        self.flags() & PROP_KEY != 0
    }

    pub fn is_embedded_object(&self) -> bool {
        self.flags() & PROP_EMBEDDED_OBJECT != 0
    }

    pub fn is_embedded_instance(&self) -> bool {
        self.flags() & PROP_EMBEDDED_INSTANCE != 0
    }

    pub fn is_propagated(&self) -> bool {
        self.flags() & PROP_PROPAGATED != 0
    }

    pub fn qualifiers(&self) -> QualifierList<'a> {
        QualifierList::at(self.class, self.base + 32)
    }

    /// Whether boolean qualifier `name` is set on this property.
    ///
    /// `Key`, `EmbeddedObject` and `EmbeddedInstance` are answered from the
    /// cached flag bits without scanning the qualifier list.
    pub fn has_flag(&self, name: &str) -> bool {
        if name.eq_ignore_ascii_case("Key") {
            self.is_key()
        } else if name.eq_ignore_ascii_case("EmbeddedObject") {
            self.is_embedded_object()
        } else if name.eq_ignore_ascii_case("EmbeddedInstance") {
            self.is_embedded_instance()
        } else {
            self.qualifiers().is_true(name)
        }
    }

    pub fn to_decl(&self) -> PropertyDecl {
        let d = decoded(self.class, self.base + 8);
        PropertyDecl {
            name: self.name().to_string(),
            data_type: d
                .as_ref()
                .map_or(DataType::scalar(cim_types::CimType::String), |d| d.data_type),
            value: d.and_then(|d| d.value),
            qualifiers: self.qualifiers().to_vec(),
            class_origin: self.class_origin().map(str::to_string),
            propagated: self.is_propagated(),
            reference_class: self.reference_class().map(str::to_string),
        }
    }
}

/// A single method of a class.
#[derive(Clone, Copy)]
pub struct MethodView<'a> {
    class: &'a ConstClass,
    base: usize,
}

impl<'a> MethodView<'a> {
    fn u32_at(&self, offset: usize) -> u32 {
        read_u32(&self.class.bytes, self.base + offset).unwrap_or(0)
    }

    pub fn name(&self) -> &'a str {
        self.class.str_at(self.u32_at(0)).unwrap_or_default()
    }

    pub fn is_propagated(&self) -> bool {
        self.u32_at(4) & METHOD_PROPAGATED != 0
    }

    pub fn return_type(&self) -> Option<DataType> {
        DataType::from_code(self.u32_at(8) as u16).ok()
    }

    pub fn class_origin(&self) -> Option<&'a str> {
        self.class.str_at(self.u32_at(12))
    }

    pub fn qualifiers(&self) -> QualifierList<'a> {
        QualifierList::at(self.class, self.base + 16)
    }

    pub fn parameter_count(&self) -> usize {
        self.u32_at(28) as usize
    }

    pub fn parameter_at(&self, index: usize) -> Option<ParameterView<'a>> {
        if index >= self.parameter_count() {
            return None;
        }
        let base = self
            .class
            .layout
            .parameters
            .entry(self.u32_at(24) as usize + index, PARAMETER_ENTRY_LEN);
        Some(ParameterView {
            class: self.class,
            base,
        })
    }

    pub fn parameter(&self, name: &str) -> Option<ParameterView<'a>> {
        self.parameters().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn parameters(&self) -> impl Iterator<Item = ParameterView<'a>> + '_ {
        (0..self.parameter_count()).filter_map(|i| self.parameter_at(i))
    }

    pub fn to_decl(&self) -> MethodDecl {
        MethodDecl {
            name: self.name().to_string(),
            return_type: self
                .return_type()
                .unwrap_or(DataType::scalar(cim_types::CimType::Uint32)),
            qualifiers: self.qualifiers().to_vec(),
            parameters: self.parameters().map(|p| p.to_decl()).collect(),
            class_origin: self.class_origin().map(str::to_string),
            propagated: self.is_propagated(),
        }
    }
}

/// A single method parameter.
#[derive(Clone, Copy)]
pub struct ParameterView<'a> {
    class: &'a ConstClass,
    base: usize,
}

impl<'a> ParameterView<'a> {
    fn u32_at(&self, offset: usize) -> u32 {
        read_u32(&self.class.bytes, self.base + offset).unwrap_or(0)
    }

    pub fn name(&self) -> &'a str {
        self.class.str_at(self.u32_at(0)).unwrap_or_default()
    }

    pub fn data_type(&self) -> Option<DataType> {
        DataType::from_code(self.u32_at(4) as u16).ok()
    }

    pub fn reference_class(&self) -> Option<&'a str> {
        self.class.str_at(self.u32_at(8))
    }

    pub fn qualifiers(&self) -> QualifierList<'a> {
        QualifierList::at(self.class, self.base + 12)
    }

    pub fn to_decl(&self) -> ParameterDecl {
        ParameterDecl {
            name: self.name().to_string(),
            data_type: self
                .data_type()
                .unwrap_or(DataType::scalar(cim_types::CimType::String)),
            qualifiers: self.qualifiers().to_vec(),
            reference_class: self.reference_class().map(str::to_string),
        }
    }
}

impl ConstClass {
    pub fn name(&self) -> &str {
        self.str_at(self.layout.name).unwrap_or_default()
    }

    pub fn superclass(&self) -> Option<&str> {
        self.str_at(self.layout.parent)
    }

    pub fn qualifiers(&self) -> QualifierList<'_> {
        QualifierList {
            class: self,
            start: self.layout.class_quals.offset,
            count: self.layout.class_quals.count,
        }
    }

    pub fn qualifier_count(&self) -> usize {
        self.qualifiers().len()
    }

    pub fn qualifier_at(&self, index: usize) -> Option<QualifierView<'_>> {
        self.qualifiers().get(index)
    }

    pub fn qualifier(&self, name: &str) -> Option<QualifierView<'_>> {
        self.qualifiers().find(name)
    }

    pub fn property_count(&self) -> usize {
        self.layout.properties.count as usize
    }

    pub fn property_at(&self, index: usize) -> Option<PropertyView<'_>> {
        (index < self.property_count()).then(|| PropertyView {
            class: self,
            base: self.layout.properties.entry(index, PROPERTY_ENTRY_LEN),
        })
    }

    pub fn property(&self, name: &str) -> Option<PropertyView<'_>> {
        self.properties().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn properties(&self) -> impl Iterator<Item = PropertyView<'_>> + '_ {
        (0..self.property_count()).filter_map(|i| self.property_at(i))
    }

    pub fn method_count(&self) -> usize {
        self.layout.methods.count as usize
    }

    pub fn method_at(&self, index: usize) -> Option<MethodView<'_>> {
        (index < self.method_count()).then(|| MethodView {
            class: self,
            base: self.layout.methods.entry(index, METHOD_ENTRY_LEN),
        })
    }

    pub fn method(&self, name: &str) -> Option<MethodView<'_>> {
        self.methods().find(|m| m.name().eq_ignore_ascii_case(name))
    }

    pub fn methods(&self) -> impl Iterator<Item = MethodView<'_>> + '_ {
        (0..self.method_count()).filter_map(|i| self.method_at(i))
    }

    pub fn is_abstract(&self) -> bool {
        self.layout.flags & CLASS_ABSTRACT != 0
    }

    pub fn is_association(&self) -> bool {
        self.layout.flags & CLASS_ASSOCIATION != 0
    }

    pub fn is_indication(&self) -> bool {
        self.layout.flags & CLASS_INDICATION != 0
    }

    /// Names of the key properties, in declaration order.
    pub fn key_list(&self) -> Vec<String> {
        self.properties()
            .filter(|p| p.is_key())
            .map(|p| p.name().to_string())
            .collect()
    }

    /// How many of `names` are properties of this class.
    pub fn count_known_properties<S: AsRef<str>>(&self, names: &[S]) -> usize {
        names
            .iter()
            .filter(|n| self.property(n.as_ref()).is_some())
            .count()
    }

    /// A copy of this class restricted to the properties named in `names`.
    pub fn filter_properties<S: AsRef<str>>(&self, names: &[S]) -> CodecResult<ConstClass> {
        let mut descriptor = self.to_descriptor();
        descriptor
            .properties
            .retain(|p| names.iter().any(|n| n.as_ref().eq_ignore_ascii_case(&p.name)));
        ConstClass::from_descriptor(&descriptor)
    }

    /// Materialize the owned descriptor.
    pub fn to_descriptor(&self) -> ClassDescriptor {
        ClassDescriptor {
            name: self.name().to_string(),
            superclass: self.superclass().map(str::to_string),
            qualifiers: self.qualifiers().to_vec(),
            properties: self.properties().map(|p| p.to_decl()).collect(),
            methods: self.methods().map(|m| m.to_decl()).collect(),
        }
    }
}

fn write_qualifiers(f: &mut fmt::Formatter<'_>, list: QualifierList<'_>, indent: &str) -> fmt::Result {
    if list.is_empty() {
        return Ok(());
    }
    write!(f, "{indent}[")?;
    for (i, q) in list.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(q.name())?;
        match q.value() {
            Some(CimValue::Boolean(true)) => {}
            Some(v) => write!(f, "({v})")?,
            None => f.write_str("(NULL)")?,
        }
    }
    f.write_str("]")
}

/// MOF-like rendering.
impl fmt::Display for ConstClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.qualifiers().is_empty() {
            write_qualifiers(f, self.qualifiers(), "")?;
            writeln!(f)?;
        }
        write!(f, "class {}", self.name())?;
        if let Some(parent) = self.superclass() {
            write!(f, " : {parent}")?;
        }
        writeln!(f, " {{")?;
        for p in self.properties() {
            write_qualifiers(f, p.qualifiers(), "    ")?;
            if p.qualifiers().is_empty() {
                f.write_str("    ")?;
            } else {
                f.write_str(" ")?;
            }
            match (p.data_type(), p.reference_class()) {
                (Some(dt), Some(target)) if dt.base == cim_types::CimType::Reference => {
                    write!(f, "{target} REF {}", p.name())?
                }
                (Some(dt), _) if dt.array => write!(f, "{} {}[]", dt.base, p.name())?,
                (Some(dt), _) => write!(f, "{dt} {}", p.name())?,
                (None, _) => write!(f, "? {}", p.name())?,
            }
            if let Some(v) = p.value() {
                write!(f, " = {v}")?;
            }
            writeln!(f, ";")?;
        }
        for m in self.methods() {
            let ret = m.return_type().map_or_else(|| "?".to_string(), |t| t.to_string());
            write!(f, "    {ret} {}(", m.name())?;
            for (i, param) in m.parameters().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                let ty = param.data_type().map_or_else(|| "?".to_string(), |t| t.to_string());
                write!(f, "{ty} {}", param.name())?;
            }
            writeln!(f, ");")?;
        }
        f.write_str("};")
    }
}
