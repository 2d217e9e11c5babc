//! Owned descriptors: the mutable, heap-allocated form of classes and
//! instances that callers build and that encoded records materialize into.

use cim_types::{CimType, CimValue, DataType, Qualifier};
use serde::{Deserialize, Serialize};

/// An owned class definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    pub superclass: Option<String>,
    pub qualifiers: Vec<Qualifier>,
    pub properties: Vec<PropertyDecl>,
    pub methods: Vec<MethodDecl>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            qualifiers: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    pub fn with_property(mut self, property: PropertyDecl) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn has_flag(&self, qualifier: &str) -> bool {
        self.qualifiers.iter().any(|q| q.is_true(qualifier))
    }
}

/// A property declaration, optionally with a default value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub data_type: DataType,
    pub value: Option<CimValue>,
    pub qualifiers: Vec<Qualifier>,
    /// Class that first declared the property.
    pub class_origin: Option<String>,
    /// True when copied down from a superclass.
    pub propagated: bool,
    /// Target class of a reference property.
    pub reference_class: Option<String>,
}

impl PropertyDecl {
    pub fn new(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            value: None,
            qualifiers: Vec::new(),
            class_origin: None,
            propagated: false,
            reference_class: None,
        }
    }

    /// A reference property pointing at instances of `class`.
    pub fn reference(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            reference_class: Some(class.into()),
            ..Self::new(name, CimType::Reference)
        }
    }

    pub fn with_default(mut self, value: impl Into<CimValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }

    /// Mark the property as a key.
    pub fn key(self) -> Self {
        self.with_qualifier(Qualifier::flag("Key"))
    }

    pub fn is_key(&self) -> bool {
        self.qualifiers.iter().any(|q| q.is_true("Key"))
    }
}

/// A method declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub return_type: DataType,
    pub qualifiers: Vec<Qualifier>,
    pub parameters: Vec<ParameterDecl>,
    pub class_origin: Option<String>,
    pub propagated: bool,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>, return_type: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            qualifiers: Vec::new(),
            parameters: Vec::new(),
            class_origin: None,
            propagated: false,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterDecl) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }
}

/// A method parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    pub data_type: DataType,
    pub qualifiers: Vec<Qualifier>,
    pub reference_class: Option<String>,
}

impl ParameterDecl {
    pub fn new(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            qualifiers: Vec::new(),
            reference_class: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.push(qualifier);
        self
    }
}

/// An owned instance: class name, namespace, and property values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub namespace: Option<String>,
    pub class_name: String,
    pub properties: Vec<InstanceProperty>,
}

impl InstanceDescriptor {
    pub fn new(namespace: Option<&str>, class_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            class_name: class_name.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: InstanceProperty) -> Self {
        self.properties.push(property);
        self
    }
}

/// One property value of an instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceProperty {
    pub name: String,
    pub data_type: DataType,
    pub value: Option<CimValue>,
    pub key: bool,
}

impl InstanceProperty {
    pub fn new(name: impl Into<String>, value: CimValue) -> Self {
        Self {
            name: name.into(),
            data_type: value.data_type(),
            value: Some(value),
            key: false,
        }
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }
}
