use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::value::{write_quoted, CimValue};

/// One `name=value` pair of an object path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyBinding {
    pub name: String,
    pub value: CimValue,
}

/// Identity of an instance: namespace, class name, and its key bindings.
///
/// Renders as `root/cimv2:CIM_Foo.Name="x",Id=5`. Class and key names compare
/// case-insensitively and key order is not significant.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObjectPath {
    pub namespace: Option<String>,
    pub class_name: String,
    pub keys: Vec<KeyBinding>,
}

impl ObjectPath {
    pub fn new(namespace: Option<&str>, class_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            class_name: class_name.into(),
            keys: Vec::new(),
        }
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<CimValue>) -> Self {
        self.add_key(name, value);
        self
    }

    /// Add or replace a key binding.
    pub fn add_key(&mut self, name: impl Into<String>, value: impl Into<CimValue>) {
        let name = name.into();
        let value = value.into();
        match self.keys.iter_mut().find(|k| k.name.eq_ignore_ascii_case(&name)) {
            Some(existing) => existing.value = value,
            None => self.keys.push(KeyBinding { name, value }),
        }
    }

    pub fn key(&self, name: &str) -> Option<&CimValue> {
        self.keys
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(name))
            .map(|k| &k.value)
    }

    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.name.as_str())
    }

    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty()
    }
}

impl PartialEq for ObjectPath {
    fn eq(&self, other: &Self) -> bool {
        let ns_eq = match (&self.namespace, &other.namespace) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        };
        ns_eq
            && self.class_name.eq_ignore_ascii_case(&other.class_name)
            && self.keys.len() == other.keys.len()
            && self
                .keys
                .iter()
                .all(|k| other.key(&k.name) == Some(&k.value))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{ns}:")?;
        }
        f.write_str(&self.class_name)?;
        for (i, key) in self.keys.iter().enumerate() {
            f.write_str(if i == 0 { "." } else { "," })?;
            write!(f, "{}=", key.name)?;
            match &key.value {
                CimValue::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" })?,
                CimValue::String(s) | CimValue::DateTime(s) => write_quoted(f, s)?,
                CimValue::Reference(p) => write_quoted(f, &p.to_string())?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

/// Parses the rendered form.
///
/// Key values carry no type information in the text form: quoted values parse
/// as strings, `TRUE`/`FALSE` as booleans, integers as `sint64` when negative
/// and `uint64` otherwise, anything else numeric as `real64`.
impl FromStr for ObjectPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TypeError::InvalidPath {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let head_end = s.find('.').unwrap_or(s.len());
        let (namespace, class_start) = match s[..head_end].find(':') {
            Some(colon) => (Some(s[..colon].to_string()), colon + 1),
            None => (None, 0),
        };
        let class_name = &s[class_start..head_end];
        if class_name.is_empty() {
            return Err(invalid("missing class name"));
        }

        let mut path = ObjectPath {
            namespace,
            class_name: class_name.to_string(),
            keys: Vec::new(),
        };
        if head_end == s.len() {
            return Ok(path);
        }

        let mut rest = &s[head_end + 1..];
        while !rest.is_empty() {
            let eq = rest.find('=').ok_or_else(|| invalid("key binding without `=`"))?;
            let name = rest[..eq].trim();
            if name.is_empty() {
                return Err(invalid("empty key name"));
            }
            rest = &rest[eq + 1..];

            let (value, consumed) = if let Some(quoted) = rest.strip_prefix('"') {
                let (text, used) = read_quoted(quoted).ok_or_else(|| invalid("unterminated string"))?;
                (CimValue::String(text), used + 1)
            } else {
                let end = rest.find(',').unwrap_or(rest.len());
                let literal = rest[..end].trim();
                (parse_literal(literal).ok_or_else(|| invalid("bad key value"))?, end)
            };
            path.keys.push(KeyBinding {
                name: name.to_string(),
                value,
            });

            rest = &rest[consumed..];
            match rest.strip_prefix(',') {
                Some(next) => rest = next,
                None if rest.is_empty() => {}
                None => return Err(invalid("expected `,` between key bindings")),
            }
        }
        Ok(path)
    }
}

/// Read up to the closing quote; returns the unescaped text and the number of
/// bytes consumed including the closing quote.
fn read_quoted(s: &str) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(escaped);
            }
            '"' => return Some((out, i + 1)),
            c => out.push(c),
        }
    }
    None
}

fn parse_literal(literal: &str) -> Option<CimValue> {
    if literal.eq_ignore_ascii_case("true") {
        return Some(CimValue::Boolean(true));
    }
    if literal.eq_ignore_ascii_case("false") {
        return Some(CimValue::Boolean(false));
    }
    if literal.starts_with('-') {
        if let Ok(v) = literal.parse::<i64>() {
            return Some(CimValue::Sint64(v));
        }
    } else if let Ok(v) = literal.parse::<u64>() {
        return Some(CimValue::Uint64(v));
    }
    literal.parse::<f64>().ok().map(CimValue::Real64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_full_path() {
        let p = ObjectPath::new(Some("root/cimv2"), "CIM_Foo")
            .with_key("Name", "x")
            .with_key("Id", CimValue::Uint64(5));
        assert_eq!(p.to_string(), r#"root/cimv2:CIM_Foo.Name="x",Id=5"#);
    }

    #[test]
    fn parse_roundtrip() {
        let text = r#"root/cimv2:CIM_Foo.Name="a,\"b\"",Id=5,Neg=-2,On=TRUE"#;
        let p: ObjectPath = text.parse().unwrap();
        assert_eq!(p.namespace.as_deref(), Some("root/cimv2"));
        assert_eq!(p.class_name, "CIM_Foo");
        assert_eq!(p.key("name"), Some(&CimValue::String(r#"a,"b""#.into())));
        assert_eq!(p.key("Id"), Some(&CimValue::Uint64(5)));
        assert_eq!(p.key("Neg"), Some(&CimValue::Sint64(-2)));
        assert_eq!(p.key("On"), Some(&CimValue::Boolean(true)));
        assert_eq!(p.to_string().parse::<ObjectPath>().unwrap(), p);
    }

    #[test]
    fn parse_class_only() {
        let p: ObjectPath = "CIM_Foo".parse().unwrap();
        assert!(p.namespace.is_none());
        assert!(!p.has_keys());
    }

    #[test]
    fn parse_errors() {
        assert!("".parse::<ObjectPath>().is_err());
        assert!("ns:.A=1".parse::<ObjectPath>().is_err());
        assert!(r#"C.A="open"#.parse::<ObjectPath>().is_err());
        assert!(r#"C.A="x"B=1"#.parse::<ObjectPath>().is_err());
        assert!("C.A".parse::<ObjectPath>().is_err());
    }

    #[test]
    fn equality_ignores_case_and_key_order() {
        let a = ObjectPath::new(None, "cim_foo").with_key("A", 1u32).with_key("B", "x");
        let b = ObjectPath::new(None, "CIM_Foo").with_key("b", "x").with_key("a", 1u32);
        assert_eq!(a, b);
        let c = ObjectPath::new(None, "CIM_Foo").with_key("a", 2u32).with_key("b", "x");
        assert_ne!(a, c);
    }

    #[test]
    fn add_key_replaces() {
        let mut p = ObjectPath::new(None, "C").with_key("Id", 1u32);
        p.add_key("ID", 2u32);
        assert_eq!(p.keys.len(), 1);
        assert_eq!(p.key("id"), Some(&CimValue::Uint32(2)));
    }
}
