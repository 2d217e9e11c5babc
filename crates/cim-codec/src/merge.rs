//! Copy-down inheritance: a subclass record carries every member of its
//! superclass so that lookups never walk the inheritance chain.

use cim_types::Qualifier;

use crate::class::ConstClass;
use crate::descriptor::{ClassDescriptor, MethodDecl, PropertyDecl};
use crate::error::CodecResult;

/// Qualifiers that never propagate regardless of their declared flavor.
const RESTRICTED: &[&str] = &["Abstract"];

/// Qualifiers of `parent` that a child element inherits, followed by the
/// child's own qualifiers. Child declarations override same-named parent ones.
fn inherit_qualifiers(parent: &[Qualifier], own: &[Qualifier]) -> Vec<Qualifier> {
    let mut merged: Vec<Qualifier> = parent
        .iter()
        .filter(|q| q.flavor.to_subclass)
        .filter(|q| !RESTRICTED.iter().any(|r| r.eq_ignore_ascii_case(&q.name)))
        .filter(|q| !own.iter().any(|o| o.name.eq_ignore_ascii_case(&q.name)))
        .map(|q| {
            let mut q = q.clone();
            q.flavor.propagated = true;
            q
        })
        .collect();
    merged.extend(own.iter().cloned());
    merged
}

/// Flatten `child` against its already-flattened `parent`.
///
/// Inherited properties keep their parent position and class origin and are
/// marked propagated. A child property with the same name as an inherited
/// one replaces it in place (origin becomes the child). New child
/// properties are appended. Methods follow the same rules.
pub fn flatten(child: &ClassDescriptor, parent: &ConstClass) -> ClassDescriptor {
    let base = parent.to_descriptor();

    let mut properties: Vec<PropertyDecl> = base
        .properties
        .iter()
        .map(|p| PropertyDecl {
            propagated: true,
            class_origin: Some(p.class_origin.clone().unwrap_or_else(|| base.name.clone())),
            qualifiers: inherit_qualifiers(&p.qualifiers, &[]),
            ..p.clone()
        })
        .collect();
    for own in &child.properties {
        let mut decl = PropertyDecl {
            propagated: false,
            class_origin: Some(child.name.clone()),
            ..own.clone()
        };
        match properties.iter().position(|p| p.name.eq_ignore_ascii_case(&own.name)) {
            Some(i) => {
                decl.qualifiers = inherit_qualifiers(&base.properties[i].qualifiers, &own.qualifiers);
                properties[i] = decl;
            }
            None => properties.push(decl),
        }
    }

    let mut methods: Vec<MethodDecl> = base
        .methods
        .iter()
        .map(|m| MethodDecl {
            propagated: true,
            class_origin: Some(m.class_origin.clone().unwrap_or_else(|| base.name.clone())),
            qualifiers: inherit_qualifiers(&m.qualifiers, &[]),
            ..m.clone()
        })
        .collect();
    for own in &child.methods {
        let mut decl = MethodDecl {
            propagated: false,
            class_origin: Some(child.name.clone()),
            ..own.clone()
        };
        match methods.iter().position(|m| m.name.eq_ignore_ascii_case(&own.name)) {
            Some(i) => {
                decl.qualifiers = inherit_qualifiers(&base.methods[i].qualifiers, &own.qualifiers);
                methods[i] = decl;
            }
            None => methods.push(decl),
        }
    }

    ClassDescriptor {
        name: child.name.clone(),
        superclass: Some(base.name.clone()),
        qualifiers: inherit_qualifiers(&base.qualifiers, &child.qualifiers),
        properties,
        methods,
    }
}

/// Flatten and encode in one step.
pub fn merge(child: &ClassDescriptor, parent: &ConstClass) -> CodecResult<ConstClass> {
    ConstClass::from_descriptor(&flatten(child, parent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_types::{CimType, CimValue, QualifierFlavor};

    fn base() -> ConstClass {
        let d = ClassDescriptor::new("CIM_Base")
            .with_qualifier(Qualifier::flag("Abstract"))
            .with_qualifier(Qualifier::new("Version", "1.0".into()))
            .with_qualifier(Qualifier::new("Local", "x".into()).with_flavor(QualifierFlavor::restricted()))
            .with_property(PropertyDecl::new("Id", CimType::String).key())
            .with_property(PropertyDecl::new("Caption", CimType::String).with_default("base"))
            .with_method(MethodDecl::new("Ping", CimType::Uint32));
        ConstClass::from_descriptor(&d).unwrap()
    }

    #[test]
    fn inherited_members_are_appended_in_parent_order() {
        let child = ClassDescriptor::new("CIM_Derived")
            .with_superclass("CIM_Base")
            .with_property(PropertyDecl::new("Extra", CimType::Uint8));
        let merged = merge(&child, &base()).unwrap();
        let names: Vec<_> = merged.properties().map(|p| p.name()).collect();
        assert_eq!(names, vec!["Id", "Caption", "Extra"]);
        assert_eq!(merged.superclass(), Some("CIM_Base"));

        let id = merged.property("Id").unwrap();
        assert!(id.is_propagated());
        assert!(id.is_key());
        assert_eq!(id.class_origin(), Some("CIM_Base"));

        let extra = merged.property("Extra").unwrap();
        assert!(!extra.is_propagated());
        assert_eq!(extra.class_origin(), Some("CIM_Derived"));

        assert_eq!(merged.method_count(), 1);
        assert!(merged.method("Ping").unwrap().is_propagated());
    }

    #[test]
    fn override_replaces_without_duplicate() {
        let child = ClassDescriptor::new("CIM_Derived")
            .with_property(PropertyDecl::new("Caption", CimType::String).with_default("derived"))
            .with_property(PropertyDecl::new("Extra", CimType::Uint8));
        let merged = merge(&child, &base()).unwrap();
        // 2 inherited + 2 own - 1 override
        assert_eq!(merged.property_count(), 3);
        let caption = merged.property("caption").unwrap();
        assert_eq!(caption.value(), Some(CimValue::String("derived".into())));
        assert!(!caption.is_propagated());
        assert_eq!(merged.property_at(1).unwrap().name(), "Caption");
    }

    #[test]
    fn override_keeps_inherited_key_qualifier() {
        let child = ClassDescriptor::new("CIM_Derived").with_property(PropertyDecl::new("Id", CimType::String));
        let merged = merge(&child, &base()).unwrap();
        assert!(merged.property("Id").unwrap().is_key());
        assert_eq!(merged.key_list(), vec!["Id"]);
    }

    #[test]
    fn qualifier_propagation_respects_flavor() {
        let child = ClassDescriptor::new("CIM_Derived").with_qualifier(Qualifier::flag("Association"));
        let merged = merge(&child, &base()).unwrap();
        assert!(!merged.is_abstract());
        assert!(merged.is_association());
        let version = merged.qualifier("Version").unwrap();
        assert!(version.flavor().propagated);
        assert!(merged.qualifier("Local").is_none());
    }

    #[test]
    fn grandchild_keeps_original_origin() {
        let mid = merge(&ClassDescriptor::new("CIM_Mid"), &base()).unwrap();
        let leaf = merge(&ClassDescriptor::new("CIM_Leaf"), &mid).unwrap();
        assert_eq!(leaf.property("Id").unwrap().class_origin(), Some("CIM_Base"));
        assert_eq!(leaf.superclass(), Some("CIM_Mid"));
    }
}
