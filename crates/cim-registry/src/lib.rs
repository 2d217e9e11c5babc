//! Namespace-scoped CIM class registry.
//!
//! Each namespace is a directory holding an append-only class store
//! (`classSchemas`, or `classSchemas.zst` read-only). A registry indexes the
//! store by class name and inheritance, flattens new subclasses against their
//! parent, and serves shared, immutable [`cim_codec::ConstClass`] snapshots.
//!
//! # Backends
//!
//! - [`EagerRegistry`]: decodes every class at open
//! - [`CachedRegistry`]: indexes record positions and decodes on demand
//!   through a bounded LRU cache
//!
//! Both implement [`ClassRepository`]; [`RepositoryConfig::backend`] selects
//! one. [`NamespaceDirectory`] maps namespace names to registries.

pub mod cached;
pub mod config;
pub mod directory;
pub mod eager;
pub mod error;
pub mod provider;
pub mod repository;
pub mod store;
pub mod tree;

pub use cached::CachedRegistry;
pub use config::{BackendKind, RepositoryConfig};
pub use directory::{open_registry, NamespaceDirectory, SkippedNamespace};
pub use eager::EagerRegistry;
pub use error::{RegistryError, RegistryResult};
pub use provider::{ProviderEntry, ProviderKind, ProviderTable};
pub use repository::ClassRepository;
pub use store::{BackingStore, StoreFormat, DEFAULT_STORE_FILE, TOMBSTONE_PREFIX};
pub use tree::{ClassKey, ClassTree, EnumerateOptions};

#[cfg(test)]
mod tests {
    use super::*;
    use cim_codec::{ClassDescriptor, PropertyDecl};
    use cim_types::{CimType, ErrorKind, Qualifier};
    use std::path::Path;

    fn backends(dir: &Path) -> Vec<Box<dyn ClassRepository>> {
        let eager_dir = dir.join("eager");
        let cached_dir = dir.join("cached");
        std::fs::create_dir_all(&eager_dir).unwrap();
        std::fs::create_dir_all(&cached_dir).unwrap();
        vec![
            Box::new(EagerRegistry::open(&eager_dir, DEFAULT_STORE_FILE).unwrap()),
            Box::new(CachedRegistry::open(&cached_dir, DEFAULT_STORE_FILE, 2).unwrap()),
        ]
    }

    fn abc(reg: &dyn ClassRepository) {
        reg.put_class(&ClassDescriptor::new("A").with_property(PropertyDecl::new("Id", CimType::String).key()))
            .unwrap();
        reg.put_class(&ClassDescriptor::new("B").with_superclass("A")).unwrap();
        reg.put_class(&ClassDescriptor::new("C").with_superclass("B")).unwrap();
    }

    // ----------------------------------------------------------------
    // Shared behavior of both backends
    // ----------------------------------------------------------------

    #[test]
    fn inheritance_chain_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        for reg in backends(dir.path()) {
            let reg = reg.as_ref();
            abc(reg);
            assert_eq!(reg.enumerate_names(Some("A"), EnumerateOptions::deep()).unwrap(), vec!["B", "C"]);
            assert_eq!(reg.enumerate_names(Some("A"), EnumerateOptions::shallow()).unwrap(), vec!["B"]);

            let err = reg.remove_class("A").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ClassHasChildren);

            reg.remove_class("C").unwrap();
            reg.remove_class("B").unwrap();
            reg.remove_class("A").unwrap();
            assert!(reg.is_empty());
        }
    }

    #[test]
    fn error_kinds() {
        let dir = tempfile::tempdir().unwrap();
        for reg in backends(dir.path()) {
            let reg = reg.as_ref();
            abc(reg);
            let missing_parent = reg
                .put_class(&ClassDescriptor::new("D").with_superclass("Nope"))
                .unwrap_err();
            assert_eq!(missing_parent.kind(), ErrorKind::InvalidSuperclass);
            assert_eq!(
                reg.put_class(&ClassDescriptor::new("b")).unwrap_err().kind(),
                ErrorKind::AlreadyExists
            );
            assert_eq!(reg.get_class("Z").unwrap_err().kind(), ErrorKind::NotFound);
            assert_eq!(reg.children("Z").unwrap_err().kind(), ErrorKind::NotFound);
            assert!(reg.children("C").unwrap().is_empty());
        }
    }

    #[test]
    fn descendants_and_ancestry() {
        let dir = tempfile::tempdir().unwrap();
        for reg in backends(dir.path()) {
            let reg = reg.as_ref();
            abc(reg);
            assert!(reg.is_descendant("C", "a").unwrap());
            assert!(reg.is_descendant("B", "B").unwrap());
            assert!(!reg.is_descendant("A", "C").unwrap());
            assert_eq!(reg.descendant_names("A").unwrap(), vec!["B", "C"]);
            assert_eq!(reg.superclass_of("C").unwrap().as_deref(), Some("B"));
            assert_eq!(reg.get_class("C").unwrap().key_list(), vec!["Id"]);
        }
    }

    #[test]
    fn associations_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        for reg in backends(dir.path()) {
            let reg = reg.as_ref();
            reg.put_class(&ClassDescriptor::new("CIM_Dependency").with_qualifier(Qualifier::flag("Association")))
                .unwrap();
            reg.put_class(&ClassDescriptor::new("CIM_HostedService").with_superclass("CIM_Dependency"))
                .unwrap();
            reg.put_class(&ClassDescriptor::new("CIM_System")).unwrap();

            assert_eq!(reg.association_count(), 2);
            assert_eq!(reg.top_level_association_count(), 1);
            assert_eq!(reg.top_level_associations().unwrap(), vec!["CIM_Dependency"]);
            assert!(reg.is_association("cim_hostedservice"));
            let all = reg
                .enumerate_classes(None, EnumerateOptions::deep().associations())
                .unwrap();
            assert_eq!(all.len(), 2);
        }
    }

    #[test]
    fn filtered_class_keeps_requested_properties() {
        let dir = tempfile::tempdir().unwrap();
        for reg in backends(dir.path()) {
            let reg = reg.as_ref();
            reg.put_class(
                &ClassDescriptor::new("CIM_Disk")
                    .with_property(PropertyDecl::new("DeviceID", CimType::String).key())
                    .with_property(PropertyDecl::new("Size", CimType::Uint64))
                    .with_property(PropertyDecl::new("Caption", CimType::String)),
            )
            .unwrap();
            let filtered = reg.get_class_filtered("CIM_Disk", &["size"]).unwrap();
            let names: Vec<_> = filtered.properties().map(|p| p.name().to_string()).collect();
            assert_eq!(names, vec!["Size"]);
        }
    }

    #[test]
    fn instance_candidates_skip_abstract_and_provided() {
        let dir = tempfile::tempdir().unwrap();
        let providers = ProviderTable::from_entries([ProviderEntry::new(
            "CIM_Process",
            "ProcessProvider",
            &[ProviderKind::Instance],
        )]);
        for reg in backends(dir.path()) {
            let reg = reg.as_ref();
            reg.put_class(&ClassDescriptor::new("CIM_ManagedElement").with_qualifier(Qualifier::flag("Abstract")))
                .unwrap();
            for (name, parent) in [
                ("CIM_Process", "CIM_ManagedElement"),
                ("Linux_Process", "CIM_Process"),
                ("CIM_IndicationFilter", "CIM_ManagedElement"),
                ("CIM_Namespace", "CIM_ManagedElement"),
            ] {
                reg.put_class(&ClassDescriptor::new(name).with_superclass(parent))
                    .unwrap();
            }
            assert_eq!(
                reg.instance_candidates("CIM_ManagedElement", &providers).unwrap(),
                vec!["CIM_Namespace"]
            );
            assert_eq!(
                reg.instance_candidates("CIM_Namespace", &ProviderTable::new()).unwrap(),
                vec!["CIM_Namespace"]
            );
        }
    }

    #[test]
    fn compressed_store_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = EagerRegistry::open(dir.path(), DEFAULT_STORE_FILE).unwrap();
            reg.put_class(&ClassDescriptor::new("CIM_A")).unwrap();
            reg.store().compress().unwrap();
            std::fs::remove_file(reg.store().path()).unwrap();
        }
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 4).unwrap();
        assert_eq!(reg.store().format(), StoreFormat::Compressed);
        assert_eq!(reg.get_class("CIM_A").unwrap().name(), "CIM_A");
        let err = reg.put_class(&ClassDescriptor::new("CIM_B")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        assert!(!reg.contains("CIM_B"));
        assert_eq!(reg.remove_class("CIM_A").unwrap_err().kind(), ErrorKind::ReadOnly);
        assert!(reg.contains("CIM_A"));
    }

    #[test]
    fn tombstoned_records_are_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::locate_or_new(dir.path(), DEFAULT_STORE_FILE);
        let tombstone = format!("{TOMBSTONE_PREFIX}CIM_Old");
        for name in [tombstone.as_str(), "CIM_New"] {
            store
                .append(&cim_codec::encode_class(&ClassDescriptor::new(name)).unwrap())
                .unwrap();
        }
        let eager = EagerRegistry::open(dir.path(), DEFAULT_STORE_FILE).unwrap();
        let cached = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 1).unwrap();
        assert_eq!(eager.class_names(), vec!["CIM_New"]);
        assert_eq!(cached.class_names(), vec!["CIM_New"]);
        assert_eq!(cached.get_class("CIM_New").unwrap().name(), "CIM_New");
    }

    #[test]
    fn removing_duplicated_class_drops_every_record() {
        type Opener = fn(&Path) -> Box<dyn ClassRepository>;
        let openers: [Opener; 2] = [
            |dir| Box::new(EagerRegistry::open(dir, DEFAULT_STORE_FILE).unwrap()),
            |dir| Box::new(CachedRegistry::open(dir, DEFAULT_STORE_FILE, 1).unwrap()),
        ];
        for open in openers {
            let dir = tempfile::tempdir().unwrap();
            let store = BackingStore::locate_or_new(dir.path(), DEFAULT_STORE_FILE);
            let first = ClassDescriptor::new("Dup");
            let later = ClassDescriptor::new("Dup").with_property(PropertyDecl::new("Extra", CimType::Uint8));
            for class in [&first, &ClassDescriptor::new("Other"), &later, &ClassDescriptor::new("Last")] {
                store.append(&cim_codec::encode_class(class).unwrap()).unwrap();
            }

            let reg = open(dir.path());
            assert_eq!(reg.len(), 3);
            assert!(reg.get_class("Dup").unwrap().property("Extra").is_some());
            reg.remove_class("dup").unwrap();
            assert!(!reg.contains("Dup"));
            assert_eq!(reg.get_class("Other").unwrap().name(), "Other");
            assert_eq!(reg.get_class("Last").unwrap().name(), "Last");
            drop(reg);

            let reopened = open(dir.path());
            assert!(!reopened.contains("Dup"));
            assert_eq!(reopened.class_names().len(), 2);
            assert_eq!(reopened.get_class("Last").unwrap().name(), "Last");
        }
    }
}
