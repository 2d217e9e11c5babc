//! Namespace name to class registry mapping, built once at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cached::CachedRegistry;
use crate::config::{BackendKind, RepositoryConfig};
use crate::eager::EagerRegistry;
use crate::error::{RegistryError, RegistryResult};
use crate::provider::ProviderTable;
use crate::repository::ClassRepository;
use crate::store::BackingStore;

/// Open the registry backend selected by `config` over the store in `dir`.
pub fn open_registry(config: &RepositoryConfig, dir: &Path) -> RegistryResult<Arc<dyn ClassRepository>> {
    Ok(match config.backend {
        BackendKind::Eager => Arc::new(EagerRegistry::open(dir, &config.store_file)?),
        BackendKind::Cached => Arc::new(CachedRegistry::open(dir, &config.store_file, config.cache_limit)?),
    })
}

/// A namespace directory whose store could not be opened.
#[derive(Clone, Debug)]
pub struct SkippedNamespace {
    pub name: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Every loadable namespace under the configured root.
///
/// The set of namespaces is fixed at construction; lookups take no lock.
pub struct NamespaceDirectory {
    root: PathBuf,
    registries: BTreeMap<String, (String, Arc<dyn ClassRepository>)>,
    skipped: Vec<SkippedNamespace>,
    providers: ProviderTable,
}

/// Relative path of `dir` under `root`, joined with `/`.
fn namespace_name(root: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn namespace_key(name: &str) -> String {
    name.trim_matches('/').to_ascii_lowercase()
}

impl NamespaceDirectory {
    /// Walk `config.root` and open a registry for every directory that holds
    /// a class store. Namespaces that fail to open are skipped with a
    /// warning; their subdirectories are still visited.
    pub fn open(config: &RepositoryConfig) -> RegistryResult<Self> {
        let root = config.root.clone();
        if !root.is_dir() {
            return Err(RegistryError::NoNamespaces(root));
        }

        let mut registries = BTreeMap::new();
        let mut skipped = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "cannot read repository directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if BackingStore::locate(entry.path(), &config.store_file).is_none() {
                continue;
            }
            let Some(name) = namespace_name(&root, entry.path()) else {
                continue;
            };

            match open_registry(config, entry.path()) {
                Ok(registry) => {
                    debug!(namespace = %name, classes = registry.len(), "loaded namespace");
                    registries.insert(namespace_key(&name), (name, registry));
                }
                Err(e) => {
                    warn!(namespace = %name, path = %entry.path().display(), error = %e, "skipping namespace");
                    skipped.push(SkippedNamespace {
                        name,
                        path: entry.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if registries.is_empty() {
            return Err(RegistryError::NoNamespaces(root));
        }
        info!(
            root = %root.display(),
            namespaces = registries.len(),
            skipped = skipped.len(),
            "namespace directory ready"
        );
        Ok(Self {
            root,
            registries,
            skipped,
            providers: config.provider_table(),
        })
    }

    /// The registry serving `namespace` (case-insensitive).
    pub fn resolve(&self, namespace: &str) -> RegistryResult<Arc<dyn ClassRepository>> {
        self.registries
            .get(&namespace_key(namespace))
            .map(|(_, registry)| Arc::clone(registry))
            .ok_or_else(|| RegistryError::InvalidNamespace(namespace.to_string()))
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.registries.contains_key(&namespace_key(namespace))
    }

    /// Loaded namespace names as found on disk, sorted case-insensitively.
    pub fn namespaces(&self) -> Vec<String> {
        self.registries.values().map(|(name, _)| name.clone()).collect()
    }

    pub fn skipped(&self) -> &[SkippedNamespace] {
        &self.skipped
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn providers(&self) -> &ProviderTable {
        &self.providers
    }

    /// Filesystem directory of a loaded namespace.
    pub fn namespace_path(&self, namespace: &str) -> RegistryResult<PathBuf> {
        let (name, _) = self
            .registries
            .get(&namespace_key(namespace))
            .ok_or_else(|| RegistryError::InvalidNamespace(namespace.to_string()))?;
        Ok(self.root.join(name))
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_STORE_FILE;
    use cim_codec::{encode_class, ClassDescriptor};
    use std::fs;

    fn seed(root: &Path, namespace: &str, classes: &[&str]) {
        let dir = root.join(namespace);
        fs::create_dir_all(&dir).unwrap();
        let store = BackingStore::locate_or_new(&dir, DEFAULT_STORE_FILE);
        for name in classes {
            store.append(&encode_class(&ClassDescriptor::new(*name)).unwrap()).unwrap();
        }
    }

    #[test]
    fn discovers_nested_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "root/cimv2", &["CIM_A"]);
        seed(dir.path(), "root/interop", &["CIM_B", "CIM_C"]);
        seed(dir.path(), "root", &["__Namespace"]);
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let directory = NamespaceDirectory::open(&RepositoryConfig::with_root(dir.path())).unwrap();
        assert_eq!(directory.namespaces(), vec!["root", "root/cimv2", "root/interop"]);
        assert!(directory.contains("ROOT/CIMV2"));
        assert!(!directory.contains("empty"));
        assert_eq!(directory.resolve("root/interop").unwrap().len(), 2);
        assert!(matches!(
            directory.resolve("root/missing"),
            Err(RegistryError::InvalidNamespace(_))
        ));
        assert_eq!(
            directory.namespace_path("Root/CimV2").unwrap(),
            dir.path().join("root/cimv2")
        );
    }

    #[test]
    fn corrupt_namespace_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "root/good", &["CIM_A"]);
        seed(dir.path(), "root/bad", &["CIM_X", "CIM_Y"]);
        let store = dir.path().join("root/bad").join(DEFAULT_STORE_FILE);
        let mut bytes = fs::read(&store).unwrap();
        bytes.truncate(bytes.len() - 4);
        fs::write(&store, bytes).unwrap();

        let directory = NamespaceDirectory::open(&RepositoryConfig::with_root(dir.path())).unwrap();
        assert_eq!(directory.namespaces(), vec!["root/good"]);
        assert_eq!(directory.skipped().len(), 1);
        assert_eq!(directory.skipped()[0].name, "root/bad");
        assert!(directory.resolve("root/bad").is_err());
    }

    #[test]
    fn nothing_loadable_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "root/bad", &["CIM_X"]);
        let store = dir.path().join("root/bad").join(DEFAULT_STORE_FILE);
        fs::write(&store, [0xffu8; 5]).unwrap();

        assert!(matches!(
            NamespaceDirectory::open(&RepositoryConfig::with_root(dir.path())),
            Err(RegistryError::NoNamespaces(_))
        ));
        assert!(matches!(
            NamespaceDirectory::open(&RepositoryConfig::with_root(dir.path().join("absent"))),
            Err(RegistryError::NoNamespaces(_))
        ));
    }

    #[test]
    fn backend_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "root/cimv2", &["CIM_A", "CIM_B"]);
        let config = RepositoryConfig {
            backend: BackendKind::Cached,
            cache_limit: 1,
            ..RepositoryConfig::with_root(dir.path())
        };
        let directory = NamespaceDirectory::open(&config).unwrap();
        let registry = directory.resolve("root/cimv2").unwrap();
        assert_eq!(registry.get_class("cim_b").unwrap().name(), "CIM_B");
        assert_eq!(registry.class_names(), vec!["CIM_A", "CIM_B"]);
    }
}
