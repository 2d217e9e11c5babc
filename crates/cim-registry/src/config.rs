use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::provider::{ProviderEntry, ProviderTable};
use crate::store::DEFAULT_STORE_FILE;

/// Which registry implementation serves each namespace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Decode every class at open and keep it resident.
    #[default]
    Eager,
    /// Index positions at open and decode on demand through an LRU cache.
    Cached,
}

/// Repository configuration, usually loaded from a TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Directory whose subdirectories are namespaces.
    pub root: PathBuf,
    pub backend: BackendKind,
    /// File name of the class store inside each namespace directory.
    pub store_file: String,
    /// Decoded classes kept per namespace by the cached backend.
    pub cache_limit: usize,
    /// Classes whose key lists are cached by the instance layer.
    pub key_cache_limit: usize,
    pub providers: Vec<ProviderEntry>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/cimrepo/repository"),
            backend: BackendKind::Eager,
            store_file: DEFAULT_STORE_FILE.to_string(),
            cache_limit: 10,
            key_cache_limit: 64,
            providers: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Default configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> RegistryResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> RegistryResult<Self> {
        toml::from_str(text).map_err(|e| RegistryError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> RegistryResult<String> {
        toml::to_string_pretty(self).map_err(|e| RegistryError::Config(e.to_string()))
    }

    pub fn provider_table(&self) -> ProviderTable {
        ProviderTable::from_entries(self.providers.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;

    #[test]
    fn default_config() {
        let c = RepositoryConfig::default();
        assert_eq!(c.backend, BackendKind::Eager);
        assert_eq!(c.store_file, "classSchemas");
        assert_eq!(c.cache_limit, 10);
        assert_eq!(c.key_cache_limit, 64);
        assert!(c.providers.is_empty());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = RepositoryConfig::from_toml(
            r#"
            root = "/tmp/repo"
            backend = "cached"
            cache_limit = 3

            [[providers]]
            class = "CIM_Process"
            provider = "ProcessProvider"
            kinds = ["instance", "method"]
            "#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/tmp/repo"));
        assert_eq!(c.backend, BackendKind::Cached);
        assert_eq!(c.cache_limit, 3);
        assert_eq!(c.store_file, "classSchemas");
        assert!(c.provider_table().has_kind("cim_process", ProviderKind::Instance));
    }

    #[test]
    fn toml_roundtrip() {
        let c = RepositoryConfig::with_root("/srv/cim");
        let back = RepositoryConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn bad_backend_rejected() {
        let err = RepositoryConfig::from_toml(r#"backend = "mmap""#).unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cimrepo.toml");
        std::fs::write(&path, "store_file = \"schemas\"\n").unwrap();
        assert_eq!(RepositoryConfig::load(&path).unwrap().store_file, "schemas");
    }
}
