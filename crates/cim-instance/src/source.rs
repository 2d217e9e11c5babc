//! Where instances look up their class.

use std::num::NonZeroUsize;
use std::sync::Arc;

use cim_codec::ConstClass;
use cim_registry::{ClassKey, ClassRepository, NamespaceDirectory, RegistryError};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::InstanceResult;

/// Default number of classes whose key lists [`KeyListCache`] retains.
pub const DEFAULT_KEY_CACHE_LIMIT: usize = 64;

/// Class lookup used by instance operations that need the schema.
pub trait ClassSource: Send + Sync {
    fn lookup_class(&self, namespace: Option<&str>, class_name: &str) -> InstanceResult<Arc<ConstClass>>;

    /// Names of the class's key properties, in declaration order.
    fn key_list(&self, namespace: Option<&str>, class_name: &str) -> InstanceResult<Vec<String>> {
        Ok(self.lookup_class(namespace, class_name)?.key_list())
    }
}

impl ClassSource for NamespaceDirectory {
    fn lookup_class(&self, namespace: Option<&str>, class_name: &str) -> InstanceResult<Arc<ConstClass>> {
        let namespace = namespace.ok_or_else(|| RegistryError::InvalidNamespace(String::new()))?;
        Ok(self.resolve(namespace)?.get_class(class_name)?)
    }
}

/// A single registry answers for every namespace.
impl ClassSource for Arc<dyn ClassRepository> {
    fn lookup_class(&self, _namespace: Option<&str>, class_name: &str) -> InstanceResult<Arc<ConstClass>> {
        Ok(self.get_class(class_name)?)
    }
}

/// A [`ClassSource`] that remembers key lists of recently used classes.
pub struct KeyListCache<S> {
    source: S,
    keys: Mutex<LruCache<ClassKey, Arc<[String]>>>,
}

impl<S: ClassSource> KeyListCache<S> {
    pub fn new(source: S, limit: usize) -> Self {
        let capacity = NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            keys: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_default_limit(source: S) -> Self {
        Self::new(source, DEFAULT_KEY_CACHE_LIMIT)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of classes whose key lists are held.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    pub fn clear(&self) {
        self.keys.lock().clear();
    }

    fn cache_key(namespace: Option<&str>, class_name: &str) -> ClassKey {
        ClassKey::new(&format!("{}:{class_name}", namespace.unwrap_or_default()))
    }
}

impl<S: ClassSource> ClassSource for KeyListCache<S> {
    fn lookup_class(&self, namespace: Option<&str>, class_name: &str) -> InstanceResult<Arc<ConstClass>> {
        self.source.lookup_class(namespace, class_name)
    }

    fn key_list(&self, namespace: Option<&str>, class_name: &str) -> InstanceResult<Vec<String>> {
        let key = Self::cache_key(namespace, class_name);
        if let Some(keys) = self.keys.lock().get(&key) {
            return Ok(keys.to_vec());
        }
        // The lock is not held across the lookup; a concurrent miss for the
        // same class only repeats the work.
        let keys: Arc<[String]> = self.source.key_list(namespace, class_name)?.into();
        trace!(class = class_name, keys = keys.len(), "cached key list");
        self.keys.lock().put(key, Arc::clone(&keys));
        Ok(keys.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_codec::{ClassDescriptor, PropertyDecl};
    use cim_registry::{EagerRegistry, DEFAULT_STORE_FILE};
    use cim_types::{CimType, ErrorKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        inner: Arc<dyn ClassRepository>,
        lookups: AtomicUsize,
    }

    impl ClassSource for Counting {
        fn lookup_class(&self, namespace: Option<&str>, class_name: &str) -> InstanceResult<Arc<ConstClass>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup_class(namespace, class_name)
        }
    }

    fn registry(dir: &std::path::Path) -> Arc<dyn ClassRepository> {
        let reg = EagerRegistry::open(dir, DEFAULT_STORE_FILE).unwrap();
        for name in ["CIM_A", "CIM_B", "CIM_C"] {
            reg.put_class(
                &ClassDescriptor::new(name)
                    .with_property(PropertyDecl::new("Name", CimType::String).key())
                    .with_property(PropertyDecl::new("Id", CimType::Uint32).key())
                    .with_property(PropertyDecl::new("Caption", CimType::String)),
            )
            .unwrap();
        }
        Arc::new(reg)
    }

    #[test]
    fn key_lists_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KeyListCache::new(
            Counting {
                inner: registry(dir.path()),
                lookups: AtomicUsize::new(0),
            },
            2,
        );
        assert_eq!(cache.key_list(None, "CIM_A").unwrap(), vec!["Name", "Id"]);
        assert_eq!(cache.key_list(None, "cim_a").unwrap(), vec!["Name", "Id"]);
        assert_eq!(cache.source().lookups.load(Ordering::SeqCst), 1);

        cache.key_list(None, "CIM_B").unwrap();
        cache.key_list(None, "CIM_C").unwrap();
        assert_eq!(cache.len(), 2);
        cache.key_list(None, "CIM_A").unwrap();
        assert_eq!(cache.source().lookups.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn missing_class_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = KeyListCache::with_default_limit(registry(dir.path()));
        let err = cache.key_list(None, "CIM_Missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(cache.is_empty());
    }
}
