//! Registry backend that keeps only record positions in memory and decodes
//! classes on demand through a bounded LRU cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use cim_codec::{merge, ClassDescriptor, ConstClass, VersionRecord};
use lru::LruCache;
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::repository::ClassRepository;
use crate::store::BackingStore;
use crate::tree::{ClassKey, ClassTree, EnumerateOptions};

#[derive(Clone, Copy, Debug)]
struct Record {
    position: u64,
    length: u32,
}

struct State {
    records: HashMap<ClassKey, Record>,
    tree: ClassTree,
    version: Option<VersionRecord>,
    cache: LruCache<ClassKey, Arc<ConstClass>>,
}

impl State {
    fn record(&self, name: &str) -> RegistryResult<Record> {
        self.records
            .get(&ClassKey::new(name))
            .copied()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Cached lookup that refreshes recency, loading on a miss.
    fn fetch(&mut self, store: &BackingStore, name: &str) -> RegistryResult<Arc<ConstClass>> {
        let record = self.record(name)?;
        let key = ClassKey::new(name);
        if let Some(class) = self.cache.get(&key) {
            return Ok(Arc::clone(class));
        }
        let class = Arc::new(store.load_class(record.position, record.length)?);
        self.insert_cached(key, Arc::clone(&class));
        Ok(class)
    }

    /// Lookup that leaves recency untouched and never fills the cache.
    fn peek(&self, store: &BackingStore, name: &str) -> RegistryResult<Arc<ConstClass>> {
        let record = self.record(name)?;
        match self.cache.peek(&ClassKey::new(name)) {
            Some(class) => Ok(Arc::clone(class)),
            None => Ok(Arc::new(store.load_class(record.position, record.length)?)),
        }
    }

    fn insert_cached(&mut self, key: ClassKey, class: Arc<ConstClass>) {
        if let Some((evicted, _)) = self.cache.push(key.clone(), class) {
            if evicted != key {
                trace!(class = evicted.as_str(), "evicted class from cache");
            }
        }
    }
}

/// Class registry that decodes classes lazily.
///
/// At most `cache_limit` decoded classes are held at once. Lookups through
/// [`ClassRepository::get_class`] update recency and therefore take the
/// exclusive lock; enumeration only peeks at the cache.
pub struct CachedRegistry {
    store: BackingStore,
    state: RwLock<State>,
}

impl CachedRegistry {
    /// Open the registry stored in `dir`. Every record is decoded once to
    /// validate the store and build the indexes, then dropped.
    pub fn open(dir: &Path, store_file: &str, cache_limit: usize) -> RegistryResult<Self> {
        let store = BackingStore::locate_or_new(dir, store_file);
        let capacity = NonZeroUsize::new(cache_limit).unwrap_or(NonZeroUsize::MIN);
        let mut records: HashMap<ClassKey, Record> = HashMap::new();
        let mut tree = ClassTree::new();
        let mut version = None;

        if store.exists() {
            let summary = store.scan(|rec| {
                let class = &rec.class;
                let key = ClassKey::new(class.name());
                if records.contains_key(&key) {
                    warn!(class = class.name(), position = rec.position, "duplicate class record, keeping the later one");
                    tree.remove(class.name());
                }
                tree.insert(class.name(), class.superclass(), class.is_association());
                records.insert(
                    key,
                    Record {
                        position: rec.position,
                        length: rec.length,
                    },
                );
                Ok(())
            })?;
            version = summary.version;
        }
        info!(
            path = %store.path().display(),
            classes = records.len(),
            cache_limit = capacity.get(),
            "opened cached class registry"
        );
        Ok(Self {
            store,
            state: RwLock::new(State {
                records,
                tree,
                version,
                cache: LruCache::new(capacity),
            }),
        })
    }

    pub fn store(&self) -> &BackingStore {
        &self.store
    }

    pub fn cache_limit(&self) -> usize {
        self.state.read().cache.cap().get()
    }

    /// Number of decoded classes currently held.
    pub fn cached_count(&self) -> usize {
        self.state.read().cache.len()
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.state.read().cache.contains(&ClassKey::new(name))
    }

    /// Cached class names, most recently used first.
    pub fn cached_names(&self) -> Vec<String> {
        self.state
            .read()
            .cache
            .iter()
            .map(|(_, class)| class.name().to_string())
            .collect()
    }
}

impl ClassRepository for CachedRegistry {
    fn get_class(&self, name: &str) -> RegistryResult<Arc<ConstClass>> {
        self.state.write().fetch(&self.store, name)
    }

    fn put_class(&self, class: &ClassDescriptor) -> RegistryResult<()> {
        let mut state = self.state.write();
        if state.tree.contains(&class.name) {
            return Err(RegistryError::AlreadyExists(class.name.clone()));
        }
        let merged = match &class.superclass {
            Some(parent) => {
                if !state.tree.contains(parent) {
                    return Err(RegistryError::InvalidSuperclass {
                        class: class.name.clone(),
                        superclass: parent.clone(),
                    });
                }
                let parent_class = state.fetch(&self.store, parent)?;
                merge(class, &parent_class)?
            }
            None => ConstClass::from_descriptor(class)?,
        };

        let appended = self.store.append(merged.as_bytes())?;
        if appended.created {
            state.version = Some(VersionRecord::current());
        }
        let length = merged.serialized_size() as u32;
        let key = ClassKey::new(merged.name());
        state
            .tree
            .insert(merged.name(), merged.superclass(), merged.is_association());
        state.records.insert(
            key.clone(),
            Record {
                position: appended.position,
                length,
            },
        );
        debug!(class = merged.name(), position = appended.position, length, "registered class");
        state.insert_cached(key, Arc::new(merged));
        Ok(())
    }

    fn remove_class(&self, name: &str) -> RegistryResult<()> {
        let mut state = self.state.write();
        let record = state.record(name)?;
        let canonical = state.tree.canonical_name(name).unwrap_or(name).to_string();
        if state.tree.has_children(name) {
            return Err(RegistryError::ClassHasChildren(canonical));
        }

        let removed = self.store.remove_class_records(name)?;
        let key = ClassKey::new(name);
        state.tree.remove(name);
        state.records.remove(&key);
        state.cache.pop(&key);
        for (key, (position, length)) in self.store.record_positions()? {
            if let Some(record) = state.records.get_mut(&key) {
                record.position = position;
                record.length = length;
            }
        }
        debug!(class = %canonical, position = record.position, removed, "removed class");
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.state.read().tree.contains(name)
    }

    fn superclass_of(&self, name: &str) -> RegistryResult<Option<String>> {
        let state = self.state.read();
        Ok(state.tree.parent(name)?.map(str::to_string))
    }

    fn children(&self, name: &str) -> RegistryResult<Vec<String>> {
        let state = self.state.read();
        if !state.tree.contains(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        Ok(state.tree.children(name).to_vec())
    }

    fn class_names(&self) -> Vec<String> {
        self.state.read().tree.names()
    }

    fn len(&self) -> usize {
        self.state.read().records.len()
    }

    fn is_association(&self, name: &str) -> bool {
        self.state.read().tree.is_association(name)
    }

    fn version(&self) -> Option<VersionRecord> {
        self.state.read().version
    }

    fn association_count(&self) -> usize {
        self.state.read().tree.association_count()
    }

    fn top_level_association_count(&self) -> usize {
        self.state.read().tree.top_level_association_count()
    }

    fn enumerate_names(&self, scope: Option<&str>, options: EnumerateOptions) -> RegistryResult<Vec<String>> {
        self.state.read().tree.enumerate(scope, options)
    }

    fn enumerate_classes(
        &self,
        scope: Option<&str>,
        options: EnumerateOptions,
    ) -> RegistryResult<Vec<Arc<ConstClass>>> {
        let state = self.state.read();
        state
            .tree
            .enumerate(scope, options)?
            .iter()
            .map(|name| state.peek(&self.store, name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_STORE_FILE;

    fn populated(dir: &Path, count: usize) {
        let reg = CachedRegistry::open(dir, DEFAULT_STORE_FILE, 2).unwrap();
        reg.put_class(&ClassDescriptor::new("Root")).unwrap();
        for i in 0..count {
            reg.put_class(&ClassDescriptor::new(format!("Leaf{i}")).with_superclass("Root"))
                .unwrap();
        }
    }

    // ----------------------------------------------------------------
    // Cache bound
    // ----------------------------------------------------------------

    #[test]
    fn opening_leaves_cache_empty() {
        let dir = tempfile::tempdir().unwrap();
        populated(dir.path(), 5);
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 3).unwrap();
        assert_eq!(reg.len(), 6);
        assert_eq!(reg.cached_count(), 0);
    }

    #[test]
    fn cache_never_exceeds_limit() {
        let dir = tempfile::tempdir().unwrap();
        populated(dir.path(), 8);
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 3).unwrap();
        for i in 0..8 {
            let class = reg.get_class(&format!("leaf{i}")).unwrap();
            assert_eq!(class.name(), format!("Leaf{i}"));
            assert!(reg.cached_count() <= 3);
        }
        assert_eq!(reg.cached_names(), vec!["Leaf7", "Leaf6", "Leaf5"]);
        assert!(!reg.is_cached("Leaf0"));
    }

    #[test]
    fn get_refreshes_recency() {
        let dir = tempfile::tempdir().unwrap();
        populated(dir.path(), 3);
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 2).unwrap();
        reg.get_class("Leaf0").unwrap();
        reg.get_class("Leaf1").unwrap();
        reg.get_class("Leaf0").unwrap();
        reg.get_class("Leaf2").unwrap();
        assert!(reg.is_cached("Leaf0"));
        assert!(!reg.is_cached("Leaf1"));
    }

    #[test]
    fn enumeration_does_not_fill_cache() {
        let dir = tempfile::tempdir().unwrap();
        populated(dir.path(), 4);
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 2).unwrap();
        reg.get_class("Leaf3").unwrap();
        let classes = reg.enumerate_classes(Some("Root"), EnumerateOptions::deep()).unwrap();
        let names: Vec<_> = classes.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["Leaf3", "Leaf2", "Leaf1", "Leaf0"]);
        assert_eq!(reg.cached_names(), vec!["Leaf3"]);
    }

    #[test]
    fn zero_limit_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 0).unwrap();
        assert_eq!(reg.cache_limit(), 1);
    }

    // ----------------------------------------------------------------
    // Mutation
    // ----------------------------------------------------------------

    #[test]
    fn put_loads_evicted_parent() {
        let dir = tempfile::tempdir().unwrap();
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 1).unwrap();
        reg.put_class(&ClassDescriptor::new("Base")).unwrap();
        reg.put_class(&ClassDescriptor::new("Other")).unwrap();
        assert!(!reg.is_cached("Base"));
        reg.put_class(&ClassDescriptor::new("Child").with_superclass("base"))
            .unwrap();
        assert_eq!(reg.get_class("Child").unwrap().superclass(), Some("Base"));
        assert!(matches!(
            reg.put_class(&ClassDescriptor::new("Lost").with_superclass("Nowhere")),
            Err(RegistryError::InvalidSuperclass { .. })
        ));
    }

    #[test]
    fn remove_keeps_later_records_readable() {
        let dir = tempfile::tempdir().unwrap();
        populated(dir.path(), 3);
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 4).unwrap();
        reg.get_class("Leaf0").unwrap();
        reg.remove_class("Leaf0").unwrap();
        assert!(!reg.is_cached("Leaf0"));
        assert_eq!(reg.get_class("Leaf1").unwrap().name(), "Leaf1");
        assert_eq!(reg.get_class("Leaf2").unwrap().name(), "Leaf2");
        assert!(matches!(
            reg.remove_class("Root"),
            Err(RegistryError::ClassHasChildren(_))
        ));
        assert!(matches!(reg.remove_class("Leaf0"), Err(RegistryError::NotFound(_))));
    }

    // ----------------------------------------------------------------
    // Concurrency
    // ----------------------------------------------------------------

    #[test]
    fn concurrent_lookups_and_writes_respect_bound() {
        let dir = tempfile::tempdir().unwrap();
        populated(dir.path(), 9);
        let reg = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 2).unwrap();

        std::thread::scope(|s| {
            for t in 0..4 {
                let reg = &reg;
                s.spawn(move || {
                    for round in 0..50 {
                        let name = format!("Leaf{}", (t + round) % 9);
                        let class = reg.get_class(&name).unwrap();
                        assert_eq!(class.name(), name);
                        assert_eq!(class.superclass(), Some("Root"));
                        assert!(reg.cached_count() <= 2);
                    }
                });
            }
            let reg = &reg;
            s.spawn(move || {
                for i in 0..10 {
                    reg.put_class(&ClassDescriptor::new(format!("Extra{i}")).with_superclass("Root"))
                        .unwrap();
                }
            });
        });

        assert_eq!(reg.len(), 20);
        assert!(reg.cached_count() <= reg.cache_limit());
        let reopened = CachedRegistry::open(dir.path(), DEFAULT_STORE_FILE, 2).unwrap();
        assert_eq!(reopened.len(), 20);
        assert_eq!(reopened.children("Root").unwrap().len(), 19);
        assert_eq!(reopened.get_class("Extra9").unwrap().superclass(), Some("Root"));
    }
}
