//! Registry backend that decodes every class at open time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use cim_codec::{merge, ClassDescriptor, ConstClass, VersionRecord};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::repository::ClassRepository;
use crate::store::BackingStore;
use crate::tree::{ClassKey, ClassTree, EnumerateOptions};

struct Entry {
    class: Arc<ConstClass>,
    position: u64,
    length: u32,
}

#[derive(Default)]
struct State {
    classes: HashMap<ClassKey, Entry>,
    tree: ClassTree,
    version: Option<VersionRecord>,
}

impl State {
    fn index(&mut self, class: ConstClass, position: u64, length: u32) {
        let key = ClassKey::new(class.name());
        if self.classes.contains_key(&key) {
            warn!(class = class.name(), position, "duplicate class record, keeping the later one");
            self.tree.remove(class.name());
        }
        self.tree
            .insert(class.name(), class.superclass(), class.is_association());
        self.classes.insert(
            key,
            Entry {
                class: Arc::new(class),
                position,
                length,
            },
        );
    }

    fn entry(&self, name: &str) -> RegistryResult<&Entry> {
        self.classes
            .get(&ClassKey::new(name))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }
}

/// Class registry holding every decoded class in memory.
pub struct EagerRegistry {
    store: BackingStore,
    state: RwLock<State>,
}

impl EagerRegistry {
    /// Open the registry stored in `dir`. A missing store yields an empty
    /// registry; the file is created on the first `put_class`.
    pub fn open(dir: &Path, store_file: &str) -> RegistryResult<Self> {
        let store = BackingStore::locate_or_new(dir, store_file);
        let mut state = State::default();
        if store.exists() {
            let summary = store.scan(|rec| {
                state.index(rec.class, rec.position, rec.length);
                Ok(())
            })?;
            state.version = summary.version;
        }
        info!(
            path = %store.path().display(),
            classes = state.classes.len(),
            "opened eager class registry"
        );
        Ok(Self {
            store,
            state: RwLock::new(state),
        })
    }

    pub fn store(&self) -> &BackingStore {
        &self.store
    }
}

impl ClassRepository for EagerRegistry {
    fn get_class(&self, name: &str) -> RegistryResult<Arc<ConstClass>> {
        let state = self.state.read();
        Ok(Arc::clone(&state.entry(name)?.class))
    }

    fn put_class(&self, class: &ClassDescriptor) -> RegistryResult<()> {
        let mut state = self.state.write();
        if state.tree.contains(&class.name) {
            return Err(RegistryError::AlreadyExists(class.name.clone()));
        }
        let merged = match &class.superclass {
            Some(parent) => {
                let parent_class = state.entry(parent).map_err(|_| RegistryError::InvalidSuperclass {
                    class: class.name.clone(),
                    superclass: parent.clone(),
                })?;
                merge(class, &parent_class.class)?
            }
            None => ConstClass::from_descriptor(class)?,
        };

        let appended = self.store.append(merged.as_bytes())?;
        if appended.created {
            state.version = Some(VersionRecord::current());
        }
        let length = merged.serialized_size() as u32;
        debug!(class = merged.name(), position = appended.position, length, "registered class");
        state.index(merged, appended.position, length);
        Ok(())
    }

    fn remove_class(&self, name: &str) -> RegistryResult<()> {
        let mut state = self.state.write();
        let canonical = state.entry(name)?.class.name().to_string();
        if state.tree.has_children(name) {
            return Err(RegistryError::ClassHasChildren(canonical));
        }

        let removed = self.store.remove_class_records(name)?;
        state.tree.remove(name);
        state.classes.remove(&ClassKey::new(name));
        for (key, (position, length)) in self.store.record_positions()? {
            if let Some(entry) = state.classes.get_mut(&key) {
                entry.position = position;
                entry.length = length;
            }
        }
        debug!(class = %canonical, removed, "removed class");
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
        self.state.read().classes.len()
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
            .map(|name| state.entry(name).map(|e| Arc::clone(&e.class)))
            .collect()
    }
}
