//! Request-scoped instance tracking.

use parking_lot::Mutex;
use tracing::debug;

use crate::instance::Instance;

/// Releases every instance created for one request when the request ends.
///
/// Tracked instances are released on [`RequestArena::teardown`] or when the
/// arena is dropped, whichever comes first. Handles held elsewhere then
/// report `InvalidHandle`.
#[derive(Default)]
pub struct RequestArena {
    tracked: Mutex<Vec<Instance>>,
}

impl RequestArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, instance: &Instance) {
        self.tracked.lock().push(instance.clone());
    }

    pub fn len(&self) -> usize {
        self.tracked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.lock().is_empty()
    }

    /// Release every tracked instance and forget them. Returns how many
    /// were released.
    pub fn teardown(&self) -> usize {
        let tracked = std::mem::take(&mut *self.tracked.lock());
        for instance in &tracked {
            instance.release();
        }
        if !tracked.is_empty() {
            debug!(released = tracked.len(), "request arena torn down");
        }
        tracked.len()
    }
}

impl Drop for RequestArena {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_codec::{ClassDescriptor, PropertyDecl};
    use cim_registry::{ClassRepository, EagerRegistry, DEFAULT_STORE_FILE};
    use cim_types::{CimType, ErrorKind};
    use std::sync::Arc;

    fn source(dir: &std::path::Path) -> Arc<dyn ClassRepository> {
        let reg = EagerRegistry::open(dir, DEFAULT_STORE_FILE).unwrap();
        reg.put_class(
            &ClassDescriptor::new("CIM_Job").with_property(PropertyDecl::new("Id", CimType::Uint32).key()),
        )
        .unwrap();
        Arc::new(reg)
    }

    #[test]
    fn teardown_releases_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        let arena = RequestArena::new();
        let a = Instance::new_tracked(&arena, &source, None, "CIM_Job").unwrap();
        let b = Instance::new_tracked(&arena, &source, None, "CIM_Job").unwrap();
        let untracked = Instance::create(&source, None, "CIM_Job").unwrap();
        assert_eq!(arena.len(), 2);

        assert_eq!(arena.teardown(), 2);
        assert!(arena.is_empty());
        assert_eq!(a.property_count().unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert!(!b.is_valid());
        assert!(untracked.is_valid());
        assert_eq!(arena.teardown(), 0);
    }

    #[test]
    fn drop_releases_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let source = source(dir.path());
        let kept = {
            let arena = RequestArena::new();
            Instance::new_tracked(&arena, &source, None, "CIM_Job").unwrap()
        };
        assert!(!kept.is_valid());
    }
}
