use std::collections::HashSet;
use std::sync::Arc;

use cim_codec::{ClassDescriptor, ConstClass, VersionRecord};

use crate::error::RegistryResult;
use crate::provider::{ProviderKind, ProviderTable};
use crate::tree::{ClassKey, EnumerateOptions};

/// Classes that are never candidates for repository-backed instance
/// enumeration.
const NON_INSTANCE_CLASSES: [&str; 2] = ["CIM_IndicationFilter", "CIM_IndicationSubscription"];

/// Namespace-scoped class registry.
///
/// All implementations must satisfy these invariants:
/// - Class names are unique within a registry, compared case-insensitively.
/// - A class is only added when its superclass is already registered, and
///   the stored class is the flattened result of merging with that parent.
/// - A class with registered subclasses is never removed.
/// - Children are reported most-recently-added first.
/// - Every mutation is appended to the backing store before the in-memory
///   indexes change; a failed write leaves the registry unchanged.
/// - Returned classes are shared snapshots: later mutations do not alter a
///   class a caller already holds.
pub trait ClassRepository: Send + Sync {
    /// Fetch a class by name.
    fn get_class(&self, name: &str) -> RegistryResult<Arc<ConstClass>>;

    /// Merge `class` with its superclass, append it to the store and index it.
    fn put_class(&self, class: &ClassDescriptor) -> RegistryResult<()>;

    /// Remove a class that has no subclasses.
    fn remove_class(&self, name: &str) -> RegistryResult<()>;

    fn contains(&self, name: &str) -> bool;

    /// The registered superclass name, `None` for a top-level class.
    fn superclass_of(&self, name: &str) -> RegistryResult<Option<String>>;

    /// Direct subclasses, most recently added first.
    fn children(&self, name: &str) -> RegistryResult<Vec<String>>;

    /// All class names, sorted case-insensitively.
    fn class_names(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_association(&self, name: &str) -> bool;

    /// Version record found at the start of the store, if any.
    fn version(&self) -> Option<VersionRecord>;

    fn association_count(&self) -> usize;

    fn top_level_association_count(&self) -> usize;

    /// Names in enumeration order (see [`crate::ClassTree::enumerate`]).
    fn enumerate_names(&self, scope: Option<&str>, options: EnumerateOptions) -> RegistryResult<Vec<String>>;

    /// Classes in enumeration order.
    fn enumerate_classes(
        &self,
        scope: Option<&str>,
        options: EnumerateOptions,
    ) -> RegistryResult<Vec<Arc<ConstClass>>>;

    /// Fetch a class restricted to the named properties.
    fn get_class_filtered(&self, name: &str, properties: &[&str]) -> RegistryResult<ConstClass> {
        let class = self.get_class(name)?;
        Ok(class.filter_properties(properties)?)
    }

    /// True when `name` equals `ancestor` or inherits from it.
    fn is_descendant(&self, name: &str, ancestor: &str) -> RegistryResult<bool> {
        let mut seen = HashSet::new();
        let mut current = Some(name.to_string());
        while let Some(class) = current {
            if class.eq_ignore_ascii_case(ancestor) {
                return Ok(true);
            }
            if !seen.insert(ClassKey::new(&class)) {
                break;
            }
            current = if self.contains(&class) {
                self.superclass_of(&class)?
            } else {
                None
            };
        }
        Ok(false)
    }

    /// Every class below `name`, in pre-order.
    fn descendant_names(&self, name: &str) -> RegistryResult<Vec<String>> {
        self.enumerate_names(Some(name), EnumerateOptions::deep())
    }

    /// Association classes without a superclass.
    fn top_level_associations(&self) -> RegistryResult<Vec<String>> {
        self.enumerate_names(None, EnumerateOptions::shallow().associations())
    }

    /// Classes under `name` (inclusive) whose instances live in the
    /// repository: not abstract, not an indication filter or subscription,
    /// and with no instance provider registered on the class or an ancestor.
    fn instance_candidates(&self, name: &str, providers: &ProviderTable) -> RegistryResult<Vec<String>> {
        let own = self.get_class(name)?.name().to_string();
        let mut out = Vec::new();
        for class_name in std::iter::once(own).chain(self.descendant_names(name)?) {
            if NON_INSTANCE_CLASSES
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&class_name))
            {
                continue;
            }
            if self.get_class(&class_name)?.is_abstract() {
                continue;
            }
            if has_instance_provider(self, &class_name, providers)? {
                continue;
            }
            out.push(class_name);
        }
        Ok(out)
    }
}

fn has_instance_provider<R: ClassRepository + ?Sized>(
    repo: &R,
    name: &str,
    providers: &ProviderTable,
) -> RegistryResult<bool> {
    let mut seen = HashSet::new();
    let mut current = Some(name.to_string());
    while let Some(class) = current {
        if providers.has_kind(&class, ProviderKind::Instance) {
            return Ok(true);
        }
        if !seen.insert(ClassKey::new(&class)) || !repo.contains(&class) {
            break;
        }
        current = repo.superclass_of(&class)?;
    }
    Ok(false)
}
