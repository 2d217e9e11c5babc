//! Name index and inheritance index shared by both registry backends.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{RegistryError, RegistryResult};

/// Case-insensitive class name used as a map key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassKey(String);

impl ClassKey {
    pub fn new(name: &str) -> Self {
        Self(name.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClassKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Scope of an enumeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnumerateOptions {
    /// Include indirect descendants.
    pub deep: bool,
    /// Keep only association classes.
    pub associations_only: bool,
}

impl EnumerateOptions {
    pub fn deep() -> Self {
        Self {
            deep: true,
            associations_only: false,
        }
    }

    pub fn shallow() -> Self {
        Self::default()
    }

    pub fn associations(mut self) -> Self {
        self.associations_only = true;
        self
    }
}

#[derive(Clone, Debug)]
struct Node {
    name: String,
    parent: Option<String>,
    association: bool,
}

/// Class names, their parents, and the parent-to-children index.
///
/// Child lists are ordered most-recently-added first. Iteration over the
/// name index is sorted by case-folded name.
#[derive(Debug, Default)]
pub struct ClassTree {
    nodes: BTreeMap<ClassKey, Node>,
    children: HashMap<ClassKey, Vec<String>>,
    associations: usize,
    top_level_associations: usize,
}

impl ClassTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, parent: Option<&str>, association: bool) {
        self.nodes.insert(
            ClassKey::new(name),
            Node {
                name: name.to_string(),
                parent: parent.map(str::to_string),
                association,
            },
        );
        if let Some(parent) = parent {
            self.children
                .entry(ClassKey::new(parent))
                .or_default()
                .insert(0, name.to_string());
        }
        if association {
            self.associations += 1;
            if parent.is_none() {
                self.top_level_associations += 1;
            }
        }
    }

    /// Drop `name` from the name index and detach it from its parent's
    /// child list. Its own child list is left untouched.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(node) = self.nodes.remove(&ClassKey::new(name)) else {
            return false;
        };
        if let Some(parent) = &node.parent {
            let key = ClassKey::new(parent);
            if let Some(list) = self.children.get_mut(&key) {
                list.retain(|c| !c.eq_ignore_ascii_case(&node.name));
                if list.is_empty() {
                    self.children.remove(&key);
                }
            }
        }
        if node.association {
            self.associations -= 1;
            if node.parent.is_none() {
                self.top_level_associations -= 1;
            }
        }
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(&ClassKey::new(name))
    }

    /// The class name as it was registered.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.nodes.get(&ClassKey::new(name)).map(|n| n.name.as_str())
    }

    pub fn parent(&self, name: &str) -> RegistryResult<Option<&str>> {
        self.nodes
            .get(&ClassKey::new(name))
            .map(|n| n.parent.as_deref())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn is_association(&self, name: &str) -> bool {
        self.nodes
            .get(&ClassKey::new(name))
            .is_some_and(|n| n.association)
    }

    pub fn children(&self, name: &str) -> &[String] {
        self.children
            .get(&ClassKey::new(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_children(&self, name: &str) -> bool {
        !self.children(name).is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn association_count(&self) -> usize {
        self.associations
    }

    pub fn top_level_association_count(&self) -> usize {
        self.top_level_associations
    }

    /// All class names, sorted case-insensitively.
    pub fn names(&self) -> Vec<String> {
        self.nodes.values().map(|n| n.name.clone()).collect()
    }

    /// Classes without a superclass, plus classes whose superclass is not
    /// registered, in sorted order.
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.parent.as_deref().map_or(true, |p| !self.contains(p)))
            .map(|n| n.name.as_str())
            .collect()
    }

    /// Pre-order descendants of `name`, excluding `name` itself.
    fn descendants_into(&self, name: &str, out: &mut Vec<String>, seen: &mut HashSet<ClassKey>) {
        let mut stack: Vec<&str> = self.children(name).iter().rev().map(String::as_str).collect();
        while let Some(next) = stack.pop() {
            if !seen.insert(ClassKey::new(next)) {
                continue;
            }
            out.push(next.to_string());
            stack.extend(self.children(next).iter().rev().map(String::as_str));
        }
    }

    /// Enumerate class names.
    ///
    /// Without a scope: top-level classes, or the whole forest in pre-order
    /// when `deep`. With a scope: its direct children, or its whole subtree
    /// (excluding the scope class) in pre-order when `deep`.
    pub fn enumerate(&self, scope: Option<&str>, options: EnumerateOptions) -> RegistryResult<Vec<String>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        match scope {
            None => {
                for root in self.roots() {
                    seen.insert(ClassKey::new(root));
                    out.push(root.to_string());
                    if options.deep {
                        self.descendants_into(root, &mut out, &mut seen);
                    }
                }
            }
            Some(scope) => {
                if !self.contains(scope) {
                    return Err(RegistryError::NotFound(scope.to_string()));
                }
                if options.deep {
                    seen.insert(ClassKey::new(scope));
                    self.descendants_into(scope, &mut out, &mut seen);
                } else {
                    out.extend(self.children(scope).iter().cloned());
                }
            }
        }
        if options.associations_only {
            out.retain(|name| self.is_association(name));
        }
        Ok(out)
    }
}
