//! Static class-to-provider registrations.
//!
//! The repository does not dispatch to providers; it only needs to know which
//! classes are served by an instance provider so that repository-backed
//! instance enumeration can skip them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tree::ClassKey;

/// Capabilities a provider registers for a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Class,
    Instance,
    Association,
    Method,
    Indication,
    Property,
}

/// One registration: a provider serving `class`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub class: String,
    pub provider: String,
    #[serde(default)]
    pub library: Option<String>,
    pub kinds: Vec<ProviderKind>,
}

impl ProviderEntry {
    pub fn new(class: impl Into<String>, provider: impl Into<String>, kinds: &[ProviderKind]) -> Self {
        Self {
            class: class.into(),
            provider: provider.into(),
            library: None,
            kinds: kinds.to_vec(),
        }
    }
}

/// Lookup table from class name to its registered providers.
#[derive(Clone, Debug, Default)]
pub struct ProviderTable {
    entries: HashMap<ClassKey, Vec<ProviderEntry>>,
}

impl ProviderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ProviderEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.register(entry);
        }
        table
    }

    pub fn register(&mut self, entry: ProviderEntry) {
        self.entries
            .entry(ClassKey::new(&entry.class))
            .or_default()
            .push(entry);
    }

    pub fn providers_for(&self, class: &str) -> &[ProviderEntry] {
        self.entries
            .get(&ClassKey::new(class))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_kind(&self, class: &str, kind: ProviderKind) -> bool {
        self.providers_for(class)
            .iter()
            .any(|e| e.kinds.contains(&kind))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let table = ProviderTable::from_entries([
            ProviderEntry::new("CIM_Process", "ProcessProvider", &[ProviderKind::Instance, ProviderKind::Method]),
            ProviderEntry::new("cim_process", "ProcessAssoc", &[ProviderKind::Association]),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.providers_for("CIM_PROCESS").len(), 2);
        assert!(table.has_kind("cim_process", ProviderKind::Instance));
        assert!(table.has_kind("CIM_Process", ProviderKind::Association));
        assert!(!table.has_kind("CIM_Process", ProviderKind::Indication));
        assert!(table.providers_for("Other").is_empty());
    }
}
