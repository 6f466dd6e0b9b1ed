//! Memoized layouts keyed by the structure of the input tree.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use anyhow::Context;
use rustc_hash::FxHasher;
use tracing::{debug, warn};

use crate::ir::{Component, ComponentEntry, SystemData};
use crate::layout::Layout;

/// Hash of everything in a system tree that can move a box or an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructuralKey(u64);

impl StructuralKey {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(text: &str) -> Option<Self> {
        u64::from_str_radix(text.trim(), 16).ok().map(Self)
    }

    /// Mixes `salt` into the key, so that one cache can hold layouts of the
    /// same tree produced under different settings.
    pub fn salted(self, salt: &str) -> Self {
        let mut hasher = FxHasher::default();
        self.0.hash(&mut hasher);
        salt.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Display for StructuralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Structural hash of `data`.
///
/// Covers ids, names, attribute keys, nesting, and connection targets and
/// names. Attribute expressions and live values are left out: they change
/// what a card shows, never where it sits.
pub fn structural_key(data: &SystemData) -> StructuralKey {
    let mut hasher = FxHasher::default();
    hash_entries(&data.components, &mut hasher);
    StructuralKey(hasher.finish())
}

fn hash_entries(entries: &[ComponentEntry], hasher: &mut FxHasher) {
    let components: Vec<&Component> = entries
        .iter()
        .filter_map(ComponentEntry::as_component)
        .collect();
    components.len().hash(hasher);
    for component in components {
        hash_component(component, hasher);
    }
}

fn hash_component(component: &Component, hasher: &mut FxHasher) {
    component.id.hash(hasher);
    component.name.hash(hasher);
    component.labels.len().hash(hasher);
    for attribute in &component.labels {
        attribute.label.hash(hasher);
    }
    let connections: Vec<(&str, Option<&str>)> = component
        .connections
        .iter()
        .filter_map(|c| Some((c.target_id()?, c.label())))
        .collect();
    connections.hash(hasher);
    hash_entries(&component.components, hasher);
}

/// Layout store shared by engines. Layouts are kept as JSON text.
#[derive(Debug, Default)]
pub struct LayoutCache {
    entries: RwLock<HashMap<StructuralKey, String>>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StructuralKey) -> Option<Layout> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let raw = entries.get(key)?;
        match serde_json::from_str(raw) {
            Ok(layout) => Some(layout),
            Err(err) => {
                warn!(%key, error = %err, "cached layout is unreadable; treating as miss");
                None
            }
        }
    }

    pub fn put(&self, key: StructuralKey, layout: &Layout) {
        match serde_json::to_string(layout) {
            Ok(raw) => self.insert_serialized(key, raw),
            Err(err) => warn!(%key, error = %err, "layout not cached"),
        }
    }

    /// Stores already serialized layout text without checking it.
    pub fn insert_serialized(&self, key: StructuralKey, raw: String) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, raw);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a cache file written by [`LayoutCache::save`].
    ///
    /// A missing or corrupt file gives an empty cache.
    pub fn load(path: &Path) -> Self {
        let cache = Self::new();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "cache file unreadable; starting empty"
                    );
                }
                return cache;
            }
        };
        let stored: BTreeMap<String, String> = match serde_json::from_str(&contents) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache file corrupt; starting empty");
                return cache;
            }
        };
        for (hex, raw) in stored {
            match StructuralKey::from_hex(&hex) {
                Some(key) => cache.insert_serialized(key, raw),
                None => warn!(key = %hex, "skipping cache entry with malformed key"),
            }
        }
        debug!(path = %path.display(), entries = cache.len(), "loaded layout cache");
        cache
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let stored: BTreeMap<String, String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, raw)| (key.to_hex(), raw.clone()))
            .collect();
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing layout cache {}", path.display()))?;
        Ok(())
    }
}
