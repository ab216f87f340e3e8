use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Keys recomputed for every path and therefore never inherited by children.
pub const PATH_SPECIFIC_KEYS: &[&str] = &[
    "mime",
    "interpreter_path",
    "interpreter_name",
    "md5",
    "sha1",
    "sha256",
    "sha512",
    "tlsh",
    "py_imports",
];

/// Copy-on-write metadata snapshot.
///
/// Cloning shares the underlying map; the first mutation of a shared
/// snapshot copies it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(Arc<Map<String, Value>>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(Arc::new(map))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if !self.0.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.0).remove(key)
    }

    pub fn extend(&mut self, other: Map<String, Value>) {
        if other.is_empty() {
            return;
        }
        Arc::make_mut(&mut self.0).extend(other);
    }

    pub fn depth(&self) -> Option<u64> {
        self.get("depth").and_then(Value::as_u64)
    }

    pub fn set_depth(&mut self, depth: u64) {
        self.insert("depth", depth);
    }

    pub fn tags(&self) -> BTreeSet<String> {
        match self.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let mut tags = self.tags();
        if tags.insert(tag.into()) {
            self.insert("tags", tags.into_iter().collect::<Vec<_>>());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn shares_storage_with(&self, other: &Metadata) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Starts a derived snapshot from this one.
    pub fn derive(&self) -> MetadataBuilder {
        MetadataBuilder {
            base: self.clone(),
            removed: Vec::new(),
            updates: Map::new(),
        }
    }

    /// Metadata for a child one level deeper: inherits everything except
    /// [`PATH_SPECIFIC_KEYS`].
    pub fn for_child(&self, depth: u64) -> Metadata {
        self.derive()
            .without(PATH_SPECIFIC_KEYS)
            .set("depth", depth)
            .build()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Applies removals and updates to a snapshot, copying only when one of
/// them changes something.
#[derive(Debug)]
pub struct MetadataBuilder {
    base: Metadata,
    removed: Vec<&'static str>,
    updates: Map<String, Value>,
}

impl MetadataBuilder {
    pub fn without(mut self, keys: &[&'static str]) -> Self {
        self.removed.extend_from_slice(keys);
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.updates.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Metadata {
        let MetadataBuilder {
            mut base,
            removed,
            updates,
        } = self;

        let removes_any = removed.iter().any(|key| base.contains_key(key));
        let changes_any = updates
            .iter()
            .any(|(key, value)| base.get(key) != Some(value));
        if !removes_any && !changes_any {
            return base;
        }

        let map = Arc::make_mut(&mut base.0);
        for key in removed {
            map.remove(key);
        }
        map.extend(updates);
        base
    }
}
