use std::collections::BTreeMap;

use crate::naming::normalize_id;

/// Map keyed by normalized id that still remembers the first original-cased key.
#[derive(Debug, Clone)]
pub struct NormalizedKeyMap<V> {
    entries: BTreeMap<String, (String, V)>,
}

impl<V> Default for NormalizedKeyMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> NormalizedKeyMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> V) -> &mut V {
        let (_, value) = self
            .entries
            .entry(normalize_id(key))
            .or_insert_with(|| (key.trim().to_string(), default()));
        value
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&normalize_id(key)).map(|(_, value)| value)
    }

    /// Iterates `(original key, value)` in normalized-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries
            .values()
            .map(|(original, value)| (original.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
