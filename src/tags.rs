//! Owned tag bags for OSM objects that outlive their read buffer.
//!
//! Tag bags are tiny (a handful of entries), so lookup is a linear scan
//! over a plain vector instead of a hash map.

use std::iter::FromIterator;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagBag {
    tags: Vec<(String, String)>,
}

impl TagBag {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.tags.push((key.to_string(), value.to_string()));
    }

    /// Returns the value of the first tag with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like `get`, but falls back to `default` for missing keys.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn has_value(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for TagBag {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let tags = iter
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { tags }
    }
}
