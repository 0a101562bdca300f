//! Immutable description of the entity producing telemetry.

use crate::common::{Key, KeyValue, Value};
use std::collections::{btree_map, BTreeMap};

/// An immutable set of attributes describing the entity (service, host,
/// process) that produces the spans.
///
/// Resources are set once on the tracer provider and stamped onto every
/// exported span. A `BTreeMap` keeps iteration order deterministic for
/// exporters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    attrs: BTreeMap<Key, Value>,
}

impl Resource {
    /// Creates an empty resource.
    pub fn empty() -> Self {
        Resource::default()
    }

    /// Creates a resource from the given key-value pairs.
    ///
    /// Later values for the same key override earlier ones.
    pub fn new<T: IntoIterator<Item = KeyValue>>(kvs: T) -> Self {
        let mut attrs = BTreeMap::new();
        for kv in kvs {
            attrs.insert(kv.key, kv.value);
        }
        Resource { attrs }
    }

    /// Returns a new resource holding the union of `self` and `other`.
    ///
    /// Keys present in both take their value from `other`.
    pub fn merge(&self, other: &Resource) -> Self {
        let mut attrs = self.attrs.clone();
        for (key, value) in &other.attrs {
            attrs.insert(key.clone(), value.clone());
        }
        Resource { attrs }
    }

    /// Returns the value for the given key, if present.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// The number of attributes in this resource.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the resource holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Iterate over the resource's attributes.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.attrs.iter())
    }
}

/// An iterator over a [`Resource`]'s attributes.
#[derive(Debug)]
pub struct Iter<'a>(btree_map::Iter<'a, Key, Value>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl<'a> IntoIterator for &'a Resource {
    type Item = (&'a Key, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_keys_override() {
        let resource = Resource::new(vec![
            KeyValue::new("service.name", "a"),
            KeyValue::new("service.name", "b"),
        ]);
        assert_eq!(
            resource.get(&Key::new("service.name")),
            Some(&Value::from("b"))
        );
        assert_eq!(resource.len(), 1);
    }

    #[test]
    fn merge_prefers_other() {
        let base = Resource::new(vec![
            KeyValue::new("host.name", "a"),
            KeyValue::new("service.name", "svc"),
        ]);
        let override_ = Resource::new(vec![KeyValue::new("host.name", "b")]);
        let merged = base.merge(&override_);
        assert_eq!(merged.get(&Key::new("host.name")), Some(&Value::from("b")));
        assert_eq!(merged.len(), 2);
    }
}
