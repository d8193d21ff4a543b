// Oryx Directories
// A directory maps names to either a stored value or a method computing
// the value on every read, plus an optional UNKNOWN method.

use super::gc::{Marker, Trace};
use super::interner::message_name;
use super::method::MethodId;
use super::value::Value;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum DirectoryEntry {
    Explicit(Value),
    /// Run with the directory as receiver and no arguments on every read
    Computed(MethodId),
}

/// What a read found; methods are run by the caller outside the directory lock
#[derive(Debug, Clone)]
pub enum DirectoryLookup {
    Found(Value),
    Compute(MethodId),
    /// Run the UNKNOWN method with the index as its only argument
    Unknown(MethodId),
    Missing,
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: FxHashMap<Arc<str>, DirectoryEntry>,
    unknown: Option<MethodId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, index: &str) -> DirectoryLookup {
        match self.entries.get(index) {
            Some(DirectoryEntry::Explicit(value)) => DirectoryLookup::Found(value.clone()),
            Some(DirectoryEntry::Computed(method)) => DirectoryLookup::Compute(*method),
            None => match self.unknown {
                Some(method) => DirectoryLookup::Unknown(method),
                None => DirectoryLookup::Missing,
            },
        }
    }

    /// Store a value; a computed entry of the same name is replaced
    pub fn put(&mut self, value: Value, index: &str) {
        self.entries.insert(Arc::from(index), DirectoryEntry::Explicit(value));
    }

    /// Install (Some) or remove (None) a computed entry. The name UNKNOWN
    /// goes to the dedicated unknown slot. Installing replaces any stored
    /// value of the same name.
    pub fn set_method(&mut self, name: &str, method: Option<MethodId>) {
        let name = message_name(name);
        if &*name == "UNKNOWN" {
            if method.is_some() {
                self.entries.remove(&name);
            }
            self.unknown = method;
            return;
        }
        match method {
            Some(method) => {
                self.entries.insert(name, DirectoryEntry::Computed(method));
            }
            None => {
                if matches!(self.entries.get(&name), Some(DirectoryEntry::Computed(_))) {
                    self.entries.remove(&name);
                }
            }
        }
    }

    pub fn unknown_method(&self) -> Option<MethodId> {
        self.unknown
    }

    pub fn entry(&self, index: &str) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    pub fn remove(&mut self, index: &str) -> Option<DirectoryEntry> {
        self.entries.remove(index)
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.entries.contains_key(index)
    }

    pub fn items(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, ordered by index
    pub fn snapshot(&self) -> Vec<(Arc<str>, DirectoryEntry)> {
        let mut entries: Vec<(Arc<str>, DirectoryEntry)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn all_indexes(&self) -> Vec<Value> {
        self.snapshot().into_iter().map(|(k, _)| Value::String(k)).collect()
    }

    /// Index of the first stored value identical to `target`
    pub fn index_of_value(&self, target: &Value) -> Option<Arc<str>> {
        self.snapshot().into_iter().find_map(|(k, v)| match v {
            DirectoryEntry::Explicit(value) if value.identical(target) => Some(k),
            _ => None,
        })
    }

    /// Computed entries (name, method), ordered by name
    pub fn computed(&self) -> Vec<(Arc<str>, MethodId)> {
        self.snapshot()
            .into_iter()
            .filter_map(|(k, v)| match v {
                DirectoryEntry::Computed(method) => Some((k, method)),
                DirectoryEntry::Explicit(_) => None,
            })
            .collect()
    }

    /// Drop every entry and the UNKNOWN method
    pub fn empty(&mut self) {
        self.entries.clear();
        self.unknown = None;
    }
}

impl Trace for Directory {
    fn mark_reachable(&self, marker: &mut Marker) {
        for entry in self.entries.values() {
            match entry {
                DirectoryEntry::Explicit(value) => marker.mark_value(value),
                DirectoryEntry::Computed(method) => marker.mark_method(*method),
            }
        }
        if let Some(method) = self.unknown {
            marker.mark_method(method);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Id;

    fn method(n: u32) -> MethodId {
        Id::from_raw(n, 0)
    }

    #[test]
    fn test_computed_shadows_then_explicit_shadows() {
        let mut dir = Directory::new();
        dir.put(Value::from("v"), "X");
        dir.set_method("X", Some(method(1)));
        assert!(matches!(dir.lookup("X"), DirectoryLookup::Compute(m) if m == method(1)));

        dir.put(Value::from("v"), "X");
        assert!(matches!(dir.lookup("X"), DirectoryLookup::Found(v) if v == Value::from("v")));
        assert_eq!(dir.items(), 1);
    }

    #[test]
    fn test_unset_method_keeps_explicit_value() {
        let mut dir = Directory::new();
        dir.put(Value::from("v"), "X");
        dir.set_method("x", None);
        assert!(dir.has_index("X"));
        dir.set_method("X", Some(method(1)));
        dir.set_method("X", None);
        assert!(!dir.has_index("X"));
    }

    #[test]
    fn test_unknown_slot() {
        let mut dir = Directory::new();
        assert!(matches!(dir.lookup("nope"), DirectoryLookup::Missing));
        dir.set_method("unknown", Some(method(7)));
        assert!(!dir.has_index("UNKNOWN"));
        assert!(matches!(dir.lookup("nope"), DirectoryLookup::Unknown(m) if m == method(7)));
        dir.set_method("UNKNOWN", None);
        assert!(matches!(dir.lookup("nope"), DirectoryLookup::Missing));
    }

    #[test]
    fn test_unknown_method_replaces_stored_unknown() {
        let mut dir = Directory::new();
        dir.put(Value::from("stored"), "UNKNOWN");
        dir.set_method("UNKNOWN", Some(method(3)));
        assert!(!dir.has_index("UNKNOWN"));
        assert!(matches!(dir.lookup("UNKNOWN"), DirectoryLookup::Unknown(m) if m == method(3)));
    }

    #[test]
    fn test_reverse_lookup_and_listing() {
        let mut dir = Directory::new();
        dir.put(Value::from("1"), "b");
        dir.put(Value::from("2"), "a");
        dir.set_method("C", Some(method(1)));
        assert_eq!(dir.index_of_value(&Value::from("1")).as_deref(), Some("b"));
        assert_eq!(dir.index_of_value(&Value::from("3")), None);
        assert_eq!(
            dir.all_indexes(),
            vec![Value::from("C"), Value::from("a"), Value::from("b")]
        );
        assert_eq!(dir.computed().len(), 1);
        dir.empty();
        assert!(dir.is_empty());
    }
}
