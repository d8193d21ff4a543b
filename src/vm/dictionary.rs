// Oryx Method Dictionary
// Behaviour tables: name -> layered method entries, the linearized scope
// list and the per-scope search-order snapshots used by super lookups.

use super::class::ClassId;
use super::gc::{Marker, Trace};
use super::interner::message_name;
use super::method::MethodId;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// One layer of a method name's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodEntry {
    Method {
        method: MethodId,
        scope: Option<ClassId>,
    },
    /// Hides every method of this name layered below it
    Removed,
}

impl MethodEntry {
    pub fn method(method: MethodId, scope: Option<ClassId>) -> Self {
        MethodEntry::Method { method, scope }
    }

    pub fn method_id(&self) -> Option<MethodId> {
        match self {
            MethodEntry::Method { method, .. } => Some(*method),
            MethodEntry::Removed => None,
        }
    }

    pub fn scope(&self) -> Option<ClassId> {
        match self {
            MethodEntry::Method { scope, .. } => *scope,
            MethodEntry::Removed => None,
        }
    }
}

type Chain = SmallVec<[MethodEntry; 2]>;

/// A behaviour's method table.
///
/// Each name maps to a chain of entries; index 0 is found first. Cloning
/// copies the table and the scope bookkeeping but shares the methods.
#[derive(Debug, Clone, Default)]
pub struct MethodDictionary {
    contents: FxHashMap<Arc<str>, Chain>,
    instance_methods: Option<FxHashMap<Arc<str>, MethodEntry>>,
    scope_list: Vec<ClassId>,
    scope_orders: FxHashMap<ClassId, Arc<[ClassId]>>,
}

impl MethodDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method (or a removal tombstone) under `name`.
    ///
    /// An entry with the same scope is replaced where it stands; anything
    /// else goes to the front of the chain.
    pub fn add_method(&mut self, name: &str, entry: MethodEntry) {
        let chain = self.contents.entry(message_name(name)).or_default();
        match entry {
            MethodEntry::Removed => chain.insert(0, entry),
            MethodEntry::Method { scope, .. } => {
                let existing = chain
                    .iter()
                    .position(|e| matches!(e, MethodEntry::Method { scope: s, .. } if *s == scope));
                match existing {
                    Some(index) => chain[index] = entry,
                    None => chain.insert(0, entry),
                }
            }
        }
    }

    /// Overwrite the first entry under `name` without override detection
    pub fn replace_method(&mut self, name: &str, entry: MethodEntry) {
        let chain = self.contents.entry(message_name(name)).or_default();
        match chain.first_mut() {
            Some(first) => *first = entry,
            None => chain.push(entry),
        }
    }

    /// Copy methods of `source` (only those defined in `filter` when given)
    /// into this table, each rescoped to `scope` through `rescope`.
    pub fn replace_methods<F>(
        &mut self,
        source: &MethodDictionary,
        filter: Option<ClassId>,
        scope: ClassId,
        mut rescope: F,
    ) where
        F: FnMut(MethodId, ClassId) -> MethodId,
    {
        let mut names: Vec<&Arc<str>> = source.contents.keys().collect();
        names.sort();
        for name in names {
            for entry in source.contents[name].iter().rev() {
                match *entry {
                    MethodEntry::Method { method, scope: defined } => {
                        if filter.is_some() && defined != filter {
                            continue;
                        }
                        let method = rescope(method, scope);
                        self.replace_method(name, MethodEntry::method(method, Some(scope)));
                    }
                    MethodEntry::Removed => {
                        if filter.is_none() {
                            self.replace_method(name, MethodEntry::Removed);
                        }
                    }
                }
            }
        }
    }

    /// Add an object-level method or tombstone (SETMETHOD). Setting the same
    /// name again replaces the previous instance entry instead of stacking another.
    pub fn add_instance_method(&mut self, name: &str, entry: MethodEntry) {
        let name = message_name(name);
        let instance_methods = self.instance_methods.get_or_insert_with(FxHashMap::default);
        if let Some(old) = instance_methods.insert(name.clone(), entry) {
            Self::unlink(&mut self.contents, &name, old);
        }
        self.contents.entry(name).or_default().insert(0, entry);
    }

    /// Undo an object-level method or tombstone (UNSETMETHOD); false if there was none
    pub fn remove_instance_method(&mut self, name: &str) -> bool {
        let name = message_name(name);
        let Some(old) = self.instance_methods.as_mut().and_then(|m| m.remove(&name)) else {
            return false;
        };
        Self::unlink(&mut self.contents, &name, old);
        true
    }

    /// Instance entries always sit in front of class entries, so the first
    /// equal entry is the instance one
    fn unlink(contents: &mut FxHashMap<Arc<str>, Chain>, name: &Arc<str>, entry: MethodEntry) {
        if let Some(chain) = contents.get_mut(name) {
            if let Some(index) = chain.iter().position(|e| *e == entry) {
                chain.remove(index);
            }
            if chain.is_empty() {
                contents.remove(name);
            }
        }
    }

    pub fn has_instance_methods(&self) -> bool {
        self.instance_methods.as_ref().map(|m| !m.is_empty()).unwrap_or(false)
    }

    /// True when SETMETHOD left a method or a tombstone under `name`
    pub fn has_instance_entry(&self, name: &str) -> bool {
        self.instance_methods
            .as_ref()
            .map(|m| m.contains_key(&message_name(name)))
            .unwrap_or(false)
    }

    /// Normal lookup: the front entry, unless it is a tombstone
    pub fn get_method(&self, name: &str) -> Option<MethodId> {
        self.contents.get(&message_name(name))?.first()?.method_id()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.get_method(name).is_some()
    }

    /// Every entry layered under `name`, front first
    pub fn entries(&self, name: &str) -> &[MethodEntry] {
        match self.contents.get(&message_name(name)) {
            Some(chain) => chain.as_slice(),
            None => &[],
        }
    }

    /// First method under `name` defined in `start` or one of the scopes
    /// recorded before `start` was added. Tombstones are skipped.
    pub fn find_super_method(&self, name: &str, start: ClassId) -> Option<MethodId> {
        let order = self.scope_orders.get(&start)?;
        let chain = self.contents.get(&message_name(name))?;
        chain.iter().find_map(|entry| match *entry {
            MethodEntry::Method { method, scope: Some(scope) }
                if scope == start || order.contains(&scope) =>
            {
                Some(method)
            }
            _ => None,
        })
    }

    /// Append `scope`, recording the scopes that precede it. Adding a scope
    /// twice keeps the first snapshot.
    pub fn add_scope(&mut self, scope: ClassId) {
        if self.scope_orders.contains_key(&scope) {
            return;
        }
        let snapshot: Arc<[ClassId]> = Arc::from(self.scope_list.as_slice());
        self.scope_orders.insert(scope, snapshot);
        self.scope_list.push(scope);
    }

    pub fn has_scope(&self, scope: ClassId) -> bool {
        self.scope_orders.contains_key(&scope)
    }

    /// The nearest scope before `scope` (None at the root)
    pub fn resolve_super_scope(&self, scope: ClassId) -> Option<ClassId> {
        self.scope_orders.get(&scope)?.last().copied()
    }

    pub fn scope_order(&self, scope: ClassId) -> Option<&[ClassId]> {
        self.scope_orders.get(&scope).map(|s| &**s)
    }

    pub fn scopes(&self) -> &[ClassId] {
        &self.scope_list
    }

    /// Fold the methods of `source` into this table, keeping their order
    pub fn merge_methods(&mut self, source: &MethodDictionary) {
        let mut names: Vec<&Arc<str>> = source.contents.keys().collect();
        names.sort();
        for name in names {
            for entry in source.contents[name].iter().rev() {
                self.add_method(name, *entry);
            }
        }
    }

    /// Append the scopes of `source` not already present, in source order
    pub fn merge_scopes(&mut self, source: &MethodDictionary) {
        for scope in &source.scope_list {
            self.add_scope(*scope);
        }
    }

    pub fn merge(&mut self, source: &MethodDictionary) {
        self.merge_methods(source);
        self.merge_scopes(source);
    }

    /// Name -> method for every visible method defined in `scope`
    /// (every visible method when `scope` is None)
    pub fn get_methods(&self, scope: Option<ClassId>) -> Vec<(Arc<str>, MethodId)> {
        let mut methods: Vec<(Arc<str>, MethodId)> = self
            .contents
            .iter()
            .filter_map(|(name, chain)| {
                let entry = match scope {
                    None => chain.first()?,
                    Some(scope) => chain.iter().find(|e| e.scope() == Some(scope))?,
                };
                entry.method_id().map(|m| (name.clone(), m))
            })
            .collect();
        methods.sort_by(|a, b| a.0.cmp(&b.0));
        methods
    }

    /// Every method id referenced by the table
    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.contents
            .values()
            .flat_map(|chain| chain.iter().filter_map(|e| e.method_id()))
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl Trace for MethodDictionary {
    fn mark_reachable(&self, marker: &mut Marker) {
        for method in self.method_ids() {
            marker.mark_method(method);
        }
    }
}
