// Oryx Variables
// Variable cells, variable dictionaries (frames and object scopes) and the
// expose operations that share cells between them.

use super::activity::{Activity, Reservation};
use super::class::ClassId;
use super::gc::{Marker, Trace};
use super::interner::message_name;
use super::object::ObjectId;
use super::value::Value;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Default)]
struct VariableState {
    value: Option<Value>,
    dependents: SmallVec<[Arc<Activity>; 2]>,
}

/// A named variable cell.
///
/// Activities waiting on a GUARD WHEN register as dependents; every write or
/// drop wakes all of them and they re-check their condition.
pub struct Variable {
    name: Arc<str>,
    state: Mutex<VariableState>,
}

impl Variable {
    pub fn new(name: Arc<str>) -> Self {
        Self {
            name,
            state: Mutex::new(VariableState::default()),
        }
    }

    pub fn with_value(name: Arc<str>, value: Value) -> Self {
        let variable = Self::new(name);
        variable.state.lock().value = Some(value);
        variable
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn value(&self) -> Option<Value> {
        self.state.lock().value.clone()
    }

    pub fn has_value(&self) -> bool {
        self.state.lock().value.is_some()
    }

    pub fn set(&self, value: Value) {
        let dependents = {
            let mut state = self.state.lock();
            state.value = Some(value);
            state.dependents.clone()
        };
        Self::notify(&dependents);
    }

    /// Clear the value; returns what was there
    pub fn drop_value(&self) -> Option<Value> {
        let (old, dependents) = {
            let mut state = self.state.lock();
            (state.value.take(), state.dependents.clone())
        };
        Self::notify(&dependents);
        old
    }

    pub fn set_guard(&self, activity: &Arc<Activity>) {
        let mut state = self.state.lock();
        if !state.dependents.iter().any(|a| a.id() == activity.id()) {
            state.dependents.push(activity.clone());
        }
    }

    pub fn clear_guard(&self, activity: &Arc<Activity>) {
        self.state.lock().dependents.retain(|a| a.id() != activity.id());
    }

    pub fn dependents(&self) -> usize {
        self.state.lock().dependents.len()
    }

    fn notify(dependents: &[Arc<Activity>]) {
        for activity in dependents {
            activity.unpark();
        }
    }
}

impl Trace for Variable {
    fn mark_reachable(&self, marker: &mut Marker) {
        if let Some(value) = self.value() {
            marker.mark_value(&value);
        }
    }
}

/// Something a GUARD WHEN can wait on
pub trait Watchable: Send + Sync {
    fn set_guard(&self, activity: &Arc<Activity>);
    fn clear_guard(&self, activity: &Arc<Activity>);
}

impl Watchable for Variable {
    fn set_guard(&self, activity: &Arc<Activity>) {
        Variable::set_guard(self, activity)
    }

    fn clear_guard(&self, activity: &Arc<Activity>) {
        Variable::clear_guard(self, activity)
    }
}

/// A set of variables: one method frame, or one scope of an object.
///
/// Stem variables are ordinary cells whose value is a stem object; that
/// object is created by the VM the first time the stem is referenced.
pub struct VariableDictionary {
    scope: Option<ClassId>,
    variables: Mutex<FxHashMap<Arc<str>, Arc<Variable>>>,
    reservation: Reservation,
}

impl VariableDictionary {
    pub fn new(scope: Option<ClassId>) -> Self {
        Self {
            scope,
            variables: Mutex::new(FxHashMap::default()),
            reservation: Reservation::new(),
        }
    }

    pub fn scope(&self) -> Option<ClassId> {
        self.scope
    }

    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }

    /// Look up a variable cell without creating it
    pub fn find(&self, name: &str) -> Option<Arc<Variable>> {
        let name = message_name(name);
        self.variables.lock().get(&name).cloned()
    }

    /// Get (creating if needed) the cell for `name`
    pub fn variable(&self, name: &str) -> Arc<Variable> {
        let name = message_name(name);
        self.variables
            .lock()
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Variable::new(name)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.find(name).and_then(|v| v.value())
    }

    pub fn set(&self, name: &str, value: Value) {
        self.variable(name).set(value);
    }

    pub fn drop_variable(&self, name: &str) -> Option<Value> {
        self.find(name).and_then(|v| v.drop_value())
    }

    /// Make `name` in this dictionary share the cell of `name` in `from`
    pub fn expose_variable(&self, from: &VariableDictionary, name: &str) -> Arc<Variable> {
        let cell = from.variable(name);
        self.variables.lock().insert(cell.name().clone(), cell.clone());
        cell
    }

    /// Snapshot of (name, cell) pairs
    pub fn cells(&self) -> Vec<(Arc<str>, Arc<Variable>)> {
        self.variables
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Stem objects held by stem variables of this dictionary
    pub fn stems(&self) -> Vec<(Arc<str>, ObjectId)> {
        self.cells()
            .into_iter()
            .filter(|(name, _)| is_stem_name(name))
            .filter_map(|(name, cell)| cell.value().and_then(|v| v.as_object()).map(|id| (name, id)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.variables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// New dictionary with fresh cells holding the same values (no guard
    /// state, no shared cells)
    pub fn deep_copy(&self) -> VariableDictionary {
        let copy = VariableDictionary::new(self.scope);
        {
            let mut variables = copy.variables.lock();
            for (name, cell) in self.cells() {
                let fresh = match cell.value() {
                    Some(value) => Variable::with_value(name.clone(), value),
                    None => Variable::new(name.clone()),
                };
                variables.insert(name, Arc::new(fresh));
            }
        }
        copy
    }
}

impl Trace for VariableDictionary {
    fn mark_reachable(&self, marker: &mut Marker) {
        for (_, cell) in self.cells() {
            cell.mark_reachable(marker);
        }
    }
}

/// The object variable dictionaries of one object, one per scope, created
/// the first time a method of that scope touches them
#[derive(Default)]
pub struct ScopedVariables {
    dictionaries: Mutex<SmallVec<[Arc<VariableDictionary>; 2]>>,
}

impl ScopedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, scope: Option<ClassId>) -> Option<Arc<VariableDictionary>> {
        self.dictionaries
            .lock()
            .iter()
            .find(|d| d.scope() == scope)
            .cloned()
    }

    /// Dictionary for `scope`, created when missing
    pub fn get(&self, scope: Option<ClassId>) -> Arc<VariableDictionary> {
        let mut dictionaries = self.dictionaries.lock();
        if let Some(existing) = dictionaries.iter().find(|d| d.scope() == scope) {
            return existing.clone();
        }
        let created = Arc::new(VariableDictionary::new(scope));
        dictionaries.push(created.clone());
        created
    }

    pub fn all(&self) -> Vec<Arc<VariableDictionary>> {
        self.dictionaries.lock().iter().cloned().collect()
    }

    pub fn deep_copy(&self) -> ScopedVariables {
        let copied = self
            .all()
            .into_iter()
            .map(|d| Arc::new(d.deep_copy()))
            .collect();
        ScopedVariables {
            dictionaries: Mutex::new(copied),
        }
    }
}

impl Trace for ScopedVariables {
    fn mark_reachable(&self, marker: &mut Marker) {
        for dictionary in self.all() {
            dictionary.mark_reachable(marker);
        }
    }
}

/// A stem variable name ends with a period ("A.")
pub fn is_stem_name(name: &str) -> bool {
    name.len() > 1 && name.ends_with('.') && !name[..name.len() - 1].contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_drop() {
        let dict = VariableDictionary::new(None);
        assert_eq!(dict.get("x"), None);
        dict.set("x", Value::from("1"));
        assert_eq!(dict.get("X"), Some(Value::from("1")));
        assert_eq!(dict.drop_variable("x"), Some(Value::from("1")));
        assert_eq!(dict.get("x"), None);
        // the cell survives a drop
        assert!(dict.find("x").is_some());
    }

    #[test]
    fn test_expose_shares_cell() {
        let caller = VariableDictionary::new(None);
        let callee = VariableDictionary::new(None);
        caller.set("count", Value::from("1"));
        callee.expose_variable(&caller, "count");
        callee.set("count", Value::from("2"));
        assert_eq!(caller.get("count"), Some(Value::from("2")));
    }

    #[test]
    fn test_write_wakes_dependents() {
        let activity = Activity::new("waiter");
        let variable = Variable::new(message_name("flag"));
        variable.set_guard(&activity);
        variable.set_guard(&activity);
        assert_eq!(variable.dependents(), 1);
        variable.set(Value::from("1"));
        // token left by the notify; park returns immediately
        activity.park();
        variable.clear_guard(&activity);
        assert_eq!(variable.dependents(), 0);
    }

    #[test]
    fn test_deep_copy_does_not_share_cells() {
        let scoped = ScopedVariables::new();
        let dict = scoped.get(None);
        dict.set("name", Value::from("a"));
        assert!(Arc::ptr_eq(&dict, &scoped.get(None)));

        let copy = scoped.deep_copy();
        copy.get(None).set("name", Value::from("b"));
        assert_eq!(dict.get("name"), Some(Value::from("a")));
        assert_eq!(copy.get(None).get("name"), Some(Value::from("b")));
        assert!(scoped.find(None).is_some());
        assert_eq!(scoped.all().len(), 1);
    }

    #[test]
    fn test_stem_names() {
        assert!(is_stem_name("A."));
        assert!(!is_stem_name("A"));
        assert!(!is_stem_name("."));
        assert!(!is_stem_name("A.B."));
    }
}
