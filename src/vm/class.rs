// Oryx Classes
// Class records and the behaviour builder. A class's instance behaviour is
// its superclass's behaviour, then each inherited mixin, then its own
// methods, with the class appended to the scope order last.

use super::dictionary::{MethodDictionary, MethodEntry};
use super::gc::{Marker, Trace};
use super::interner::message_name;
use super::method::MethodId;
use super::variables::ScopedVariables;
use super::vm::PackageId;
use crate::arena::{Arena, Id};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type ClassId = Id<Class>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Methods defined directly on a class, in definition order.
/// `None` deletes the name for the class and its subclasses.
type Definitions = Vec<(Arc<str>, Option<MethodId>)>;

pub struct Class {
    name: Arc<str>,
    superclass: Option<ClassId>,
    mixins: Vec<ClassId>,
    package: Option<PackageId>,
    is_mixin: bool,
    serial: u64,
    instance_definitions: Definitions,
    class_definitions: Definitions,
    instance_behaviour: Arc<MethodDictionary>,
    class_behaviour: Arc<MethodDictionary>,
    /// SETMETHOD on the class object itself; not inherited by subclasses
    own_methods: Vec<(Arc<str>, MethodEntry)>,
    own_behaviour: Option<Arc<MethodDictionary>>,
    /// Classes whose behaviour includes this one (subclasses and inheritors)
    dependents: Vec<ClassId>,
    variables: Arc<ScopedVariables>,
}

impl Class {
    pub fn new(name: &str, superclass: Option<ClassId>, package: Option<PackageId>) -> Self {
        Self {
            name: Arc::from(name),
            superclass,
            mixins: Vec::new(),
            package,
            is_mixin: false,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            instance_definitions: Vec::new(),
            class_definitions: Vec::new(),
            instance_behaviour: Arc::new(MethodDictionary::new()),
            class_behaviour: Arc::new(MethodDictionary::new()),
            own_methods: Vec::new(),
            own_behaviour: None,
            dependents: Vec::new(),
            variables: Arc::new(ScopedVariables::new()),
        }
    }

    pub fn mixin(name: &str, superclass: Option<ClassId>, package: Option<PackageId>) -> Self {
        let mut class = Self::new(name, superclass, package);
        class.is_mixin = true;
        class
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass
    }

    pub fn mixins(&self) -> &[ClassId] {
        &self.mixins
    }

    pub fn package(&self) -> Option<PackageId> {
        self.package
    }

    pub fn is_mixin(&self) -> bool {
        self.is_mixin
    }

    pub fn instance_behaviour(&self) -> &Arc<MethodDictionary> {
        &self.instance_behaviour
    }

    pub fn class_behaviour(&self) -> &Arc<MethodDictionary> {
        &self.class_behaviour
    }

    /// Class object variables (class-level attributes, guards)
    pub fn variables(&self) -> &Arc<ScopedVariables> {
        &self.variables
    }

    /// What messages to the class object resolve against
    pub fn object_behaviour(&self) -> &Arc<MethodDictionary> {
        self.own_behaviour.as_ref().unwrap_or(&self.class_behaviour)
    }

    pub(crate) fn set_own_method(&mut self, name: &str, entry: MethodEntry) {
        let name = message_name(name);
        match self.own_methods.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = entry,
            None => self.own_methods.push((name, entry)),
        }
        self.refresh_own_behaviour();
    }

    pub(crate) fn remove_own_method(&mut self, name: &str) -> bool {
        let name = message_name(name);
        let before = self.own_methods.len();
        self.own_methods.retain(|(n, _)| *n != name);
        let removed = self.own_methods.len() != before;
        self.refresh_own_behaviour();
        removed
    }

    fn refresh_own_behaviour(&mut self) {
        if self.own_methods.is_empty() {
            self.own_behaviour = None;
            return;
        }
        let mut dict = (*self.class_behaviour).clone();
        for (name, entry) in &self.own_methods {
            dict.add_instance_method(name, *entry);
        }
        self.own_behaviour = Some(Arc::new(dict));
    }

    pub fn instance_definitions(&self) -> &[(Arc<str>, Option<MethodId>)] {
        &self.instance_definitions
    }

    pub fn class_definitions(&self) -> &[(Arc<str>, Option<MethodId>)] {
        &self.class_definitions
    }

    /// Record an instance method (or a deletion); redefining a name keeps its position
    pub fn add_definition(&mut self, name: &str, method: Option<MethodId>) {
        Self::define_into(&mut self.instance_definitions, name, method);
    }

    pub fn add_class_definition(&mut self, name: &str, method: Option<MethodId>) {
        Self::define_into(&mut self.class_definitions, name, method);
    }

    fn define_into(definitions: &mut Definitions, name: &str, method: Option<MethodId>) {
        let name = message_name(name);
        match definitions.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = method,
            None => definitions.push((name, method)),
        }
    }

    pub(crate) fn add_mixin(&mut self, mixin: ClassId) {
        self.mixins.push(mixin);
    }

    pub(crate) fn add_dependent(&mut self, class: ClassId) {
        if !self.dependents.contains(&class) {
            self.dependents.push(class);
        }
    }

    pub fn dependents(&self) -> &[ClassId] {
        &self.dependents
    }
}

impl Trace for Class {
    fn mark_reachable(&self, marker: &mut Marker) {
        self.instance_behaviour.mark_reachable(marker);
        self.class_behaviour.mark_reachable(marker);
        for (_, entry) in &self.own_methods {
            if let Some(method) = entry.method_id() {
                marker.mark_method(method);
            }
        }
        for (_, method) in self.instance_definitions.iter().chain(&self.class_definitions) {
            if let Some(method) = method {
                marker.mark_method(*method);
            }
        }
        self.variables.mark_reachable(marker);
    }
}

fn apply_definitions(dict: &mut MethodDictionary, definitions: &Definitions, scope: ClassId) {
    for (name, method) in definitions {
        let entry = match method {
            Some(method) => MethodEntry::method(*method, Some(scope)),
            None => MethodEntry::Removed,
        };
        dict.add_method(name, entry);
    }
}

/// Superclass, mixins in inheritance order, then the class's own methods
pub(crate) fn build_instance_behaviour(classes: &Arena<Class>, id: ClassId) -> Option<MethodDictionary> {
    let class = classes.get(id)?;
    let mut dict = MethodDictionary::new();
    if let Some(superclass) = class.superclass.and_then(|s| classes.get(s)) {
        dict.merge(&superclass.instance_behaviour);
    }
    for mixin in class.mixins.iter().filter_map(|m| classes.get(*m)) {
        dict.merge(&mixin.instance_behaviour);
    }
    apply_definitions(&mut dict, &class.instance_definitions, id);
    dict.add_scope(id);
    Some(dict)
}

/// The Class class's instance methods, then inherited class methods, then own
pub(crate) fn build_class_behaviour(
    classes: &Arena<Class>,
    id: ClassId,
    class_class: ClassId,
) -> Option<MethodDictionary> {
    let class = classes.get(id)?;
    let mut dict = MethodDictionary::new();
    if let Some(meta) = classes.get(class_class) {
        dict.merge(&meta.instance_behaviour);
    }
    if let Some(superclass) = class.superclass.and_then(|s| classes.get(s)) {
        dict.merge(&superclass.class_behaviour);
    }
    for mixin in class.mixins.iter().filter_map(|m| classes.get(*m)) {
        dict.merge(&mixin.class_behaviour);
    }
    apply_definitions(&mut dict, &class.class_definitions, id);
    dict.add_scope(id);
    Some(dict)
}

/// `id` and every class whose behaviour includes it, oldest first
pub(crate) fn affected_classes(classes: &Arena<Class>, id: ClassId) -> Vec<ClassId> {
    let mut affected = vec![id];
    let mut index = 0;
    while index < affected.len() {
        if let Some(class) = classes.get(affected[index]) {
            for dependent in &class.dependents {
                if !affected.contains(dependent) {
                    affected.push(*dependent);
                }
            }
        }
        index += 1;
    }
    affected.sort_by_key(|c| classes.get(*c).map(|c| c.serial).unwrap_or(u64::MAX));
    affected
}

/// Rebuild the behaviours of `id` and everything that depends on it
pub(crate) fn rebuild(classes: &mut Arena<Class>, id: ClassId, class_class: ClassId) {
    let affected = affected_classes(classes, id);
    for class in &affected {
        if let Some(dict) = build_instance_behaviour(classes, *class) {
            if let Some(target) = classes.get_mut(*class) {
                target.instance_behaviour = Arc::new(dict);
            }
        }
    }

    // Class-class methods are part of every class object's behaviour
    let class_targets = if affected.contains(&class_class) {
        let mut all = classes.ids();
        all.sort_by_key(|c| classes.get(*c).map(|c| c.serial).unwrap_or(u64::MAX));
        all
    } else {
        affected
    };
    for class in &class_targets {
        if let Some(dict) = build_class_behaviour(classes, *class, class_class) {
            if let Some(target) = classes.get_mut(*class) {
                target.class_behaviour = Arc::new(dict);
                target.refresh_own_behaviour();
            }
        }
    }
    debug!(
        "rebuilt behaviours of {} class(es) after change to {:?}",
        class_targets.len(),
        id
    );
}

/// Is `candidate` an ancestor of `id` (through superclasses or mixins)?
pub(crate) fn inherits_from(classes: &Arena<Class>, id: ClassId, candidate: ClassId) -> bool {
    classes
        .get(id)
        .map(|c| c.instance_behaviour.has_scope(candidate))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::method::Method;

    fn define(classes: &mut Arena<Class>, methods: &mut Arena<Method>, class: ClassId, name: &str) -> MethodId {
        let mut method = Method::constant(name, name.into());
        method.assign_scope(class);
        let id = methods.insert(method);
        classes.get_mut(class).unwrap().add_definition(name, Some(id));
        id
    }

    #[test]
    fn test_behaviour_order_and_rebuild() {
        let mut classes = Arena::new();
        let mut methods = Arena::new();
        let object = classes.insert(Class::new("Object", None, None));
        let meta = classes.insert(Class::new("Class", Some(object), None));
        classes.get_mut(object).unwrap().add_dependent(meta);

        let base = classes.insert(Class::new("Base", Some(object), None));
        classes.get_mut(object).unwrap().add_dependent(base);
        let derived = classes.insert(Class::new("Derived", Some(base), None));
        classes.get_mut(base).unwrap().add_dependent(derived);

        let base_hello = define(&mut classes, &mut methods, base, "hello");
        rebuild(&mut classes, object, meta);

        let derived_behaviour = classes.get(derived).unwrap().instance_behaviour().clone();
        assert_eq!(derived_behaviour.scopes(), &[object, base, derived]);
        assert_eq!(derived_behaviour.get_method("HELLO"), Some(base_hello));
        assert!(inherits_from(&classes, derived, base));
        assert!(!inherits_from(&classes, base, derived));

        // a later override in Base reaches Derived through the rebuild
        let derived_hello = define(&mut classes, &mut methods, derived, "hello");
        rebuild(&mut classes, derived, meta);
        let behaviour = classes.get(derived).unwrap().instance_behaviour().clone();
        assert_eq!(behaviour.get_method("HELLO"), Some(derived_hello));
        assert_eq!(behaviour.find_super_method("HELLO", base), Some(base_hello));
    }

    #[test]
    fn test_mixin_precedes_superclass() {
        let mut classes = Arena::new();
        let mut methods = Arena::new();
        let object = classes.insert(Class::new("Object", None, None));
        let meta = classes.insert(Class::new("Class", Some(object), None));
        let base = classes.insert(Class::new("Base", Some(object), None));
        let mixin = classes.insert(Class::mixin("Printable", Some(object), None));
        let target = classes.insert(Class::new("Target", Some(base), None));
        classes.get_mut(target).unwrap().add_mixin(mixin);
        classes.get_mut(base).unwrap().add_dependent(target);
        classes.get_mut(mixin).unwrap().add_dependent(target);

        define(&mut classes, &mut methods, base, "show");
        let mixed = define(&mut classes, &mut methods, mixin, "show");
        for class in [object, meta, base, mixin, target] {
            rebuild(&mut classes, class, meta);
        }

        let behaviour = classes.get(target).unwrap().instance_behaviour().clone();
        assert_eq!(behaviour.get_method("SHOW"), Some(mixed));
        assert_eq!(behaviour.scopes(), &[object, base, mixin, target]);
        assert_eq!(behaviour.resolve_super_scope(mixin), Some(base));
    }

    #[test]
    fn test_redefinition_keeps_position() {
        let mut class = Class::new("Thing", None, None);
        class.add_definition("a", None);
        class.add_definition("b", None);
        class.add_definition("A", None);
        let names: Vec<&str> = class.instance_definitions().iter().map(|(n, _)| &**n).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_name_keeps_its_case() {
        let class = Class::new("Apple", None, None);
        assert_eq!(&**class.name(), "Apple");
    }
}
