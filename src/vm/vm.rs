// Oryx Virtual Machine
// Owns the class, method, object and package arenas and exposes the object
// model: classes and behaviours, objects, variables, stems and directories.
// Message sending lives in dispatch.rs, collection in gc.rs.

use std::sync::{Arc, Weak};

use crate::arena::{Arena, Id};
use crate::builtins;
use crate::config::RuntimeConfig;
use crate::error::{ErrorKind, OryxError, OryxResult};
use crate::vm::activity::Activity;
use crate::vm::caller::{Activation, SecurityManager};
use crate::vm::class::{self, Class, ClassId};
use crate::vm::compound::{CompoundElement, CompoundTail};
use crate::vm::dictionary::{MethodDictionary, MethodEntry};
use crate::vm::directory::{DirectoryEntry, DirectoryLookup};
use crate::vm::gc::GcState;
use crate::vm::interner::message_name;
use crate::vm::method::{Method, MethodId};
use crate::vm::object::{Object, ObjectId, ObjectRef, Payload, PendingMessage};
use crate::vm::sort::{merge_sort, SortOptions};
use crate::vm::stem::{CompoundRead, Stem};
use crate::vm::value::Value;
use crate::vm::variables::{is_stem_name, VariableDictionary};
use log::debug;
use parking_lot::{Mutex, RwLock};

pub type PackageId = Id<Package>;

/// A unit of code; methods remember the package they were defined in
pub struct Package {
    name: Arc<str>,
    security_manager: Option<Arc<dyn SecurityManager>>,
}

impl Package {
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }
}

/// Ids of the classes every VM starts with
#[derive(Debug, Clone, Copy)]
pub struct BuiltinClasses {
    pub object: ClassId,
    pub class: ClassId,
    pub method: ClassId,
    pub package: ClassId,
    pub string: ClassId,
    pub array: ClassId,
    pub directory: ClassId,
    pub stem: ClassId,
    pub message: ClassId,
}

pub struct VM {
    pub(crate) config: RuntimeConfig,
    pub(crate) classes: RwLock<Arena<Class>>,
    pub(crate) methods: RwLock<Arena<Method>>,
    pub(crate) objects: RwLock<Arena<ObjectRef>>,
    pub(crate) packages: RwLock<Arena<Package>>,
    pub(crate) builtins: BuiltinClasses,
    pub(crate) gc: Mutex<GcState>,
    security_manager: RwLock<Option<Arc<dyn SecurityManager>>>,
    self_ref: Weak<VM>,
}

fn bootstrap_class(classes: &mut Arena<Class>, name: &str, superclass: Option<ClassId>) -> ClassId {
    let id = classes.insert(Class::new(name, superclass, None));
    if let Some(parent) = superclass.and_then(|s| classes.get_mut(s)) {
        parent.add_dependent(id);
    }
    id
}

fn bootstrap(classes: &mut Arena<Class>, methods: &mut Arena<Method>) -> BuiltinClasses {
    let object = bootstrap_class(classes, "Object", None);
    let builtins = BuiltinClasses {
        object,
        class: bootstrap_class(classes, "Class", Some(object)),
        method: bootstrap_class(classes, "Method", Some(object)),
        package: bootstrap_class(classes, "Package", Some(object)),
        string: bootstrap_class(classes, "String", Some(object)),
        array: bootstrap_class(classes, "Array", Some(object)),
        directory: bootstrap_class(classes, "Directory", Some(object)),
        stem: bootstrap_class(classes, "Stem", Some(object)),
        message: bootstrap_class(classes, "Message", Some(object)),
    };
    builtins::register(classes, methods, &builtins);
    class::rebuild(classes, object, builtins.class);
    builtins
}

impl VM {
    pub fn new() -> Arc<VM> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Arc<VM> {
        let mut classes = Arena::new();
        let mut methods = Arena::new();
        let builtins = bootstrap(&mut classes, &mut methods);
        debug!("bootstrapped {} classes, {} native methods", classes.len(), methods.len());

        Arc::new_cyclic(|self_ref| VM {
            gc: Mutex::new(GcState::new(config.gc_initial_threshold)),
            config,
            classes: RwLock::new(classes),
            methods: RwLock::new(methods),
            objects: RwLock::new(Arena::new()),
            packages: RwLock::new(Arena::new()),
            builtins,
            security_manager: RwLock::new(None),
            self_ref: self_ref.clone(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn builtins(&self) -> &BuiltinClasses {
        &self.builtins
    }

    /// A strong handle to this VM (for work moved to other threads)
    pub fn handle(&self) -> OryxResult<Arc<VM>> {
        self.self_ref
            .upgrade()
            .ok_or_else(|| OryxError::new(ErrorKind::Activity, "The VM is shutting down"))
    }

    /// Top-level context on a fresh activity
    pub fn root_activation(&self) -> Activation {
        Activation::root(Activity::new("main"))
    }

    // ==================== Packages & security ====================

    pub fn create_package(&self, name: &str) -> PackageId {
        self.packages.write().insert(Package {
            name: Arc::from(name),
            security_manager: None,
        })
    }

    pub fn package_name(&self, id: PackageId) -> Option<Arc<str>> {
        self.packages.read().get(id).map(|p| p.name.clone())
    }

    pub fn set_package_security_manager(
        &self,
        package: PackageId,
        manager: Option<Arc<dyn SecurityManager>>,
    ) -> OryxResult<()> {
        let mut packages = self.packages.write();
        let package = packages.get_mut(package).ok_or_else(|| OryxError::dead_object("package"))?;
        package.security_manager = manager;
        Ok(())
    }

    /// VM-wide manager, used when the calling package has none
    pub fn set_security_manager(&self, manager: Option<Arc<dyn SecurityManager>>) {
        *self.security_manager.write() = manager;
    }

    pub(crate) fn security_manager_for(&self, activation: &Activation) -> Option<Arc<dyn SecurityManager>> {
        let from_package = activation
            .package
            .and_then(|p| self.packages.read().get(p).and_then(|p| p.security_manager.clone()));
        from_package.or_else(|| self.security_manager.read().clone())
    }

    // ==================== Methods ====================

    pub fn add_method(&self, method: Method) -> MethodId {
        self.methods.write().insert(method)
    }

    pub fn method(&self, id: MethodId) -> OryxResult<Method> {
        self.methods
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| OryxError::dead_object("method"))
    }

    pub fn update_method<F>(&self, id: MethodId, update: F) -> OryxResult<()>
    where
        F: FnOnce(&mut Method),
    {
        let mut methods = self.methods.write();
        let method = methods.get_mut(id).ok_or_else(|| OryxError::dead_object("method"))?;
        update(method);
        Ok(())
    }

    /// The method with scope `scope`: an unscoped method is scoped in place,
    /// a method scoped elsewhere is copied
    pub fn new_scope(&self, id: MethodId, scope: ClassId) -> OryxResult<MethodId> {
        let mut methods = self.methods.write();
        let method = methods.get_mut(id).ok_or_else(|| OryxError::dead_object("method"))?;
        match method.scope() {
            None => {
                method.assign_scope(scope);
                Ok(id)
            }
            Some(existing) if existing == scope => Ok(id),
            Some(_) => {
                let copy = method.new_scope(scope);
                Ok(methods.insert(copy))
            }
        }
    }

    /// Accept a method argument given as a Method value
    pub fn method_argument(&self, value: &Value) -> OryxResult<MethodId> {
        match value {
            Value::Method(id) if self.methods.read().contains(*id) => Ok(*id),
            Value::Method(_) => Err(OryxError::dead_object("method")),
            other => Err(OryxError::invalid_argument(format!(
                "Expected a method, got {}",
                other.type_name()
            ))),
        }
    }

    // ==================== Classes ====================

    fn class_ref<R>(&self, id: ClassId, read: impl FnOnce(&Class) -> R) -> OryxResult<R> {
        let classes = self.classes.read();
        let class = classes.get(id).ok_or_else(|| OryxError::dead_object("class"))?;
        Ok(read(class))
    }

    pub fn class_name(&self, id: ClassId) -> Arc<str> {
        self.class_ref(id, |c| c.name().clone())
            .unwrap_or_else(|_| Arc::from("?"))
    }

    pub fn superclass(&self, id: ClassId) -> OryxResult<Option<ClassId>> {
        self.class_ref(id, |c| c.superclass())
    }

    pub fn instance_behaviour(&self, id: ClassId) -> OryxResult<Arc<MethodDictionary>> {
        self.class_ref(id, |c| c.instance_behaviour().clone())
    }

    pub fn class_behaviour(&self, id: ClassId) -> OryxResult<Arc<MethodDictionary>> {
        self.class_ref(id, |c| c.class_behaviour().clone())
    }

    pub fn create_class(&self, name: &str, superclass: Option<ClassId>, package: Option<PackageId>) -> OryxResult<ClassId> {
        self.insert_class(Class::new(name, Some(superclass.unwrap_or(self.builtins.object)), package))
    }

    pub fn subclass(&self, parent: ClassId, name: &str) -> OryxResult<ClassId> {
        let package = self.class_ref(parent, |c| c.package())?;
        self.insert_class(Class::new(name, Some(parent), package))
    }

    /// A class meant to be inherited as a mixin
    pub fn mixin_class(&self, parent: ClassId, name: &str) -> OryxResult<ClassId> {
        let package = self.class_ref(parent, |c| c.package())?;
        self.insert_class(Class::mixin(name, Some(parent), package))
    }

    fn insert_class(&self, class: Class) -> OryxResult<ClassId> {
        let superclass = class.superclass();
        let mut classes = self.classes.write();
        if let Some(parent) = superclass {
            if !classes.contains(parent) {
                return Err(OryxError::dead_object("class"));
            }
        }
        let name = class.name().clone();
        let id = classes.insert(class);
        if let Some(parent) = superclass.and_then(|p| classes.get_mut(p)) {
            parent.add_dependent(id);
        }
        class::rebuild(&mut classes, id, self.builtins.class);
        debug!("created class {} {:?}", name, id);
        Ok(id)
    }

    /// Add `mixin` to the classes `class` inherits from
    pub fn inherit(&self, class: ClassId, mixin: ClassId) -> OryxResult<()> {
        let mut classes = self.classes.write();
        let mixin_class = classes.get(mixin).ok_or_else(|| OryxError::dead_object("class"))?;
        if !mixin_class.is_mixin() {
            return Err(OryxError::invalid_argument(format!(
                "Class {} is not a mixin class",
                mixin_class.name()
            )));
        }
        if class::inherits_from(&classes, class, mixin) {
            return Err(OryxError::invalid_argument(format!(
                "Class {} already inherits from {}",
                classes.get(class).map(|c| c.name().clone()).unwrap_or_else(|| Arc::from("?")),
                mixin_class.name()
            )));
        }
        if class::inherits_from(&classes, mixin, class) {
            return Err(OryxError::invalid_argument(format!(
                "Class {} is a subclass of the inheriting class",
                mixin_class.name()
            )));
        }
        classes
            .get_mut(class)
            .ok_or_else(|| OryxError::dead_object("class"))?
            .add_mixin(mixin);
        if let Some(mixin) = classes.get_mut(mixin) {
            mixin.add_dependent(class);
        }
        class::rebuild(&mut classes, class, self.builtins.class);
        Ok(())
    }

    /// Define (Some) or delete (None) an instance method of `class`.
    /// The class and all of its dependents see the change immediately.
    pub fn define(&self, class: ClassId, name: &str, method: Option<Method>) -> OryxResult<Option<MethodId>> {
        let method = match method {
            Some(method) => Some(self.add_method(method)),
            None => None,
        };
        self.define_method_id(class, name, method)?;
        Ok(method)
    }

    pub fn define_method_id(&self, class: ClassId, name: &str, method: Option<MethodId>) -> OryxResult<()> {
        let method = match method {
            Some(id) => Some(self.new_scope(id, class)?),
            None => None,
        };
        let mut classes = self.classes.write();
        classes
            .get_mut(class)
            .ok_or_else(|| OryxError::dead_object("class"))?
            .add_definition(name, method);
        class::rebuild(&mut classes, class, self.builtins.class);
        debug!("defined {} on {:?}", message_name(name), class);
        Ok(())
    }

    pub fn define_class_method(&self, class: ClassId, name: &str, method: Option<Method>) -> OryxResult<Option<MethodId>> {
        let method = match method {
            Some(method) => Some(self.new_scope(self.add_method(method), class)?),
            None => None,
        };
        let mut classes = self.classes.write();
        classes
            .get_mut(class)
            .ok_or_else(|| OryxError::dead_object("class"))?
            .add_class_definition(name, method);
        class::rebuild(&mut classes, class, self.builtins.class);
        Ok(method)
    }

    pub fn delete_method(&self, class: ClassId, name: &str) -> OryxResult<()> {
        self.define_method_id(class, name, None)
    }

    /// Is `class` the same as, or does it inherit from, `other`?
    pub fn is_compatible_with(&self, class: ClassId, other: ClassId) -> bool {
        class::inherits_from(&self.classes.read(), class, other)
    }

    /// The scope searched after `scope` in `class`'s instance behaviour
    pub fn super_scope(&self, class: ClassId, scope: ClassId) -> OryxResult<Option<ClassId>> {
        Ok(self.instance_behaviour(class)?.resolve_super_scope(scope))
    }

    pub fn class_of(&self, value: &Value) -> ClassId {
        match value {
            Value::Nil => self.builtins.object,
            Value::String(_) => self.builtins.string,
            Value::Array(_) => self.builtins.array,
            Value::Object(id) => self
                .objects
                .read()
                .get(*id)
                .map(|o| o.class())
                .unwrap_or(self.builtins.object),
            Value::Class(_) => self.builtins.class,
            Value::Method(_) => self.builtins.method,
            Value::Package(_) => self.builtins.package,
        }
    }

    pub fn is_instance_of(&self, value: &Value, class: ClassId) -> bool {
        match self.behaviour_of(value) {
            Ok(behaviour) if !matches!(value, Value::Class(_)) => behaviour.has_scope(class),
            _ => self.is_compatible_with(self.class_of(value), class),
        }
    }

    /// The method table messages to `value` are looked up in
    pub fn behaviour_of(&self, value: &Value) -> OryxResult<Arc<MethodDictionary>> {
        match value {
            Value::Object(id) => {
                let object = self.object(*id)?;
                match object.own_behaviour() {
                    Some(own) => Ok(own),
                    None => self.instance_behaviour(object.class()),
                }
            }
            Value::Class(id) => self.class_ref(*id, |c| c.object_behaviour().clone()),
            other => self.instance_behaviour(self.class_of(other)),
        }
    }

    // ==================== Objects ====================

    pub fn object(&self, id: ObjectId) -> OryxResult<ObjectRef> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| OryxError::dead_object("object"))
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    pub(crate) fn insert_object(&self, object: Object) -> ObjectId {
        self.objects.write().insert(Arc::new(object))
    }

    /// Allocate an instance of `class` without running INIT
    pub fn allocate(&self, class: ClassId, args: &[Value]) -> OryxResult<ObjectId> {
        let behaviour = self.instance_behaviour(class)?;
        let payload = if behaviour.has_scope(self.builtins.directory) {
            Payload::Directory(Mutex::new(Default::default()))
        } else if behaviour.has_scope(self.builtins.stem) {
            let name = args.first().and_then(|a| a.as_str()).unwrap_or("");
            Payload::Stem(Mutex::new(Stem::new(message_name(name))))
        } else if behaviour.has_scope(self.builtins.message) {
            let target = args.first().cloned().unwrap_or(Value::Nil);
            let message = args.get(1).and_then(|a| a.as_str()).unwrap_or("");
            let rest = args.iter().skip(2).cloned().collect();
            Payload::Message(PendingMessage::new(target, message_name(message), rest))
        } else {
            Payload::None
        };
        let object = Object::new(class, payload);
        object.set_has_uninit(behaviour.has_method("UNINIT"));
        Ok(self.insert_object(object))
    }

    /// Create an instance and send it INIT with `args`
    pub fn new_instance(&self, activation: &Activation, class: ClassId, args: &[Value]) -> OryxResult<Value> {
        let object = Value::Object(self.allocate(class, args)?);
        self.send_message(activation, &object, "INIT", args)?;
        Ok(object)
    }

    pub fn new_directory(&self) -> Value {
        Value::Object(self.insert_object(Object::new(
            self.builtins.directory,
            Payload::Directory(Mutex::new(Default::default())),
        )))
    }

    pub fn new_stem(&self, name: &str) -> Value {
        Value::Object(self.insert_object(Object::new(
            self.builtins.stem,
            Payload::Stem(Mutex::new(Stem::new(message_name(name)))),
        )))
    }

    /// "a FOO" / "an APPLE", or the name set with OBJECTNAME=
    pub fn default_name(&self, value: &Value) -> String {
        match value {
            Value::Nil => "The NIL object".to_string(),
            Value::String(s) => s.to_string(),
            Value::Class(id) => format!("The {} class", self.class_name(*id)),
            Value::Object(id) => {
                if let Some(name) = self.objects.read().get(*id).and_then(|o| o.object_name()) {
                    return name.to_string();
                }
                let class = self.class_name(self.class_of(value));
                let article = match class.chars().next() {
                    Some('A' | 'E' | 'I' | 'O' | 'U') => "an",
                    _ => "a",
                };
                format!("{} {}", article, class)
            }
            other => format!("a {}", self.class_name(self.class_of(other))),
        }
    }

    /// String form of a value: strings as is, anything else through STRING
    pub fn string_value(&self, activation: &Activation, value: &Value) -> OryxResult<Arc<str>> {
        if let Value::String(s) = value {
            return Ok(s.clone());
        }
        match self.send_message(activation, value, "STRING", &[])? {
            Value::String(s) => Ok(s),
            _ => Ok(Arc::from(self.default_name(value))),
        }
    }

    /// Object variables of `receiver` for `scope`
    pub fn object_variables(&self, receiver: &Value, scope: Option<ClassId>) -> OryxResult<Arc<VariableDictionary>> {
        match receiver {
            Value::Object(id) => Ok(self.object(*id)?.variables().get(scope)),
            Value::Class(id) => Ok(self.class_ref(*id, |c| c.variables().clone())?.get(scope)),
            other => Err(OryxError::invalid_argument(format!(
                "{} has no object variables",
                other.type_name()
            ))),
        }
    }

    /// SETMETHOD: add `method` to this receiver only. With `object_scope`
    /// the method is scoped to the receiver's class, otherwise it floats.
    pub fn set_instance_method(
        &self,
        receiver: &Value,
        name: &str,
        method: Option<MethodId>,
        object_scope: bool,
    ) -> OryxResult<()> {
        let entry = match method {
            Some(id) => {
                let id = if object_scope {
                    self.new_scope(id, self.class_of(receiver))?
                } else {
                    id
                };
                let scope = self.method(id)?.scope();
                MethodEntry::method(id, scope)
            }
            None => MethodEntry::Removed,
        };
        match receiver {
            Value::Object(id) => {
                let object = self.object(*id)?;
                let class_behaviour = self.instance_behaviour(object.class())?;
                object.add_instance_method(&class_behaviour, name, entry);
                if message_name(name).as_ref() == "UNINIT" {
                    object.set_has_uninit(true);
                }
            }
            Value::Class(id) => {
                let mut classes = self.classes.write();
                classes
                    .get_mut(*id)
                    .ok_or_else(|| OryxError::dead_object("class"))?
                    .set_own_method(name, entry);
            }
            other => {
                return Err(OryxError::invalid_argument(format!(
                    "Cannot add methods to a {}",
                    other.type_name()
                )))
            }
        }
        debug!("setMethod {} on {}", message_name(name), self.default_name(receiver));
        Ok(())
    }

    /// UNSETMETHOD
    pub fn unset_instance_method(&self, receiver: &Value, name: &str) -> OryxResult<bool> {
        match receiver {
            Value::Object(id) => Ok(self.object(*id)?.remove_instance_method(name)),
            Value::Class(id) => {
                let mut classes = self.classes.write();
                let class = classes.get_mut(*id).ok_or_else(|| OryxError::dead_object("class"))?;
                Ok(class.remove_own_method(name))
            }
            _ => Ok(false),
        }
    }

    /// COPY: a new object with duplicated variables and payload
    pub fn copy(&self, value: &Value) -> OryxResult<Value> {
        match value {
            Value::Object(id) => {
                let object = self.object(*id)?;
                let payload = match object.payload() {
                    Payload::None => Payload::None,
                    Payload::Directory(directory) => Payload::Directory(Mutex::new(directory.lock().clone())),
                    Payload::Stem(stem) => Payload::Stem(Mutex::new(stem.lock().copy())),
                    Payload::Message(message) => Payload::Message(PendingMessage::new(
                        message.target().clone(),
                        message.message().clone(),
                        message.args().to_vec(),
                    )),
                };
                let copy = object.copy_with(payload);
                // stems held in object variables are not shared with the copy
                for dictionary in copy.variables().all() {
                    for (name, stem) in dictionary.stems() {
                        let stem = Value::Object(stem);
                        if self.stem_object(&stem).is_err() {
                            continue;
                        }
                        let duplicate = self.copy(&stem)?;
                        dictionary.set(&name, duplicate);
                    }
                }
                Ok(Value::Object(self.insert_object(copy)))
            }
            Value::Array(items) => Ok(Value::array(items.lock().clone())),
            Value::Method(id) => Ok(Value::Method(self.add_method(self.method(*id)?))),
            Value::Class(_) => Err(OryxError::invalid_argument("Classes cannot be copied")),
            other => Ok(other.clone()),
        }
    }

    // ==================== Stems & compound variables ====================

    pub(crate) fn stem_object(&self, value: &Value) -> OryxResult<ObjectRef> {
        let object = match value {
            Value::Object(id) => self.object(*id)?,
            other => {
                return Err(OryxError::invalid_argument(format!(
                    "Expected a stem, got {}",
                    other.type_name()
                )))
            }
        };
        if object.stem().is_none() {
            return Err(OryxError::invalid_argument("Expected a stem object"));
        }
        Ok(object)
    }

    pub(crate) fn with_stem<R>(&self, value: &Value, f: impl FnOnce(&mut Stem) -> R) -> OryxResult<R> {
        let object = self.stem_object(value)?;
        match object.stem() {
            Some(stem) => Ok(f(&mut stem.lock())),
            None => Err(OryxError::invalid_argument("Expected a stem object")),
        }
    }

    fn check_stem_name(name: &str) -> OryxResult<()> {
        if is_stem_name(name) {
            Ok(())
        } else {
            Err(OryxError::invalid_argument(format!("\"{}\" is not a stem variable name", name)))
        }
    }

    /// The stem held by stem variable `name` ("A."), created on first use
    pub fn stem_variable(&self, variables: &VariableDictionary, name: &str) -> OryxResult<Value> {
        Self::check_stem_name(name)?;
        let cell = variables.variable(name);
        if let Some(value) = cell.value() {
            if self.stem_object(&value).is_ok() {
                return Ok(value);
            }
        }
        let stem = self.new_stem(cell.name());
        cell.set(stem.clone());
        Ok(stem)
    }

    /// Assign a bare stem (`A. = value`). Assigning a stem object makes the
    /// variable refer to that stem; anything else becomes the new default
    /// and clears every tail.
    pub fn assign_stem(&self, variables: &VariableDictionary, name: &str, value: Value) -> OryxResult<()> {
        Self::check_stem_name(name)?;
        if self.stem_object(&value).is_ok() {
            variables.set(name, value);
            return Ok(());
        }
        let stem = self.stem_variable(variables, name)?;
        self.with_stem(&stem, |s| s.set_value(value))
    }

    /// DROP of a stem variable: it gets a fresh stem
    pub fn drop_stem(&self, variables: &VariableDictionary, name: &str) -> OryxResult<()> {
        Self::check_stem_name(name)?;
        variables.set(name, self.new_stem(&message_name(name)));
        Ok(())
    }

    /// Read `name.tail` with NOVALUE handling
    pub fn evaluate_compound(
        &self,
        activation: &Activation,
        variables: &VariableDictionary,
        stem_name: &str,
        tail: &CompoundTail,
    ) -> OryxResult<Value> {
        let stem = self.stem_variable(variables, stem_name)?;
        let read = self.with_stem(&stem, |s| s.evaluate(tail, &message_name(stem_name)))?;
        self.resolve_read(activation, read)
    }

    /// Turn a read without value into the NOVALUE result
    pub fn resolve_read(&self, activation: &Activation, read: CompoundRead) -> OryxResult<Value> {
        match read {
            CompoundRead::Value(value) => Ok(value),
            CompoundRead::NoValue { name, default, element } => match &activation.novalue {
                Some(handler) => handler.handle_novalue_event(&name, default, element.as_ref()),
                None => Ok(default),
            },
        }
    }

    pub fn set_compound(
        &self,
        variables: &VariableDictionary,
        stem_name: &str,
        tail: &CompoundTail,
        value: Value,
    ) -> OryxResult<()> {
        let stem = self.stem_variable(variables, stem_name)?;
        self.with_stem(&stem, |s| s.set(tail, value))
    }

    pub fn drop_compound(&self, variables: &VariableDictionary, stem_name: &str, tail: &CompoundTail) -> OryxResult<()> {
        let stem = self.stem_variable(variables, stem_name)?;
        self.with_stem(&stem, |s| {
            s.drop_element(tail);
        })
    }

    /// The element behind `name.tail`, created when missing (guard targets)
    pub fn compound_element(
        &self,
        variables: &VariableDictionary,
        stem_name: &str,
        tail: &CompoundTail,
    ) -> OryxResult<Arc<CompoundElement>> {
        let stem = self.stem_variable(variables, stem_name)?;
        self.with_stem(&stem, |s| s.element(tail))
    }

    /// PROCEDURE EXPOSE of a whole stem: `to` shares the stem variable of `from`
    pub fn expose_stem(&self, from: &VariableDictionary, to: &VariableDictionary, name: &str) -> OryxResult<()> {
        self.stem_variable(from, name)?;
        to.expose_variable(from, name);
        Ok(())
    }

    /// PROCEDURE EXPOSE of one compound variable: `name.tail` in `to`
    /// becomes an alias of the element in `from`
    pub fn expose_compound(
        &self,
        from: &VariableDictionary,
        to: &VariableDictionary,
        stem_name: &str,
        tail: &CompoundTail,
    ) -> OryxResult<Arc<CompoundElement>> {
        let source = self.stem_variable(from, stem_name)?;
        let real = self.with_stem(&source, |s| s.expose(tail))?;
        let target = self.stem_variable(to, stem_name)?;
        self.with_stem(&target, |s| s.alias(tail, &real))
    }

    /// Sort `prefix.first` .. `prefix.last` of a stem by string value.
    /// The stem is only written once every check has passed.
    pub fn sort_stem(
        &self,
        activation: &Activation,
        stem: &Value,
        prefix: &str,
        first: usize,
        last: Option<usize>,
        options: SortOptions,
    ) -> OryxResult<()> {
        let range = self.with_stem(stem, |s| s.sort_range(prefix, first, last))??;
        if range.is_empty() {
            return Ok(());
        }

        // private working copy; the stem lock is not held while sorting
        let mut working = Vec::with_capacity(range.values.len());
        for value in &range.values {
            working.push(self.string_value(activation, value)?);
        }
        merge_sort(&mut working, self.config.sort_insertion_cutoff, |a, b| options.compare(a, b));

        range.write_back(working.into_iter().map(Value::String).collect());
        Ok(())
    }

    // ==================== Directories ====================

    pub(crate) fn directory_object(&self, value: &Value) -> OryxResult<ObjectRef> {
        let object = match value {
            Value::Object(id) => self.object(*id)?,
            other => {
                return Err(OryxError::invalid_argument(format!(
                    "Expected a directory, got {}",
                    other.type_name()
                )))
            }
        };
        if object.directory().is_none() {
            return Err(OryxError::invalid_argument("Expected a directory object"));
        }
        Ok(object)
    }

    fn with_directory<R>(&self, value: &Value, f: impl FnOnce(&mut crate::vm::directory::Directory) -> R) -> OryxResult<R> {
        let object = self.directory_object(value)?;
        match object.directory() {
            Some(directory) => Ok(f(&mut directory.lock())),
            None => Err(OryxError::invalid_argument("Expected a directory object")),
        }
    }

    /// AT: stored value, else computed entry, else UNKNOWN; None when all miss
    pub fn directory_get(&self, activation: &Activation, directory: &Value, index: &str) -> OryxResult<Option<Value>> {
        let lookup = self.with_directory(directory, |d| d.lookup(index))?;
        match lookup {
            DirectoryLookup::Found(value) => Ok(Some(value)),
            DirectoryLookup::Compute(method) => {
                self.run_method(activation, directory, method, index, &[]).map(Some)
            }
            DirectoryLookup::Unknown(method) => self
                .run_method(activation, directory, method, "UNKNOWN", &[Value::string(index)])
                .map(Some),
            DirectoryLookup::Missing => Ok(None),
        }
    }

    pub fn directory_put(&self, directory: &Value, index: &str, value: Value) -> OryxResult<()> {
        self.with_directory(directory, |d| d.put(value, index))
    }

    /// SETMETHOD on a directory: install a computed entry (or UNKNOWN)
    pub fn directory_set_method(&self, directory: &Value, name: &str, method: Option<MethodId>) -> OryxResult<()> {
        let method = match method {
            Some(id) => Some(self.new_scope(id, self.builtins.directory)?),
            None => None,
        };
        self.with_directory(directory, |d| d.set_method(name, method))
    }

    /// REMOVE: a computed entry is run one last time for its value
    pub fn directory_remove(&self, activation: &Activation, directory: &Value, index: &str) -> OryxResult<Option<Value>> {
        match self.with_directory(directory, |d| d.remove(index))? {
            Some(DirectoryEntry::Explicit(value)) => Ok(Some(value)),
            Some(DirectoryEntry::Computed(method)) => {
                self.run_method(activation, directory, method, index, &[]).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn directory_has_index(&self, directory: &Value, index: &str) -> OryxResult<bool> {
        self.with_directory(directory, |d| d.has_index(index))
    }

    pub fn directory_items(&self, directory: &Value) -> OryxResult<usize> {
        self.with_directory(directory, |d| d.items())
    }

    pub fn directory_indexes(&self, directory: &Value) -> OryxResult<Vec<Value>> {
        self.with_directory(directory, |d| d.all_indexes())
    }

    /// Every value, running computed entries
    pub fn directory_all_items(&self, activation: &Activation, directory: &Value) -> OryxResult<Vec<Value>> {
        let entries = self.with_directory(directory, |d| d.snapshot())?;
        let mut items = Vec::with_capacity(entries.len());
        for (index, entry) in entries {
            items.push(match entry {
                DirectoryEntry::Explicit(value) => value,
                DirectoryEntry::Computed(method) => self.run_method(activation, directory, method, &index, &[])?,
            });
        }
        Ok(items)
    }

    /// Reverse lookup; computed entries are run (every one) only when no
    /// stored value matches
    pub fn directory_index_of(&self, activation: &Activation, directory: &Value, target: &Value) -> OryxResult<Option<Arc<str>>> {
        let (found, computed) = self.with_directory(directory, |d| (d.index_of_value(target), d.computed()))?;
        if found.is_some() {
            return Ok(found);
        }
        for (index, method) in computed {
            let value = self.run_method(activation, directory, method, &index, &[])?;
            if value.identical(target) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn directory_empty(&self, directory: &Value) -> OryxResult<()> {
        self.with_directory(directory, |d| d.empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::method::MethodFlags;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn returning(name: &str, value: &'static str) -> Method {
        Method::from_fn(name, move |_, _, _, _| Ok(Value::from(value)))
    }

    fn send(vm: &VM, receiver: &Value, message: &str, args: &[Value]) -> OryxResult<Value> {
        vm.send_message(&vm.root_activation(), receiver, message, args)
    }

    #[test]
    fn test_bootstrap_classes() {
        let vm = VM::new();
        let builtins = *vm.builtins();
        assert_eq!(&*vm.class_name(builtins.directory), "Directory");
        assert!(vm.is_compatible_with(builtins.stem, builtins.object));
        assert_eq!(vm.superclass(builtins.object).unwrap(), None);
        // class objects answer the instance methods of Class
        assert!(vm.behaviour_of(&Value::Class(builtins.stem)).unwrap().has_method("subclass"));
    }

    #[test]
    fn test_new_scope_reuses_or_copies() {
        let vm = VM::new();
        let first = vm.create_class("First", None, None).unwrap();
        let second = vm.create_class("Second", None, None).unwrap();
        let id = vm.add_method(returning("m", "x"));

        let scoped = vm.new_scope(id, first).unwrap();
        assert_eq!(scoped, id);
        assert_eq!(vm.new_scope(id, first).unwrap(), id);

        let copy = vm.new_scope(id, second).unwrap();
        assert_ne!(copy, id);
        assert_eq!(vm.method(copy).unwrap().scope(), Some(second));
        assert_eq!(vm.method(id).unwrap().scope(), Some(first));
    }

    #[test]
    fn test_define_reaches_existing_subclasses() {
        let vm = VM::new();
        let root = vm.root_activation();
        let animal = vm.create_class("Animal", None, None).unwrap();
        let dog = vm.subclass(animal, "Dog").unwrap();
        let rex = vm.new_instance(&root, dog, &[]).unwrap();

        vm.define(animal, "speak", Some(returning("speak", "..."))).unwrap();
        assert_eq!(send(&vm, &rex, "speak", &[]).unwrap(), Value::from("..."));

        vm.define(dog, "speak", Some(returning("speak", "woof"))).unwrap();
        assert_eq!(send(&vm, &rex, "speak", &[]).unwrap(), Value::from("woof"));

        // a tombstone hides the inherited method too
        vm.delete_method(dog, "speak").unwrap();
        assert!(send(&vm, &rex, "speak", &[]).unwrap_err().is(ErrorKind::NoMethod));
        assert_eq!(vm.super_scope(dog, dog).unwrap(), Some(animal));
    }

    #[test]
    fn test_inherit_rules() {
        let vm = VM::new();
        let object = vm.builtins().object;
        let base = vm.create_class("Base", None, None).unwrap();
        let plain = vm.create_class("Plain", None, None).unwrap();
        let printable = vm.mixin_class(object, "Printable").unwrap();
        vm.define(base, "show", Some(returning("show", "base"))).unwrap();
        vm.define(printable, "show", Some(returning("show", "mixin"))).unwrap();
        let target = vm.subclass(base, "Target").unwrap();

        assert!(vm.inherit(target, plain).unwrap_err().is(ErrorKind::InvalidArgument));
        vm.inherit(target, printable).unwrap();
        assert!(vm.inherit(target, printable).unwrap_err().is(ErrorKind::InvalidArgument));

        let root = vm.root_activation();
        let obj = vm.new_instance(&root, target, &[]).unwrap();
        assert_eq!(send(&vm, &obj, "show", &[]).unwrap(), Value::from("mixin"));
        assert!(vm.is_instance_of(&obj, printable));
        assert_eq!(
            vm.send_message_scoped(&root, &obj, "show", &[], base).unwrap(),
            Value::from("base")
        );
    }

    #[test]
    fn test_class_methods_and_own_methods() {
        let vm = VM::new();
        let parent = vm.create_class("Parent", None, None).unwrap();
        let child = vm.subclass(parent, "Child").unwrap();
        vm.define_class_method(parent, "make", Some(returning("make", "made"))).unwrap();
        assert_eq!(send(&vm, &Value::Class(child), "make", &[]).unwrap(), Value::from("made"));

        // SETMETHOD on a class object stays with that class object
        let own = vm.add_method(returning("tag", "parent only"));
        vm.set_instance_method(&Value::Class(parent), "tag", Some(own), false).unwrap();
        assert_eq!(send(&vm, &Value::Class(parent), "tag", &[]).unwrap(), Value::from("parent only"));
        assert!(send(&vm, &Value::Class(child), "tag", &[]).unwrap_err().is(ErrorKind::NoMethod));

        // and survives later class-method definitions
        vm.define_class_method(parent, "other", Some(returning("other", "x"))).unwrap();
        assert_eq!(send(&vm, &Value::Class(parent), "tag", &[]).unwrap(), Value::from("parent only"));
        assert!(vm.unset_instance_method(&Value::Class(parent), "tag").unwrap());
        assert!(send(&vm, &Value::Class(parent), "tag", &[]).is_err());
    }

    #[test]
    fn test_set_method_is_per_object() {
        let vm = VM::new();
        let root = vm.root_activation();
        let class = vm.create_class("Widget", None, None).unwrap();
        let first = vm.new_instance(&root, class, &[]).unwrap();
        let second = vm.new_instance(&root, class, &[]).unwrap();

        let hello = vm.add_method(returning("hello", "hi"));
        vm.set_instance_method(&first, "hello", Some(hello), false).unwrap();
        assert_eq!(send(&vm, &first, "hello", &[]).unwrap(), Value::from("hi"));
        assert!(send(&vm, &second, "hello", &[]).is_err());

        // the copy gets its own table on its next SETMETHOD
        let copy = vm.copy(&first).unwrap();
        let bye = vm.add_method(returning("bye", "bye"));
        vm.set_instance_method(&copy, "bye", Some(bye), false).unwrap();
        assert_eq!(send(&vm, &copy, "hello", &[]).unwrap(), Value::from("hi"));
        assert!(send(&vm, &first, "bye", &[]).is_err());

        assert!(vm.unset_instance_method(&first, "hello").unwrap());
        assert!(!vm.unset_instance_method(&first, "hello").unwrap());
        assert!(send(&vm, &first, "hello", &[]).is_err());
    }

    #[test]
    fn test_unset_method_restores_after_repeated_removal() {
        let vm = VM::new();
        let root = vm.root_activation();
        let class = vm.create_class("Greeter", None, None).unwrap();
        vm.define(class, "greet", Some(returning("greet", "hello"))).unwrap();
        let obj = vm.new_instance(&root, class, &[]).unwrap();

        for _ in 0..3 {
            vm.set_instance_method(&obj, "greet", None, false).unwrap();
        }
        assert!(send(&vm, &obj, "greet", &[]).unwrap_err().is(ErrorKind::NoMethod));
        assert_eq!(vm.behaviour_of(&obj).unwrap().entries("GREET").len(), 2);

        assert!(vm.unset_instance_method(&obj, "greet").unwrap());
        assert_eq!(send(&vm, &obj, "greet", &[]).unwrap(), Value::from("hello"));
        assert!(!vm.unset_instance_method(&obj, "greet").unwrap());
    }

    #[test]
    fn test_attribute_methods_share_the_class_variable() {
        let vm = VM::new();
        let root = vm.root_activation();
        let class = vm.create_class("Account", None, None).unwrap();
        send(&vm, &Value::Class(class), "attribute", &[Value::from("balance")]).unwrap();
        let account = vm.new_instance(&root, class, &[]).unwrap();

        assert_eq!(send(&vm, &account, "balance", &[]).unwrap(), Value::from("BALANCE"));
        send(&vm, &account, "balance=", &[Value::from("10")]).unwrap();
        assert_eq!(send(&vm, &account, "balance", &[]).unwrap(), Value::from("10"));
        assert_eq!(
            vm.object_variables(&account, Some(class)).unwrap().get("BALANCE"),
            Some(Value::from("10"))
        );

        let getter = vm.behaviour_of(&account).unwrap().get_method("BALANCE").unwrap();
        assert!(vm.method(getter).unwrap().flags().contains(MethodFlags::ATTRIBUTE));
    }

    #[test]
    fn test_set_method_object_scope() {
        let vm = VM::new();
        let root = vm.root_activation();
        let class = vm.create_class("Account", None, None).unwrap();
        let obj = vm.new_instance(&root, class, &[]).unwrap();
        let floating = vm.add_method(returning("a", "a"));
        let scoped = vm.add_method(returning("b", "b"));

        vm.set_instance_method(&obj, "a", Some(floating), false).unwrap();
        vm.set_instance_method(&obj, "b", Some(scoped), true).unwrap();
        assert_eq!(vm.method(floating).unwrap().scope(), None);
        assert_eq!(vm.method(scoped).unwrap().scope(), Some(class));
    }

    #[test]
    fn test_default_names() {
        let vm = VM::new();
        let root = vm.root_activation();
        let apple = vm.create_class("Apple", None, None).unwrap();
        let pear = vm.create_class("Pear", None, None).unwrap();
        let a = vm.new_instance(&root, apple, &[]).unwrap();
        let p = vm.new_instance(&root, pear, &[]).unwrap();

        assert_eq!(vm.default_name(&a), "an Apple");
        assert_eq!(vm.default_name(&p), "a Pear");
        assert_eq!(vm.default_name(&Value::Class(pear)), "The Pear class");
        assert_eq!(vm.default_name(&Value::Nil), "The NIL object");

        send(&vm, &p, "objectname=", &[Value::from("Bartlett")]).unwrap();
        assert_eq!(vm.string_value(&root, &p).unwrap().as_ref(), "Bartlett");
        assert_eq!(send(&vm, &p, "defaultname", &[]).unwrap(), Value::from("a Pear"));
    }

    #[test]
    fn test_copy_duplicates_stems_in_object_variables() {
        let vm = VM::new();
        let root = vm.root_activation();
        let class = vm.create_class("Holder", None, None).unwrap();
        let obj = vm.new_instance(&root, class, &[]).unwrap();
        let variables = vm.object_variables(&obj, Some(class)).unwrap();
        let tail = CompoundTail::resolved("1");
        vm.set_compound(&variables, "ITEMS.", &tail, Value::from("one")).unwrap();

        let copy = vm.copy(&obj).unwrap();
        let copied = vm.object_variables(&copy, Some(class)).unwrap();
        vm.set_compound(&copied, "ITEMS.", &tail, Value::from("uno")).unwrap();

        assert_eq!(
            vm.evaluate_compound(&root, &variables, "ITEMS.", &tail).unwrap(),
            Value::from("one")
        );
        assert_eq!(
            vm.evaluate_compound(&root, &copied, "ITEMS.", &tail).unwrap(),
            Value::from("uno")
        );
    }

    #[test]
    fn test_copy_directory_is_independent() {
        let vm = VM::new();
        let dir = vm.new_directory();
        vm.directory_put(&dir, "A", Value::from("1")).unwrap();
        let copy = vm.copy(&dir).unwrap();
        vm.directory_put(&copy, "A", Value::from("2")).unwrap();
        vm.directory_put(&copy, "B", Value::from("3")).unwrap();

        let root = vm.root_activation();
        assert_eq!(vm.directory_get(&root, &dir, "A").unwrap(), Some(Value::from("1")));
        assert_eq!(vm.directory_items(&dir).unwrap(), 1);
        assert!(vm.copy(&Value::Class(vm.builtins().object)).is_err());
    }

    #[test]
    fn test_directory_computed_entries() {
        let vm = VM::new();
        let root = vm.root_activation();
        let dir = vm.new_directory();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let computed = vm.add_method(Method::from_fn("now", move |_, _, _, _| {
            Ok(Value::from(counter.fetch_add(1, Ordering::SeqCst) + 1))
        }));

        vm.directory_put(&dir, "NOW", Value::from("stored")).unwrap();
        vm.directory_set_method(&dir, "NOW", Some(computed)).unwrap();
        assert_eq!(vm.directory_get(&root, &dir, "NOW").unwrap(), Some(Value::from("1")));
        assert_eq!(vm.directory_get(&root, &dir, "NOW").unwrap(), Some(Value::from("2")));
        assert_eq!(vm.directory_all_items(&root, &dir).unwrap(), vec![Value::from("3")]);
        assert_eq!(
            vm.directory_index_of(&root, &dir, &Value::from("4")).unwrap().as_deref(),
            Some("NOW")
        );

        vm.directory_put(&dir, "NOW", Value::from("fixed")).unwrap();
        assert_eq!(vm.directory_get(&root, &dir, "NOW").unwrap(), Some(Value::from("fixed")));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_directory_unknown_and_remove() {
        let vm = VM::new();
        let root = vm.root_activation();
        let dir = vm.new_directory();
        assert_eq!(vm.directory_get(&root, &dir, "MISSING").unwrap(), None);

        let unknown = vm.add_method(Method::from_fn("unknown", |_, _, _, args| {
            Ok(Value::string(format!("no {}", args[0].as_str().unwrap_or("?"))))
        }));
        vm.directory_set_method(&dir, "UNKNOWN", Some(unknown)).unwrap();
        assert_eq!(
            vm.directory_get(&root, &dir, "MISSING").unwrap(),
            Some(Value::from("no MISSING"))
        );
        assert!(!vm.directory_has_index(&dir, "UNKNOWN").unwrap());

        let computed = vm.add_method(returning("last", "computed"));
        vm.directory_set_method(&dir, "LAST", Some(computed)).unwrap();
        assert_eq!(
            vm.directory_remove(&root, &dir, "LAST").unwrap(),
            Some(Value::from("computed"))
        );
        assert!(!vm.directory_has_index(&dir, "LAST").unwrap());
        assert_eq!(vm.directory_remove(&root, &dir, "LAST").unwrap(), None);
    }

    #[test]
    fn test_directory_unknown_method_hides_stored_unknown() {
        let vm = VM::new();
        let root = vm.root_activation();
        let dir = vm.new_directory();
        vm.directory_put(&dir, "UNKNOWN", Value::from("stored")).unwrap();

        let unknown = vm.add_method(Method::from_fn("unknown", |_, _, _, args| {
            Ok(Value::string(format!("from-{}", args[0].as_str().unwrap_or("?"))))
        }));
        vm.directory_set_method(&dir, "UNKNOWN", Some(unknown)).unwrap();
        assert!(!vm.directory_has_index(&dir, "UNKNOWN").unwrap());
        assert_eq!(
            vm.directory_get(&root, &dir, "UNKNOWN").unwrap(),
            Some(Value::from("from-UNKNOWN"))
        );
    }

    #[test]
    fn test_stem_variable_assignment() {
        let vm = VM::new();
        let root = vm.root_activation();
        let variables = VariableDictionary::new(None);
        let tail = CompoundTail::resolved("7");

        vm.assign_stem(&variables, "A.", Value::from("0")).unwrap();
        assert_eq!(vm.evaluate_compound(&root, &variables, "A.", &tail).unwrap(), Value::from("0"));

        // assigning a stem object shares it
        let other = vm.new_stem("B.");
        send(&vm, &other, "[]=", &[Value::from("shared"), Value::from("7")]).unwrap();
        vm.assign_stem(&variables, "A.", other.clone()).unwrap();
        assert_eq!(
            vm.evaluate_compound(&root, &variables, "A.", &tail).unwrap(),
            Value::from("shared")
        );

        vm.drop_stem(&variables, "A.").unwrap();
        assert_eq!(vm.evaluate_compound(&root, &variables, "A.", &tail).unwrap(), Value::from("A.7"));
        assert!(vm.assign_stem(&variables, "A", Value::Nil).is_err());
    }

    #[test]
    fn test_stem_rejects_stem_default() {
        let vm = VM::new();
        let stem = vm.new_stem("S.");
        let other = vm.new_stem("T.");
        let err = send(&vm, &stem, "[]=", &[other]).unwrap_err();
        assert!(err.is(ErrorKind::InvalidStemValue));
    }

    #[test]
    fn test_collection_threshold_grows_with_live_objects() {
        let vm = VM::with_config(RuntimeConfig {
            gc_initial_threshold: 3,
            gc_grow_factor: 2.0,
            ..RuntimeConfig::default()
        });
        let root = vm.root_activation();
        let class = vm.create_class("Cell", None, None).unwrap();
        let mut live: Vec<Value> = (0..2).map(|_| vm.new_instance(&root, class, &[]).unwrap()).collect();
        assert!(!vm.should_collect());
        vm.new_instance(&root, class, &[]).unwrap();
        assert!(vm.should_collect());

        // one survivor: the threshold falls back to the initial value
        vm.collect(&live[..1]);
        live.truncate(1);
        assert!(!vm.should_collect());

        live.push(vm.new_instance(&root, class, &[]).unwrap());
        live.push(vm.new_instance(&root, class, &[]).unwrap());
        assert!(vm.should_collect());
        vm.collect(&live);
        assert_eq!(vm.collections(), 2);
        assert!(!vm.should_collect());
        for _ in 0..3 {
            live.push(vm.new_instance(&root, class, &[]).unwrap());
        }
        assert!(vm.should_collect());
    }

    #[test]
    fn test_collect_runs_uninit_once() {
        let vm = VM::new();
        let root = vm.root_activation();
        let finalized = Arc::new(AtomicUsize::new(0));
        let counter = finalized.clone();
        let class = vm.create_class("Resource", None, None).unwrap();
        vm.define(
            class,
            "uninit",
            Some(Method::from_fn("uninit", move |_, _, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Nil)
            })),
        )
        .unwrap();
        let kept = vm.new_instance(&root, class, &[]).unwrap();
        let dropped = vm.new_instance(&root, class, &[]).unwrap();
        let dropped_id = dropped.as_object().unwrap();

        let stats = vm.collect(&[kept.clone()]);
        assert_eq!(stats.uninits_run, 1);
        assert_eq!(stats.objects_freed, 0);
        assert!(vm.object(dropped_id).is_ok());

        let stats = vm.collect(&[kept.clone()]);
        assert_eq!(stats.uninits_run, 0);
        assert_eq!(stats.objects_freed, 1);
        assert!(vm.object(dropped_id).unwrap_err().is(ErrorKind::DeadObject));
        assert!(vm.object(kept.as_object().unwrap()).is_ok());
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
        assert_eq!(vm.collections(), 2);
    }

    #[test]
    fn test_collect_keeps_class_methods() {
        let vm = VM::new();
        let class = vm.create_class("Kept", None, None).unwrap();
        let defined = vm.define(class, "m", Some(returning("m", "x"))).unwrap().unwrap();
        let floating = vm.add_method(returning("loose", "y"));

        let stats = vm.collect(&[]);
        assert_eq!(stats.methods_freed, 1);
        assert!(vm.method(defined).is_ok());
        assert!(vm.method(floating).is_err());
        assert!(!vm.method(defined).unwrap().flags().contains(MethodFlags::UNGUARDED));
    }
}
