// Oryx Objects
// Object instances: class, optional own behaviour (after SETMETHOD),
// object variables per scope, and the native payload of builtin classes.

use super::class::ClassId;
use super::dictionary::{MethodDictionary, MethodEntry};
use super::directory::Directory;
use super::gc::{Marker, Trace};
use super::stem::Stem;
use super::value::Value;
use super::variables::ScopedVariables;
use crate::arena::Id;
use crate::error::OryxResult;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type ObjectRef = Arc<Object>;
pub type ObjectId = Id<ObjectRef>;

/// State of a message started with START / STARTWITH
pub struct PendingMessage {
    target: Value,
    message: Arc<str>,
    args: Vec<Value>,
    started: AtomicBool,
    result: Mutex<Option<OryxResult<Value>>>,
    done: Condvar,
}

impl PendingMessage {
    pub fn new(target: Value, message: Arc<str>, args: Vec<Value>) -> Self {
        Self {
            target,
            message,
            args,
            started: AtomicBool::new(false),
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn message(&self) -> &Arc<str> {
        &self.message
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Claim the message for sending; false when it was already sent
    pub fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn complete(&self, result: OryxResult<Value>) {
        let mut slot = self.result.lock();
        *slot = Some(result);
        self.done.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        self.result.lock().is_some()
    }

    /// Block until the message has run; a failure is handed back to every waiter
    pub fn wait(&self) -> OryxResult<Value> {
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

impl Trace for PendingMessage {
    fn mark_reachable(&self, marker: &mut Marker) {
        marker.mark_value(&self.target);
        for arg in &self.args {
            marker.mark_value(arg);
        }
        if let Some(Ok(value)) = self.result.lock().as_ref() {
            marker.mark_value(value);
        }
    }
}

/// Native state carried by instances of builtin classes
pub enum Payload {
    None,
    Directory(Mutex<Directory>),
    Stem(Mutex<Stem>),
    Message(PendingMessage),
}

pub struct Object {
    class: ClassId,
    /// Own behaviour once instance methods were added; shared copy-on-write
    behaviour: Mutex<Option<Arc<MethodDictionary>>>,
    variables: ScopedVariables,
    payload: Payload,
    object_name: Mutex<Option<Arc<str>>>,
    has_uninit: AtomicBool,
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Object(class: {:?}, own behaviour: {})", self.class, self.own_behaviour().is_some())
    }
}

impl Object {
    pub fn new(class: ClassId, payload: Payload) -> Self {
        Self {
            class,
            behaviour: Mutex::new(None),
            variables: ScopedVariables::new(),
            payload,
            object_name: Mutex::new(None),
            has_uninit: AtomicBool::new(false),
        }
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn directory(&self) -> Option<&Mutex<Directory>> {
        match &self.payload {
            Payload::Directory(directory) => Some(directory),
            _ => None,
        }
    }

    pub fn stem(&self) -> Option<&Mutex<Stem>> {
        match &self.payload {
            Payload::Stem(stem) => Some(stem),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&PendingMessage> {
        match &self.payload {
            Payload::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn variables(&self) -> &ScopedVariables {
        &self.variables
    }

    pub fn own_behaviour(&self) -> Option<Arc<MethodDictionary>> {
        self.behaviour.lock().clone()
    }

    /// Add an instance method, copying `class_behaviour` on first use.
    /// Other holders of the current table keep their view.
    pub fn add_instance_method(&self, class_behaviour: &Arc<MethodDictionary>, name: &str, entry: MethodEntry) {
        let mut behaviour = self.behaviour.lock();
        let own = behaviour.get_or_insert_with(|| class_behaviour.clone());
        Arc::make_mut(own).add_instance_method(name, entry);
    }

    pub fn remove_instance_method(&self, name: &str) -> bool {
        let mut behaviour = self.behaviour.lock();
        match behaviour.as_mut() {
            Some(own) if own.has_instance_entry(name) => Arc::make_mut(own).remove_instance_method(name),
            _ => false,
        }
    }

    pub fn object_name(&self) -> Option<Arc<str>> {
        self.object_name.lock().clone()
    }

    pub fn set_object_name(&self, name: Option<Arc<str>>) {
        *self.object_name.lock() = name;
    }

    pub fn has_uninit(&self) -> bool {
        self.has_uninit.load(Ordering::Acquire)
    }

    pub fn set_has_uninit(&self, value: bool) {
        self.has_uninit.store(value, Ordering::Release);
    }

    /// Copy for COPY: object variables are duplicated (values shared), the
    /// behaviour is shared copy-on-write so later SETMETHODs stay private
    pub fn copy_with(&self, payload: Payload) -> Object {
        Object {
            class: self.class,
            behaviour: Mutex::new(self.behaviour.lock().clone()),
            variables: self.variables.deep_copy(),
            payload,
            object_name: Mutex::new(self.object_name.lock().clone()),
            has_uninit: AtomicBool::new(self.has_uninit()),
        }
    }
}

impl Trace for Object {
    fn mark_reachable(&self, marker: &mut Marker) {
        if let Some(behaviour) = self.own_behaviour() {
            behaviour.mark_reachable(marker);
        }
        self.variables.mark_reachable(marker);
        match &self.payload {
            Payload::None => {}
            Payload::Directory(directory) => directory.lock().mark_reachable(marker),
            Payload::Stem(stem) => stem.lock().mark_reachable(marker),
            Payload::Message(message) => message.mark_reachable(marker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, OryxError};
    use std::thread;

    fn class(n: u32) -> ClassId {
        Id::from_raw(n, 0)
    }

    #[test]
    fn test_instance_methods_copy_on_write() {
        let mut shared = MethodDictionary::new();
        shared.add_method("GREET", MethodEntry::method(Id::from_raw(1, 0), Some(class(1))));
        let shared = Arc::new(shared);

        let object = Object::new(class(1), Payload::None);
        assert!(object.own_behaviour().is_none());
        object.add_instance_method(&shared, "greet", MethodEntry::method(Id::from_raw(2, 0), None));

        assert_eq!(shared.get_method("GREET"), Some(Id::from_raw(1, 0)));
        let own = object.own_behaviour().unwrap();
        assert_eq!(own.get_method("GREET"), Some(Id::from_raw(2, 0)));

        let copy = object.copy_with(Payload::None);
        copy.add_instance_method(&shared, "extra", MethodEntry::method(Id::from_raw(3, 0), None));
        assert!(!object.own_behaviour().unwrap().has_method("EXTRA"));
        assert!(copy.own_behaviour().unwrap().has_method("GREET"));

        assert!(object.remove_instance_method("GREET"));
        assert_eq!(object.own_behaviour().unwrap().get_method("GREET"), Some(Id::from_raw(1, 0)));
        assert!(!object.remove_instance_method("GREET"));
    }

    #[test]
    fn test_copy_duplicates_variables() {
        let object = Object::new(class(1), Payload::None);
        object.variables().get(Some(class(1))).set("x", Value::from("1"));
        object.set_object_name(Some(Arc::from("thing")));
        let copy = object.copy_with(Payload::None);
        copy.variables().get(Some(class(1))).set("x", Value::from("2"));
        assert_eq!(object.variables().get(Some(class(1))).get("x"), Some(Value::from("1")));
        assert_eq!(copy.object_name().as_deref(), Some("thing"));
    }

    #[test]
    fn test_pending_message_wait() {
        let pending = Arc::new(PendingMessage::new(Value::Nil, Arc::from("RUN"), vec![]));
        assert!(!pending.is_complete());
        let worker = pending.clone();
        let handle = thread::spawn(move || worker.complete(Ok(Value::from("done"))));
        assert_eq!(pending.wait().unwrap(), Value::from("done"));
        handle.join().unwrap();

        let failed = PendingMessage::new(Value::Nil, Arc::from("RUN"), vec![]);
        failed.complete(Err(OryxError::runtime_error("boom")));
        assert!(failed.wait().unwrap_err().is(ErrorKind::RuntimeError));
        assert!(failed.wait().is_err());
    }
}
