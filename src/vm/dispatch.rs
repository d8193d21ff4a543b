// Oryx Message Dispatch
// Resolves a message through the receiver's behaviour, applies the
// private / package / protected access rules, falls back to UNKNOWN and
// runs the method under its guard.

use super::activity::Activity;
use super::caller::{Activation, Outcome};
use super::class::ClassId;
use super::dictionary::MethodDictionary;
use super::interner::message_name;
use super::method::{Method, MethodId};
use super::object::{Object, Payload, PendingMessage};
use super::value::Value;
use super::variables::{VariableDictionary, Watchable};
use super::vm::VM;
use crate::error::{ErrorKind, OryxError, OryxResult, StackFrame};
use log::{trace, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

/// Result of the access check on a special method
enum Access {
    Granted,
    /// A security manager answered in place of the method
    Handled(Value),
    Denied(OryxError),
}

/// Holds the (receiver, scope) guard of a running method; released on drop
struct Guard {
    variables: Arc<VariableDictionary>,
    activation: Activation,
}

impl Drop for Guard {
    fn drop(&mut self) {
        if self.activation.guard_held.swap(false, Ordering::AcqRel) {
            self.variables.reservation().release(&self.activation.activity);
        }
    }
}

impl VM {
    /// Send `message` to `receiver` from the context `activation`
    pub fn send_message(
        &self,
        activation: &Activation,
        receiver: &Value,
        message: &str,
        args: &[Value],
    ) -> OryxResult<Value> {
        let name = message_name(message);
        let behaviour = self.behaviour_of(receiver)?;
        let method = behaviour.get_method(&name);
        self.dispatch(activation, receiver, &name, args, &behaviour, method)
    }

    /// Send starting the lookup at `scope` (superclass calls, FORWARD ... SCOPE)
    pub fn send_message_scoped(
        &self,
        activation: &Activation,
        receiver: &Value,
        message: &str,
        args: &[Value],
        scope: ClassId,
    ) -> OryxResult<Value> {
        let name = message_name(message);
        let behaviour = self.behaviour_of(receiver)?;
        self.check_scope(receiver, &behaviour, scope)?;
        let method = behaviour.find_super_method(&name, scope);
        self.dispatch(activation, receiver, &name, args, &behaviour, method)
    }

    fn check_scope(&self, receiver: &Value, behaviour: &MethodDictionary, scope: ClassId) -> OryxResult<()> {
        if behaviour.has_scope(scope) {
            Ok(())
        } else {
            Err(OryxError::invalid_scope(&self.default_name(receiver), &self.class_name(scope)))
        }
    }

    fn dispatch(
        &self,
        activation: &Activation,
        receiver: &Value,
        name: &Arc<str>,
        args: &[Value],
        behaviour: &MethodDictionary,
        method: Option<MethodId>,
    ) -> OryxResult<Value> {
        let mut denied = None;
        if let Some(id) = method {
            let resolved = self.method(id)?;
            if !resolved.is_special() {
                return self.invoke(activation, receiver, id, &resolved, name, args);
            }
            match self.check_access(activation, receiver, &resolved, name, args)? {
                Access::Granted => return self.invoke(activation, receiver, id, &resolved, name, args),
                Access::Handled(value) => return Ok(value),
                Access::Denied(err) => denied = Some(err),
            }
        }

        if let Some(unknown) = behaviour.get_method("UNKNOWN") {
            let handler = self.method(unknown)?;
            let unknown_args = [Value::String(name.clone()), Value::array(args.to_vec())];
            return self.invoke(activation, receiver, unknown, &handler, "UNKNOWN", &unknown_args);
        }
        Err(denied.unwrap_or_else(|| OryxError::no_method(&self.default_name(receiver), name)))
    }

    fn check_access(
        &self,
        activation: &Activation,
        receiver: &Value,
        method: &Method,
        name: &str,
        args: &[Value],
    ) -> OryxResult<Access> {
        if method.is_private() && !self.private_allowed(activation, receiver, method) {
            return Ok(Access::Denied(OryxError::private_method(&self.default_name(receiver), name)));
        }

        if method.is_package_scope() {
            let same_package = match (activation.package, method.package()) {
                (Some(caller), Some(owner)) => caller == owner,
                _ => false,
            };
            if !same_package {
                return Ok(Access::Denied(OryxError::package_method(&self.default_name(receiver), name)));
            }
        }

        if method.is_protected() {
            if let Some(manager) = self.security_manager_for(activation) {
                if let Outcome::Handled(value) = manager.check_protected_method(self, receiver, name, args)? {
                    return Ok(Access::Handled(value));
                }
            }
        }
        Ok(Access::Granted)
    }

    /// The caller is the receiver itself, an instance of the method's scope,
    /// or a class compatible with that scope
    fn private_allowed(&self, activation: &Activation, receiver: &Value, method: &Method) -> bool {
        let caller = match &activation.receiver {
            Some(caller) => caller,
            None => return false,
        };
        if caller.identical(receiver) {
            return true;
        }
        match (caller, method.scope()) {
            (Value::Class(class), Some(scope)) => self.is_compatible_with(*class, scope),
            (other, Some(scope)) => self.is_instance_of(other, scope),
            (_, None) => false,
        }
    }

    fn invoke(
        &self,
        activation: &Activation,
        receiver: &Value,
        id: MethodId,
        method: &Method,
        message: &str,
        args: &[Value],
    ) -> OryxResult<Value> {
        if self.config.trace_dispatch {
            trace!(
                "{:?} -> {}~{} ({} args)",
                activation.activity,
                self.default_name(receiver),
                message,
                args.len()
            );
        }
        let callee = activation.callee(receiver, id, method.scope(), method.package(), message_name(message));
        let _guard = if method.is_guarded() {
            self.acquire_guard(&callee, receiver)?
        } else {
            None
        };

        method.run(self, &callee, receiver, message, args).map_err(|mut err| {
            let scope = method
                .scope()
                .map(|s| self.class_name(s).to_string())
                .unwrap_or_else(|| "floating".to_string());
            err.push_frame(StackFrame::new(message, scope));
            err
        })
    }

    fn acquire_guard(&self, callee: &Activation, receiver: &Value) -> OryxResult<Option<Guard>> {
        if !matches!(receiver, Value::Object(_) | Value::Class(_)) {
            return Ok(None);
        }
        let variables = self.object_variables(receiver, callee.scope)?;
        variables.reservation().reserve(&callee.activity);
        callee.guard_held.store(true, Ordering::Release);
        Ok(Some(Guard {
            variables,
            activation: callee.clone(),
        }))
    }

    /// Run a known method on `receiver` with no lookup or access check
    pub fn run_method(
        &self,
        activation: &Activation,
        receiver: &Value,
        id: MethodId,
        message: &str,
        args: &[Value],
    ) -> OryxResult<Value> {
        let method = self.method(id)?;
        self.invoke(activation, receiver, id, &method, message, args)
    }

    // ==================== Dynamic sends ====================

    /// A message argument is a name or an array of (name, scope class)
    pub fn decode_message(&self, message: &Value) -> OryxResult<(Arc<str>, Option<ClassId>)> {
        match message {
            Value::String(name) => Ok((message_name(name), None)),
            Value::Array(items) => {
                let items = items.lock().clone();
                if items.len() != 2 {
                    return Err(OryxError::invalid_argument(
                        "Message array must hold a name and a scope",
                    ));
                }
                let name = items[0]
                    .as_str()
                    .ok_or_else(|| OryxError::invalid_argument("Message name must be a string"))?;
                let scope = items[1]
                    .as_class()
                    .ok_or_else(|| OryxError::invalid_argument("Message scope must be a class object"))?;
                Ok((message_name(name), Some(scope)))
            }
            other => Err(OryxError::invalid_argument(format!(
                "Message must be a string or an array, got {}",
                other.type_name()
            ))),
        }
    }

    /// SEND: name (or name and scope) plus arguments
    pub fn send(&self, activation: &Activation, receiver: &Value, message: &Value, args: &[Value]) -> OryxResult<Value> {
        let (name, scope) = self.decode_message(message)?;
        match scope {
            Some(scope) => self.send_message_scoped(activation, receiver, &name, args, scope),
            None => self.send_message(activation, receiver, &name, args),
        }
    }

    /// SENDWITH: arguments given as one array
    pub fn send_with(&self, activation: &Activation, receiver: &Value, message: &Value, args: &Value) -> OryxResult<Value> {
        let args = Self::argument_array(args)?;
        self.send(activation, receiver, message, &args)
    }

    /// START: run the send on a new activity and return its Message object.
    /// A bad scope fails here, before anything is spawned.
    pub fn start(&self, activation: &Activation, receiver: &Value, message: &Value, args: &[Value]) -> OryxResult<Value> {
        let (name, scope) = self.decode_message(message)?;
        if let Some(scope) = scope {
            let behaviour = self.behaviour_of(receiver)?;
            self.check_scope(receiver, &behaviour, scope)?;
        }

        let vm = self.handle()?;
        let pending = Object::new(
            self.builtins.message,
            Payload::Message(PendingMessage::new(receiver.clone(), name.clone(), args.to_vec())),
        );
        let id = self.insert_object(pending);
        let object = self.object(id)?;
        if let Some(message) = object.message() {
            message.mark_started();
        }

        let activity = Activity::new(format!("start {}", name));
        let started = activation.on_activity(activity);
        let target = receiver.clone();
        let args = args.to_vec();
        thread::Builder::new()
            .name(format!("oryx-{}", name.to_lowercase()))
            .stack_size(self.config.activity_stack_size)
            .spawn(move || {
                let result = match scope {
                    Some(scope) => vm.send_message_scoped(&started, &target, &name, &args, scope),
                    None => vm.send_message(&started, &target, &name, &args),
                };
                if let Err(err) = &result {
                    warn!("started message {} failed: {}", name, err);
                }
                if let Some(message) = object.message() {
                    message.complete(result);
                }
            })
            .map_err(|e| OryxError::new(ErrorKind::Activity, format!("Cannot start activity: {}", e)))?;
        Ok(Value::Object(id))
    }

    pub fn start_with(&self, activation: &Activation, receiver: &Value, message: &Value, args: &Value) -> OryxResult<Value> {
        let args = Self::argument_array(args)?;
        self.start(activation, receiver, message, &args)
    }

    fn argument_array(args: &Value) -> OryxResult<Vec<Value>> {
        match args {
            Value::Array(items) => Ok(items.lock().clone()),
            other => Err(OryxError::invalid_argument(format!(
                "Arguments must be an array, got {}",
                other.type_name()
            ))),
        }
    }

    // ==================== Guards ====================

    fn guard_variables(&self, activation: &Activation) -> OryxResult<Arc<VariableDictionary>> {
        let receiver = activation
            .receiver
            .as_ref()
            .ok_or_else(|| OryxError::new(ErrorKind::Activity, "GUARD is only valid inside a method"))?;
        self.object_variables(receiver, activation.scope)
    }

    /// GUARD ON: take the (receiver, scope) guard if not already held
    pub fn guard_on(&self, activation: &Activation) -> OryxResult<()> {
        let variables = self.guard_variables(activation)?;
        if !activation.guard_held.load(Ordering::Acquire) {
            variables.reservation().reserve(&activation.activity);
            activation.guard_held.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// GUARD OFF: let other activities run guarded methods on the receiver
    pub fn guard_off(&self, activation: &Activation) -> OryxResult<()> {
        let variables = self.guard_variables(activation)?;
        if activation.guard_held.swap(false, Ordering::AcqRel) {
            variables.reservation().release(&activation.activity);
        }
        Ok(())
    }

    /// GUARD ON|OFF WHEN: wait until `condition` holds, re-checking every
    /// time one of `watched` changes. With `hold` the guard is held while
    /// the condition is checked and afterwards.
    pub fn guard_when<F>(
        &self,
        activation: &Activation,
        hold: bool,
        watched: &[Arc<dyn Watchable>],
        mut condition: F,
    ) -> OryxResult<()>
    where
        F: FnMut() -> OryxResult<bool>,
    {
        let variables = self.guard_variables(activation)?;
        if hold {
            self.guard_on(activation)?;
        } else {
            self.guard_off(activation)?;
        }

        let activity = &activation.activity;
        for variable in watched {
            variable.set_guard(activity);
        }
        let result = loop {
            match condition() {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(err) => break Err(err),
            }
            let held = variables.reservation().release_all(activity);
            activity.park();
            if held > 0 {
                variables.reservation().reserve_nested(activity, held);
            }
        };
        for variable in watched {
            variable.clear_guard(activity);
        }
        result
    }
}
