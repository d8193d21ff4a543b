// Oryx Caller Contracts
// What the core needs from its collaborators: executable method bodies,
// the caller context of a send, NOVALUE interception and the security
// manager consulted for protected methods.

use super::activity::Activity;
use super::class::ClassId;
use super::compound::CompoundElement;
use super::gc::Marker;
use super::method::MethodId;
use super::value::Value;
use super::variables::VariableDictionary;
use super::vm::{PackageId, VM};
use crate::error::{OryxError, OryxResult};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A method body. The core never looks inside; it only runs it.
pub trait Executable: Send + Sync {
    fn run(
        &self,
        vm: &VM,
        activation: &Activation,
        receiver: &Value,
        message: &str,
        args: &[Value],
    ) -> OryxResult<Value>;

    /// Report values the body keeps alive
    fn mark_reachable(&self, _marker: &mut Marker) {}
}

/// Native method function type.
/// Receives the VM, the activation running it, the receiver and the arguments.
pub type NativeMethodFn = fn(&VM, &Activation, &Value, &[Value]) -> OryxResult<Value>;

/// Wraps a native function or closure as a method body
pub struct NativeBody<F>(pub F);

impl<F> Executable for NativeBody<F>
where
    F: Fn(&VM, &Activation, &Value, &[Value]) -> OryxResult<Value> + Send + Sync,
{
    fn run(
        &self,
        vm: &VM,
        activation: &Activation,
        receiver: &Value,
        _message: &str,
        args: &[Value],
    ) -> OryxResult<Value> {
        (self.0)(vm, activation, receiver, args)
    }
}

/// Intercepts reads of variables that have no value
pub trait NovalueHandler: Send + Sync {
    /// `name` is the fully qualified variable name and `default` the value
    /// the read yields when not intercepted
    fn handle_novalue_event(
        &self,
        name: &str,
        default: Value,
        element: Option<&Arc<CompoundElement>>,
    ) -> OryxResult<Value>;
}

/// Turns every read without a value into a NOVALUE condition
pub struct SignalNovalue;

impl NovalueHandler for SignalNovalue {
    fn handle_novalue_event(
        &self,
        name: &str,
        _default: Value,
        _element: Option<&Arc<CompoundElement>>,
    ) -> OryxResult<Value> {
        Err(OryxError::no_value(name))
    }
}

/// Result of asking a security manager about a protected method
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The manager answered the send itself; the method is not run
    Handled(Value),
    Proceed,
}

pub trait SecurityManager: Send + Sync {
    fn check_protected_method(
        &self,
        vm: &VM,
        receiver: &Value,
        message: &str,
        args: &[Value],
    ) -> OryxResult<Outcome>;
}

/// The context a message is sent from: which activity, which method and
/// receiver are running, and the local variables of that method.
#[derive(Clone)]
pub struct Activation {
    pub activity: Arc<Activity>,
    pub receiver: Option<Value>,
    pub method: Option<MethodId>,
    pub scope: Option<ClassId>,
    pub package: Option<PackageId>,
    pub message: Option<Arc<str>>,
    pub novalue: Option<Arc<dyn NovalueHandler>>,
    pub locals: Arc<VariableDictionary>,
    /// Set while this activation holds the guard of (receiver, scope)
    pub(crate) guard_held: Arc<AtomicBool>,
}

impl Activation {
    /// Top-level context with no running method (API-driven sends)
    pub fn root(activity: Arc<Activity>) -> Self {
        Self {
            activity,
            receiver: None,
            method: None,
            scope: None,
            package: None,
            message: None,
            novalue: None,
            locals: Arc::new(VariableDictionary::new(None)),
            guard_held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Root context that sends on behalf of `package`
    pub fn for_package(activity: Arc<Activity>, package: PackageId) -> Self {
        let mut activation = Self::root(activity);
        activation.package = Some(package);
        activation
    }

    pub fn with_novalue(mut self, handler: Arc<dyn NovalueHandler>) -> Self {
        self.novalue = Some(handler);
        self
    }

    /// Context of a method invoked from this one, on the same activity
    pub fn callee(
        &self,
        receiver: &Value,
        method: MethodId,
        scope: Option<ClassId>,
        package: Option<PackageId>,
        message: Arc<str>,
    ) -> Self {
        Self {
            activity: self.activity.clone(),
            receiver: Some(receiver.clone()),
            method: Some(method),
            scope,
            package,
            message: Some(message),
            novalue: self.novalue.clone(),
            locals: Arc::new(VariableDictionary::new(None)),
            guard_held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The same caller context on another activity (START), holding no guard
    pub fn on_activity(&self, activity: Arc<Activity>) -> Self {
        Self {
            activity,
            guard_held: Arc::new(AtomicBool::new(false)),
            ..self.clone()
        }
    }

    /// Is a method running, or is this a top-level send?
    pub fn has_caller(&self) -> bool {
        self.method.is_some()
    }
}
