// Built-in classes
// Native method tables installed on the bootstrap classes, plus the
// argument helpers they share

mod array;
mod class;
mod directory;
mod message;
mod method;
mod object;
mod stem;
mod string;

pub(crate) use crate::error::{check_arity, check_arity_range};

use crate::arena::Arena;
use crate::error::{OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::class::{Class, ClassId};
use crate::vm::compound::CompoundTail;
use crate::vm::method::{Method, MethodFlags, MethodId};
use crate::vm::value::Value;
use crate::vm::vm::{BuiltinClasses, VM};
use std::sync::Arc;

/// (message name, native function) pairs for one class
pub type MethodTable = Vec<(&'static str, NativeMethodFn)>;

/// Install every builtin method; the caller rebuilds behaviours afterwards
pub(crate) fn register(classes: &mut Arena<Class>, methods: &mut Arena<Method>, builtins: &BuiltinClasses) {
    install(classes, methods, builtins.object, object::instance_methods());
    // instance methods of Class are the class methods of every class object
    install(classes, methods, builtins.class, class::instance_methods());
    install(classes, methods, builtins.method, method::instance_methods());
    install(classes, methods, builtins.package, vec![("NAME", package_name as NativeMethodFn)]);
    install(classes, methods, builtins.string, string::instance_methods());
    install(classes, methods, builtins.array, array::instance_methods());
    install(classes, methods, builtins.directory, directory::instance_methods());
    install(classes, methods, builtins.stem, stem::instance_methods());
    install(classes, methods, builtins.message, message::instance_methods());
}

fn install(classes: &mut Arena<Class>, methods: &mut Arena<Method>, class: ClassId, table: MethodTable) {
    let Some(target) = classes.get_mut(class) else {
        return;
    };
    for (name, function) in table {
        let mut method = Method::native(name, function).with_flags(MethodFlags::UNGUARDED);
        method.assign_scope(class);
        let id = methods.insert(method);
        target.add_definition(name, Some(id));
    }
}

/// package~name
fn package_name(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    match recv {
        Value::Package(id) => vm
            .package_name(*id)
            .map(Value::String)
            .ok_or_else(|| OryxError::dead_object("package")),
        _ => Err(OryxError::invalid_argument("Receiver must be a package")),
    }
}

/// String value of argument `index`
pub(crate) fn get_string_arg(vm: &VM, activation: &Activation, args: &[Value], index: usize) -> OryxResult<Arc<str>> {
    match args.get(index) {
        Some(Value::Nil) | None => Err(OryxError::invalid_argument(format!("Missing argument {}", index + 1))),
        Some(value) => vm.string_value(activation, value),
    }
}

/// Argument `index` unless omitted (missing or nil)
pub(crate) fn optional_arg(args: &[Value], index: usize) -> Option<&Value> {
    args.get(index).filter(|v| !v.is_nil())
}

pub(crate) fn get_class_arg(args: &[Value], index: usize) -> OryxResult<ClassId> {
    match args.get(index) {
        Some(Value::Class(id)) => Ok(*id),
        Some(other) => Err(OryxError::invalid_argument(format!(
            "Argument {} must be a class, got {}",
            index + 1,
            other.type_name()
        ))),
        None => Err(OryxError::invalid_argument(format!("Missing argument {}", index + 1))),
    }
}

/// A method argument; nil means "no method"
pub(crate) fn get_method_arg(vm: &VM, args: &[Value], index: usize) -> OryxResult<Option<MethodId>> {
    match optional_arg(args, index) {
        Some(value) => vm.method_argument(value).map(Some),
        None => Ok(None),
    }
}

/// Optional positive whole number argument
pub(crate) fn get_number_arg(args: &[Value], index: usize) -> OryxResult<Option<usize>> {
    match optional_arg(args, index) {
        Some(value) => value.as_whole_number().map(Some).ok_or_else(|| {
            OryxError::invalid_argument(format!("Argument {} must be a whole number, got {:?}", index + 1, value))
        }),
        None => Ok(None),
    }
}

/// Stem tail from index arguments (`stem[a, b]` is tail "A.B" with the
/// components taken as given)
pub(crate) fn tail_from_args(vm: &VM, activation: &Activation, args: &[Value]) -> OryxResult<CompoundTail> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        parts.push(vm.string_value(activation, arg)?);
    }
    Ok(CompoundTail::from_parts(&parts))
}
