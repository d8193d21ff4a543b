// Class built-in class
// Instance methods of Class, understood by every class object

use super::{check_arity, check_arity_range, get_class_arg, get_method_arg, get_string_arg, optional_arg, MethodTable};
use crate::error::{ErrorKind, OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::class::ClassId;
use crate::vm::interner::message_name;
use crate::vm::method::Method;
use crate::vm::value::Value;
use crate::vm::vm::VM;

pub fn instance_methods() -> MethodTable {
    vec![
        ("NEW", class_new as NativeMethodFn),
        ("SUBCLASS", class_subclass),
        ("MIXINCLASS", class_mixin_class),
        ("INHERIT", class_inherit),
        ("DEFINE", class_define),
        ("DELETE", class_delete),
        ("ATTRIBUTE", class_attribute),
        ("METHOD", class_method),
        ("INSTANCEMETHODS", class_instance_methods),
        ("SUPERCLASS", class_superclass),
        ("ID", class_id),
        ("ISSUBCLASSOF", class_is_subclass_of),
    ]
}

fn receiver_class(recv: &Value) -> OryxResult<ClassId> {
    recv.as_class()
        .ok_or_else(|| OryxError::invalid_argument("Receiver must be a class"))
}

/// class~new(args...) - allocate and send INIT with the same arguments
fn class_new(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    let class = receiver_class(recv)?;
    vm.new_instance(activation, class, args)
}

fn class_subclass(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = receiver_class(recv)?;
    let name = get_string_arg(vm, activation, args, 0)?;
    vm.subclass(class, &name).map(Value::Class)
}

fn class_mixin_class(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = receiver_class(recv)?;
    let name = get_string_arg(vm, activation, args, 0)?;
    vm.mixin_class(class, &name).map(Value::Class)
}

fn class_inherit(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = receiver_class(recv)?;
    vm.inherit(class, get_class_arg(args, 0)?)?;
    Ok(Value::Nil)
}

/// class~define(name [, method]) - no method hides the name
fn class_define(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity_range(1, 2, args.len())?;
    let class = receiver_class(recv)?;
    let name = get_string_arg(vm, activation, args, 0)?;
    let method = get_method_arg(vm, args, 1)?;
    vm.define_method_id(class, &name, method)?;
    Ok(Value::Nil)
}

/// cls~attribute(name) - NAME reads and NAME= writes the object variable NAME
fn class_attribute(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = receiver_class(recv)?;
    let name = message_name(&get_string_arg(vm, activation, args, 0)?);
    let setter = format!("{}=", name);
    vm.define(class, &name, Some(Method::attribute_getter(name.clone(), name.clone())))?;
    vm.define(class, &setter, Some(Method::attribute_setter(setter.as_str(), name)))?;
    Ok(Value::Nil)
}

fn class_delete(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = receiver_class(recv)?;
    let name = get_string_arg(vm, activation, args, 0)?;
    vm.delete_method(class, &name)?;
    Ok(Value::Nil)
}

/// The instance method `name`; an error when the class has none
fn class_method(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = receiver_class(recv)?;
    let name = get_string_arg(vm, activation, args, 0)?;
    vm.instance_behaviour(class)?
        .get_method(&name)
        .map(Value::Method)
        .ok_or_else(|| {
            OryxError::new(
                ErrorKind::NoMethod,
                format!("Class {} has no instance method \"{}\"", vm.class_name(class), name),
            )
        })
}

/// Names of the instance methods, optionally only those defined by one class
fn class_instance_methods(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity_range(0, 1, args.len())?;
    let class = receiver_class(recv)?;
    let scope = match optional_arg(args, 0) {
        Some(_) => Some(get_class_arg(args, 0)?),
        None => None,
    };
    let names = vm
        .instance_behaviour(class)?
        .get_methods(scope)
        .into_iter()
        .map(|(name, _)| Value::String(name))
        .collect();
    Ok(Value::array(names))
}

fn class_superclass(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let class = receiver_class(recv)?;
    Ok(vm.superclass(class)?.map(Value::Class).unwrap_or(Value::Nil))
}

fn class_id(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::String(vm.class_name(receiver_class(recv)?)))
}

fn class_is_subclass_of(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = receiver_class(recv)?;
    Ok(Value::boolean(vm.is_compatible_with(class, get_class_arg(args, 0)?)))
}
