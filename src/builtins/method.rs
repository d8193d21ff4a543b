// Method built-in class
// Flag setters and queries on method objects

use super::{check_arity, MethodTable};
use crate::error::{OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::method::{Method, MethodFlags, MethodId};
use crate::vm::value::Value;
use crate::vm::vm::VM;

pub fn instance_methods() -> MethodTable {
    vec![
        ("SETPRIVATE", method_set_private as NativeMethodFn),
        ("SETPUBLIC", method_set_public),
        ("SETPACKAGE", method_set_package),
        ("SETPROTECTED", method_set_protected),
        ("SETUNPROTECTED", method_set_unprotected),
        ("SETGUARDED", method_set_guarded),
        ("SETUNGUARDED", method_set_unguarded),
        ("ISPRIVATE", method_is_private),
        ("ISPROTECTED", method_is_protected),
        ("ISPACKAGE", method_is_package),
        ("ISGUARDED", method_is_guarded),
        ("ISATTRIBUTE", method_is_attribute),
        ("ISCONSTANT", method_is_constant),
        ("ISABSTRACT", method_is_abstract),
        ("SCOPE", method_scope),
        ("PACKAGE", method_package),
        ("NAME", method_name),
    ]
}

fn receiver_method(recv: &Value) -> OryxResult<MethodId> {
    recv.as_method()
        .ok_or_else(|| OryxError::invalid_argument("Receiver must be a method"))
}

fn update(vm: &VM, recv: &Value, args: &[Value], change: impl FnOnce(&mut Method)) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    vm.update_method(receiver_method(recv)?, change)?;
    Ok(Value::Nil)
}

fn query(vm: &VM, recv: &Value, args: &[Value], test: impl FnOnce(&Method) -> bool) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let method = vm.method(receiver_method(recv)?)?;
    Ok(Value::boolean(test(&method)))
}

fn method_set_private(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    update(vm, recv, args, |m| m.set_flag(MethodFlags::PRIVATE, true))
}

/// Clears both private and package visibility
fn method_set_public(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    update(vm, recv, args, |m| {
        m.set_flag(MethodFlags::PRIVATE, false);
        m.set_flag(MethodFlags::PACKAGE, false);
    })
}

fn method_set_package(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    update(vm, recv, args, |m| m.set_flag(MethodFlags::PACKAGE, true))
}

fn method_set_protected(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    update(vm, recv, args, |m| m.set_flag(MethodFlags::PROTECTED, true))
}

fn method_set_unprotected(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    update(vm, recv, args, |m| m.set_flag(MethodFlags::PROTECTED, false))
}

fn method_set_guarded(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    update(vm, recv, args, |m| m.set_flag(MethodFlags::UNGUARDED, false))
}

fn method_set_unguarded(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    update(vm, recv, args, |m| m.set_flag(MethodFlags::UNGUARDED, true))
}

fn method_is_private(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    query(vm, recv, args, Method::is_private)
}

fn method_is_protected(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    query(vm, recv, args, Method::is_protected)
}

fn method_is_package(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    query(vm, recv, args, Method::is_package_scope)
}

fn method_is_guarded(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    query(vm, recv, args, Method::is_guarded)
}

fn method_is_attribute(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    query(vm, recv, args, |m| m.flags().contains(MethodFlags::ATTRIBUTE))
}

fn method_is_constant(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    query(vm, recv, args, |m| m.flags().contains(MethodFlags::CONSTANT))
}

fn method_is_abstract(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    query(vm, recv, args, Method::is_abstract)
}

/// The defining class, or nil for a floating method
fn method_scope(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let method = vm.method(receiver_method(recv)?)?;
    Ok(method.scope().map(Value::Class).unwrap_or(Value::Nil))
}

fn method_package(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let method = vm.method(receiver_method(recv)?)?;
    Ok(method.package().map(Value::Package).unwrap_or(Value::Nil))
}

fn method_name(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let method = vm.method(receiver_method(recv)?)?;
    Ok(Value::String(method.name().clone()))
}
