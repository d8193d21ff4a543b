// Object built-in class
// Methods every object understands: instance methods, dynamic sends,
// copying, naming and identity comparison

use super::{check_arity, check_arity_range, get_class_arg, get_method_arg, get_string_arg, optional_arg, MethodTable};
use crate::error::{OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::value::Value;
use crate::vm::vm::VM;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub fn instance_methods() -> MethodTable {
    vec![
        ("INIT", object_init as NativeMethodFn),
        ("SETMETHOD", object_set_method),
        ("UNSETMETHOD", object_unset_method),
        ("HASMETHOD", object_has_method),
        ("INSTANCEMETHOD", object_instance_method),
        ("SEND", object_send),
        ("SENDWITH", object_send_with),
        ("START", object_start),
        ("STARTWITH", object_start_with),
        ("COPY", object_copy),
        ("CLASS", object_class),
        ("ISINSTANCEOF", object_is_instance_of),
        ("OBJECTNAME", object_object_name),
        ("OBJECTNAME=", object_set_object_name),
        ("DEFAULTNAME", object_default_name),
        ("STRING", object_string),
        ("IDENTITYHASH", object_identity_hash),
        ("=", object_equal),
        ("==", object_equal),
        ("\\=", object_not_equal),
        ("\\==", object_not_equal),
    ]
}

/// Accepts and ignores any arguments
fn object_init(_vm: &VM, _activation: &Activation, _recv: &Value, _args: &[Value]) -> OryxResult<Value> {
    Ok(Value::Nil)
}

/// obj~setMethod(name, method [, "FLOAT" | "OBJECT"])
fn object_set_method(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity_range(1, 3, args.len())?;
    let name = get_string_arg(vm, activation, args, 0)?;
    let method = get_method_arg(vm, args, 1)?;
    let object_scope = match optional_arg(args, 2).and_then(|v| v.as_str()) {
        None => false,
        Some(option) => match option.trim().to_ascii_uppercase().chars().next() {
            Some('F') => false,
            Some('O') => true,
            _ => {
                return Err(OryxError::invalid_argument(format!(
                    "SETMETHOD scope must be \"FLOAT\" or \"OBJECT\", found \"{}\"",
                    option
                )))
            }
        },
    };
    vm.set_instance_method(recv, &name, method, object_scope)?;
    Ok(Value::Nil)
}

fn object_unset_method(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let name = get_string_arg(vm, activation, args, 0)?;
    vm.unset_instance_method(recv, &name)?;
    Ok(Value::Nil)
}

fn object_has_method(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let name = get_string_arg(vm, activation, args, 0)?;
    Ok(Value::boolean(vm.behaviour_of(recv)?.has_method(&name)))
}

/// The method the receiver runs for a message, or nil
fn object_instance_method(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let name = get_string_arg(vm, activation, args, 0)?;
    Ok(vm
        .behaviour_of(recv)?
        .get_method(&name)
        .map(Value::Method)
        .unwrap_or(Value::Nil))
}

fn object_send(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    let message = args
        .first()
        .ok_or_else(|| OryxError::invalid_argument("SEND requires a message name"))?;
    vm.send(activation, recv, message, &args[1..])
}

fn object_send_with(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(2, args.len())?;
    vm.send_with(activation, recv, &args[0], &args[1])
}

fn object_start(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    let message = args
        .first()
        .ok_or_else(|| OryxError::invalid_argument("START requires a message name"))?;
    vm.start(activation, recv, message, &args[1..])
}

fn object_start_with(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(2, args.len())?;
    vm.start_with(activation, recv, &args[0], &args[1])
}

fn object_copy(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    vm.copy(recv)
}

fn object_class(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::Class(vm.class_of(recv)))
}

fn object_is_instance_of(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = get_class_arg(args, 0)?;
    Ok(Value::boolean(vm.is_instance_of(recv, class)))
}

fn object_object_name(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::string(vm.default_name(recv)))
}

fn object_set_object_name(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let name = get_string_arg(vm, activation, args, 0)?;
    match recv {
        Value::Object(id) => vm.object(*id)?.set_object_name(Some(name)),
        other => {
            return Err(OryxError::invalid_argument(format!(
                "Cannot rename a {}",
                other.type_name()
            )))
        }
    }
    Ok(Value::Nil)
}

/// "a CLASSNAME" regardless of OBJECTNAME=
fn object_default_name(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    if let Value::Object(id) = recv {
        let object = vm.object(*id)?;
        let saved = object.object_name();
        object.set_object_name(None);
        let name = vm.default_name(recv);
        object.set_object_name(saved);
        return Ok(Value::string(name));
    }
    Ok(Value::string(vm.default_name(recv)))
}

fn object_string(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::string(vm.default_name(recv)))
}

fn object_identity_hash(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let mut hasher = FxHasher::default();
    match recv {
        Value::Nil => 0u8.hash(&mut hasher),
        Value::String(s) => s.hash(&mut hasher),
        Value::Array(items) => (Arc::as_ptr(items) as *const () as usize).hash(&mut hasher),
        Value::Object(id) => (1u8, id.index(), id.generation()).hash(&mut hasher),
        Value::Class(id) => (2u8, id.index(), id.generation()).hash(&mut hasher),
        Value::Method(id) => (3u8, id.index(), id.generation()).hash(&mut hasher),
        Value::Package(id) => (4u8, id.index(), id.generation()).hash(&mut hasher),
    }
    Ok(Value::string(hasher.finish().to_string()))
}

fn object_equal(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    Ok(Value::boolean(recv.identical(&args[0])))
}

fn object_not_equal(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    Ok(Value::boolean(!recv.identical(&args[0])))
}
