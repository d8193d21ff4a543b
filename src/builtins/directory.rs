// Directory built-in class
// Stored values, computed entries (SETMETHOD) and UNKNOWN for directories

use super::{check_arity, check_arity_range, get_method_arg, get_string_arg, optional_arg, MethodTable};
use crate::error::{OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::interner::message_name;
use crate::vm::value::Value;
use crate::vm::vm::VM;

pub fn instance_methods() -> MethodTable {
    vec![
        ("AT", dir_at as NativeMethodFn),
        ("[]", dir_at),
        ("PUT", dir_put),
        ("[]=", dir_put),
        ("ENTRY", dir_entry),
        ("SETENTRY", dir_set_entry),
        ("HASENTRY", dir_has_entry),
        ("REMOVE", dir_remove),
        ("HASINDEX", dir_has_index),
        ("ITEMS", dir_items),
        ("ALLINDEXES", dir_all_indexes),
        ("ALLITEMS", dir_all_items),
        ("INDEX", dir_index),
        ("EMPTY", dir_empty),
        ("ISEMPTY", dir_is_empty),
        ("SETMETHOD", dir_set_method),
        ("UNSETMETHOD", dir_unset_method),
        ("UNKNOWN", dir_unknown),
    ]
}

/// dir~at(index) - nil when nothing answers for the index
fn dir_at(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let index = get_string_arg(vm, activation, args, 0)?;
    Ok(vm.directory_get(activation, recv, &index)?.unwrap_or(Value::Nil))
}

/// dir~put(value, index)
fn dir_put(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(2, args.len())?;
    let index = get_string_arg(vm, activation, args, 1)?;
    vm.directory_put(recv, &index, args[0].clone())?;
    Ok(Value::Nil)
}

/// dir~entry(name) - like AT with the name upper-cased
fn dir_entry(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let name = message_name(&get_string_arg(vm, activation, args, 0)?);
    Ok(vm.directory_get(activation, recv, &name)?.unwrap_or(Value::Nil))
}

/// dir~setEntry(name [, value]) - no value removes the entry
fn dir_set_entry(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity_range(1, 2, args.len())?;
    let name = message_name(&get_string_arg(vm, activation, args, 0)?);
    match optional_arg(args, 1) {
        Some(value) => vm.directory_put(recv, &name, value.clone())?,
        None => {
            vm.directory_remove(activation, recv, &name)?;
        }
    }
    Ok(Value::Nil)
}

fn dir_has_entry(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let name = message_name(&get_string_arg(vm, activation, args, 0)?);
    Ok(Value::boolean(vm.directory_has_index(recv, &name)?))
}

fn dir_remove(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let index = get_string_arg(vm, activation, args, 0)?;
    Ok(vm.directory_remove(activation, recv, &index)?.unwrap_or(Value::Nil))
}

fn dir_has_index(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let index = get_string_arg(vm, activation, args, 0)?;
    Ok(Value::boolean(vm.directory_has_index(recv, &index)?))
}

fn dir_items(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::from(vm.directory_items(recv)?))
}

fn dir_all_indexes(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::array(vm.directory_indexes(recv)?))
}

fn dir_all_items(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::array(vm.directory_all_items(activation, recv)?))
}

fn dir_index(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    Ok(vm
        .directory_index_of(activation, recv, &args[0])?
        .map(Value::String)
        .unwrap_or(Value::Nil))
}

fn dir_empty(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    vm.directory_empty(recv)?;
    Ok(Value::Nil)
}

fn dir_is_empty(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::boolean(vm.directory_items(recv)? == 0))
}

/// dir~setMethod(name [, method]) - a computed entry, or UNKNOWN
fn dir_set_method(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity_range(1, 2, args.len())?;
    let name = get_string_arg(vm, activation, args, 0)?;
    let method = get_method_arg(vm, args, 1)?;
    vm.directory_set_method(recv, &name, method)?;
    Ok(Value::Nil)
}

fn dir_unset_method(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let name = get_string_arg(vm, activation, args, 0)?;
    vm.directory_set_method(recv, &name, None)?;
    Ok(Value::Nil)
}

/// `dir~foo` reads entry FOO, `dir~foo=(value)` writes it
fn dir_unknown(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(2, args.len())?;
    let message = get_string_arg(vm, activation, args, 0)?;
    let message_args = match &args[1] {
        Value::Array(items) => items.lock().clone(),
        _ => Vec::new(),
    };
    match message.strip_suffix('=') {
        Some(name) if !name.is_empty() => {
            let value = message_args
                .first()
                .cloned()
                .ok_or_else(|| OryxError::invalid_argument(format!("\"{}\" requires a value", message)))?;
            vm.directory_put(recv, name, value)?;
            Ok(Value::Nil)
        }
        _ => Ok(vm.directory_get(activation, recv, &message)?.unwrap_or(Value::Nil)),
    }
}
