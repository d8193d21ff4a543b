// Stem built-in class
// Collection access to stem objects: indexes are tails built from the
// arguments, unset tails read as the stem default

use super::{
    check_arity, check_arity_range, get_number_arg, get_string_arg, optional_arg, tail_from_args, MethodTable,
};
use crate::error::{ErrorKind, OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::sort::SortOptions;
use crate::vm::value::Value;
use crate::vm::vm::VM;

pub fn instance_methods() -> MethodTable {
    vec![
        ("[]", stem_at as NativeMethodFn),
        ("AT", stem_at),
        ("[]=", stem_put),
        ("PUT", stem_put),
        ("REMOVE", stem_remove),
        ("HASINDEX", stem_has_index),
        ("ITEMS", stem_items),
        ("ALLINDEXES", stem_all_indexes),
        ("ALLITEMS", stem_all_items),
        ("INDEX", stem_index),
        ("EMPTY", stem_empty),
        ("ISEMPTY", stem_is_empty),
        ("MAKEARRAY", stem_make_array),
        ("TODIRECTORY", stem_to_directory),
        ("SORT", stem_sort),
        ("UNKNOWN", stem_unknown),
        ("STRING", stem_string),
        ("REQUEST", stem_request),
    ]
}

/// stem[tails...] - the default value when the tail is unset, or with no tails
fn stem_at(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    if args.is_empty() {
        return vm.with_stem(recv, |s| s.value());
    }
    let tail = tail_from_args(vm, activation, args)?;
    vm.with_stem(recv, |s| s.get(&tail))
}

/// stem[tails...] = value - with no tails assigns the default and clears every tail
fn stem_put(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    let (value, tails) = args
        .split_first()
        .ok_or_else(|| OryxError::invalid_argument("PUT requires a value"))?;
    if tails.is_empty() {
        if vm.stem_object(value).is_ok() {
            return Err(OryxError::new(
                ErrorKind::InvalidStemValue,
                "A stem cannot be the default value of a stem",
            ));
        }
        vm.with_stem(recv, |s| s.set_value(value.clone()))?;
        return Ok(Value::Nil);
    }
    let tail = tail_from_args(vm, activation, tails)?;
    vm.with_stem(recv, |s| s.set(&tail, value.clone()))?;
    Ok(Value::Nil)
}

fn stem_remove(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    let tail = tail_from_args(vm, activation, args)?;
    Ok(vm.with_stem(recv, |s| s.remove(&tail))?.unwrap_or(Value::Nil))
}

fn stem_has_index(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    let tail = tail_from_args(vm, activation, args)?;
    Ok(Value::boolean(vm.with_stem(recv, |s| s.has_index(&tail))?))
}

fn stem_items(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::from(vm.with_stem(recv, |s| s.items())?))
}

fn stem_all_indexes(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::array(vm.with_stem(recv, |s| s.all_indexes())?))
}

fn stem_all_items(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::array(vm.with_stem(recv, |s| s.all_items())?))
}

fn stem_index(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    Ok(vm
        .with_stem(recv, |s| s.index_of(&args[0]))?
        .map(Value::String)
        .unwrap_or(Value::Nil))
}

fn stem_empty(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    vm.with_stem(recv, |s| s.empty())?;
    Ok(Value::Nil)
}

fn stem_is_empty(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::boolean(vm.with_stem(recv, |s| s.is_empty())?))
}

fn stem_make_array(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    stem_all_items(vm, activation, recv, args)
}

/// A new directory holding every set tail
fn stem_to_directory(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let entries = vm.with_stem(recv, |s| s.entries())?;
    let directory = vm.new_directory();
    for (tail, value) in entries {
        vm.directory_put(&directory, &tail, value)?;
    }
    Ok(directory)
}

/// stem~sort([order] [, case] [, first] [, last] [, column] [, length] [, prefix])
///
/// Sorts `prefix1` .. `prefixN` where `prefix0` holds N.
fn stem_sort(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity_range(0, 7, args.len())?;
    let order = optional_arg(args, 0).and_then(|v| v.as_str());
    let case = optional_arg(args, 1).and_then(|v| v.as_str());
    let first = get_number_arg(args, 2)?.unwrap_or(1);
    let last = get_number_arg(args, 3)?;
    let column = get_number_arg(args, 4)?.unwrap_or(1);
    let length = get_number_arg(args, 5)?;
    let prefix = match optional_arg(args, 6) {
        Some(_) => get_string_arg(vm, activation, args, 6)?.to_string(),
        None => String::new(),
    };
    let options = SortOptions::parse(order, case)?.with_columns(column, length)?;
    vm.sort_stem(activation, recv, &prefix, first, last, options)?;
    Ok(Value::Nil)
}

/// Messages a stem does not understand go to its default value
fn stem_unknown(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(2, args.len())?;
    let message = get_string_arg(vm, activation, args, 0)?;
    let message_args = match &args[1] {
        Value::Array(items) => items.lock().clone(),
        _ => Vec::new(),
    };
    let default = vm.with_stem(recv, |s| s.value())?;
    vm.send_message(activation, &default, &message, &message_args)
}

fn stem_string(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let default = vm.with_stem(recv, |s| s.value())?;
    vm.string_value(activation, &default).map(Value::String)
}

/// stem~request(class name) - ARRAY, DIRECTORY or STEM; nil otherwise
fn stem_request(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let class = get_string_arg(vm, activation, args, 0)?;
    match class.to_ascii_uppercase().as_str() {
        "ARRAY" => stem_make_array(vm, activation, recv, &[]),
        "DIRECTORY" => stem_to_directory(vm, activation, recv, &[]),
        "STEM" => Ok(recv.clone()),
        _ => Ok(Value::Nil),
    }
}

