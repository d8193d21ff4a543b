// Array built-in class
// 1-based access to the argument arrays handed to UNKNOWN and SENDWITH

use super::{check_arity, MethodTable};
use crate::error::{OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::value::{ArrayRef, Value};
use crate::vm::vm::VM;

pub fn instance_methods() -> MethodTable {
    vec![
        ("ITEMS", array_items as NativeMethodFn),
        ("AT", array_at),
        ("[]", array_at),
        ("PUT", array_put),
        ("[]=", array_put),
        ("APPEND", array_append),
        ("MAKEARRAY", array_make_array),
    ]
}

fn receiver_array(recv: &Value) -> OryxResult<&ArrayRef> {
    match recv {
        Value::Array(items) => Ok(items),
        _ => Err(OryxError::invalid_argument("Receiver must be an array")),
    }
}

fn index_arg(args: &[Value], position: usize) -> OryxResult<usize> {
    match args.get(position).and_then(|v| v.as_whole_number()) {
        Some(index) if index > 0 => Ok(index),
        _ => Err(OryxError::invalid_argument("Array index must be a positive whole number")),
    }
}

fn array_items(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::from(receiver_array(recv)?.lock().len()))
}

/// array[i] - nil past the end
fn array_at(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let index = index_arg(args, 0)?;
    Ok(receiver_array(recv)?
        .lock()
        .get(index - 1)
        .cloned()
        .unwrap_or(Value::Nil))
}

/// array[i] = value - grows the array with nils as needed
fn array_put(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(2, args.len())?;
    let index = index_arg(args, 1)?;
    let mut items = receiver_array(recv)?.lock();
    if items.len() < index {
        items.resize(index, Value::Nil);
    }
    items[index - 1] = args[0].clone();
    Ok(Value::Nil)
}

fn array_append(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let mut items = receiver_array(recv)?.lock();
    items.push(args[0].clone());
    Ok(Value::from(items.len()))
}

fn array_make_array(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    receiver_array(recv)?;
    Ok(recv.clone())
}
