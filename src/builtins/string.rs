// String built-in class
// The few string methods the object model itself relies on

use super::{check_arity, get_string_arg, MethodTable};
use crate::error::{OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::value::Value;
use crate::vm::vm::VM;
use std::sync::Arc;

pub fn instance_methods() -> MethodTable {
    vec![
        ("STRING", string_string as NativeMethodFn),
        ("LENGTH", string_length),
        ("UPPER", string_upper),
        ("LOWER", string_lower),
        ("||", string_concat),
        ("CONCAT", string_concat),
    ]
}

fn receiver_string(recv: &Value) -> OryxResult<&Arc<str>> {
    match recv {
        Value::String(s) => Ok(s),
        _ => Err(OryxError::invalid_argument("Receiver must be a string")),
    }
}

fn string_string(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::String(receiver_string(recv)?.clone()))
}

fn string_length(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::from(receiver_string(recv)?.chars().count()))
}

fn string_upper(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::string(receiver_string(recv)?.to_uppercase()))
}

fn string_lower(_vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    Ok(Value::string(receiver_string(recv)?.to_lowercase()))
}

/// str || other - the argument is converted with STRING
fn string_concat(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(1, args.len())?;
    let left = receiver_string(recv)?;
    let right = get_string_arg(vm, activation, args, 0)?;
    let mut result = String::with_capacity(left.len() + right.len());
    result.push_str(left);
    result.push_str(&right);
    Ok(Value::string(result))
}
