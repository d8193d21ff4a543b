// Message built-in class
// Message objects returned by START, or created with Message~new(target, name, args...)

use super::{check_arity, MethodTable};
use crate::error::{ErrorKind, OryxError, OryxResult};
use crate::vm::caller::{Activation, NativeMethodFn};
use crate::vm::object::ObjectRef;
use crate::vm::value::Value;
use crate::vm::vm::VM;

pub fn instance_methods() -> MethodTable {
    vec![
        ("SEND", message_send as NativeMethodFn),
        ("RESULT", message_result),
        ("COMPLETED", message_completed),
        ("TARGET", message_target),
        ("MESSAGENAME", message_name),
        ("ARGUMENTS", message_arguments),
    ]
}

fn receiver_message(vm: &VM, recv: &Value) -> OryxResult<ObjectRef> {
    let object = match recv {
        Value::Object(id) => vm.object(*id)?,
        _ => return Err(OryxError::invalid_argument("Receiver must be a message")),
    };
    if object.message().is_none() {
        return Err(OryxError::invalid_argument("Receiver must be a message"));
    }
    Ok(object)
}

/// Send the message now, on the calling activity
fn message_send(vm: &VM, activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let object = receiver_message(vm, recv)?;
    let Some(message) = object.message() else {
        return Err(OryxError::invalid_argument("Receiver must be a message"));
    };
    if !message.mark_started() {
        return Err(OryxError::new(ErrorKind::Activity, "Message has already been sent"));
    }
    let result = vm.send_message(activation, message.target(), message.message(), message.args());
    message.complete(result.clone());
    result
}

/// Wait for the result; a failure of the message is raised again here
fn message_result(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let object = receiver_message(vm, recv)?;
    match object.message() {
        Some(message) if message.is_started() => message.wait(),
        Some(_) => Err(OryxError::new(ErrorKind::Activity, "Message has not been sent")),
        None => Err(OryxError::invalid_argument("Receiver must be a message")),
    }
}

fn message_completed(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let object = receiver_message(vm, recv)?;
    Ok(Value::boolean(object.message().map(|m| m.is_complete()).unwrap_or(false)))
}

fn message_target(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let object = receiver_message(vm, recv)?;
    Ok(object.message().map(|m| m.target().clone()).unwrap_or(Value::Nil))
}

fn message_name(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let object = receiver_message(vm, recv)?;
    Ok(object
        .message()
        .map(|m| Value::String(m.message().clone()))
        .unwrap_or(Value::Nil))
}

fn message_arguments(vm: &VM, _activation: &Activation, recv: &Value, args: &[Value]) -> OryxResult<Value> {
    check_arity(0, args.len())?;
    let object = receiver_message(vm, recv)?;
    Ok(Value::array(object.message().map(|m| m.args().to_vec()).unwrap_or_default()))
}
