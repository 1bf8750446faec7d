//! Narrow bridges between Python values and JSON, used where the kernel
//! needs to hand a namespace value to something outside the interpreter:
//! SQL parameter binding and MIME-bundle fallbacks. Deliberately not a
//! general py<->json codec — SQL template variables and chart dict forms
//! are scalars, strings, or JSON-able-by-the-library-itself, so we lean on
//! `json.dumps` for anything structured rather than hand-walking objects.

use rustpython_vm::{PyObjectRef, TryFromObject, VirtualMachine};
use serde_json::Value;

/// Convert a namespace value to JSON for use as a SQL bind parameter.
/// Falls back to `str(value)` for anything that isn't a primitive. Booleans
/// fall through to the integer branch (0/1), which is also the correct
/// on-the-wire representation for SQLite, which has no native boolean type.
pub fn to_json(vm: &VirtualMachine, obj: &PyObjectRef) -> Option<Value> {
    if vm.is_none(obj) {
        return Some(Value::Null);
    }
    if let Ok(s) = String::try_from_object(vm, obj.clone()) {
        return Some(Value::from(s));
    }
    if let Ok(i) = i64::try_from_object(vm, obj.clone()) {
        return Some(Value::from(i));
    }
    if let Ok(f) = f64::try_from_object(vm, obj.clone()) {
        return Some(Value::from(f));
    }
    obj.str(vm).ok().map(|s| Value::from(s.as_str().to_string()))
}

/// Call `json.dumps(value)` and return the resulting JSON text, for
/// objects (like a chart's `.to_dict()`) that are themselves structured.
pub fn json_dumps(vm: &VirtualMachine, value: &PyObjectRef) -> Option<String> {
    let json_module = vm.import("json", 0).ok()?;
    let dumped = vm.call_method(&json_module, "dumps", (value.clone(),)).ok()?;
    dumped.str(vm).ok().map(|s| s.as_str().to_string())
}

/// True if `obj` has a callable attribute named `name`.
pub fn has_callable_attr(vm: &VirtualMachine, obj: &PyObjectRef, name: &str) -> bool {
    obj.get_attr(name, vm)
        .map(|attr| vm.is_callable(&attr))
        .unwrap_or(false)
}

/// True if `obj` has any attribute named `name`, callable or not.
pub fn has_attr(vm: &VirtualMachine, obj: &PyObjectRef, name: &str) -> bool {
    obj.get_attr(name, vm).is_ok()
}

/// `type(obj).__module__`, or an empty string if it can't be read.
pub fn module_name(vm: &VirtualMachine, obj: &PyObjectRef) -> String {
    let class_obj: PyObjectRef = obj.class().to_owned().into();
    class_obj
        .get_attr("__module__", vm)
        .ok()
        .and_then(|m| m.str(vm).ok())
        .map(|s| s.as_str().to_string())
        .unwrap_or_default()
}
