//! Built-in methods on strings, lists and maps.
//!
//! Names follow the conventions templates already use (`size`, `isEmpty`,
//! `toUpperCase`, `containsKey`, ...). Selection is by runtime type, name
//! and argument count; a handle is only ever invoked on values of the type it
//! was looked up for, but every body still checks its target.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{method_failed, RenderError, RenderResult};
use crate::value::{RuntimeType, Value};

pub(super) type Builtin = fn(&Value, &[Value]) -> RenderResult<Value>;

pub(super) fn lookup(ty: RuntimeType, method: &str, arg_count: usize) -> Option<Builtin> {
    let found: Option<Builtin> = match (ty, method, arg_count) {
        (RuntimeType::Str, "length" | "size", 0) => Some(str_length),
        (RuntimeType::Str, "isEmpty", 0) => Some(str_is_empty),
        (RuntimeType::Str, "toUpperCase", 0) => Some(str_upper),
        (RuntimeType::Str, "toLowerCase", 0) => Some(str_lower),
        (RuntimeType::Str, "trim", 0) => Some(str_trim),
        (RuntimeType::Str, "contains", 1) => Some(str_contains),
        (RuntimeType::Str, "startsWith", 1) => Some(str_starts_with),
        (RuntimeType::Str, "endsWith", 1) => Some(str_ends_with),
        (RuntimeType::Str, "substring", 1 | 2) => Some(str_substring),

        (RuntimeType::List, "size", 0) => Some(list_size),
        (RuntimeType::List, "isEmpty", 0) => Some(list_is_empty),
        (RuntimeType::List, "get", 1) => Some(list_get),
        (RuntimeType::List, "contains", 1) => Some(list_contains),

        (RuntimeType::Map, "size", 0) => Some(map_size),
        (RuntimeType::Map, "isEmpty", 0) => Some(map_is_empty),
        (RuntimeType::Map, "get", 1) => Some(map_get),
        (RuntimeType::Map, "containsKey", 1) => Some(map_contains_key),
        (RuntimeType::Map, "keySet", 0) => Some(map_keys),
        (RuntimeType::Map, "values", 0) => Some(map_values),

        _ => None,
    };
    found.or(match (method, arg_count) {
        ("toString", 0) => Some(to_string as Builtin),
        _ => None,
    })
}

fn type_mismatch(method: &str, target: &Value) -> RenderError {
    method_failed(
        method,
        target.runtime_type().name(),
        "receiver has the wrong type",
    )
}

fn as_str<'v>(method: &str, target: &'v Value) -> RenderResult<&'v str> {
    target.as_str().ok_or_else(|| type_mismatch(method, target))
}

fn as_list<'v>(method: &str, target: &'v Value) -> RenderResult<&'v [Value]> {
    match target {
        Value::List(items) => Ok(items.as_slice()),
        _ => Err(type_mismatch(method, target)),
    }
}

fn as_map<'v>(method: &str, target: &'v Value) -> RenderResult<&'v BTreeMap<String, Value>> {
    match target {
        Value::Map(entries) => Ok(entries),
        _ => Err(type_mismatch(method, target)),
    }
}

fn arg<'a>(
    method: &str,
    type_name: &str,
    args: &'a [Value],
    index: usize,
) -> RenderResult<&'a Value> {
    args.get(index)
        .ok_or_else(|| method_failed(method, type_name, format!("missing argument {index}")))
}

fn index_arg(method: &str, type_name: &str, value: &Value) -> RenderResult<usize> {
    value
        .as_int()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| method_failed(method, type_name, format!("invalid index {value}")))
}

fn len_value(len: usize) -> Value {
    Value::Int(i64::try_from(len).unwrap_or(i64::MAX))
}

// Strings

fn str_length(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(len_value(as_str("length", target)?.chars().count()))
}

fn str_is_empty(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(Value::Bool(as_str("isEmpty", target)?.is_empty()))
}

fn str_upper(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(Value::from(as_str("toUpperCase", target)?.to_uppercase()))
}

fn str_lower(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(Value::from(as_str("toLowerCase", target)?.to_lowercase()))
}

fn str_trim(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(Value::from(as_str("trim", target)?.trim()))
}

fn str_contains(target: &Value, args: &[Value]) -> RenderResult<Value> {
    let s = as_str("contains", target)?;
    let needle = arg("contains", "string", args, 0)?.to_string();
    Ok(Value::Bool(s.contains(needle.as_str())))
}

fn str_starts_with(target: &Value, args: &[Value]) -> RenderResult<Value> {
    let s = as_str("startsWith", target)?;
    let prefix = arg("startsWith", "string", args, 0)?.to_string();
    Ok(Value::Bool(s.starts_with(prefix.as_str())))
}

fn str_ends_with(target: &Value, args: &[Value]) -> RenderResult<Value> {
    let s = as_str("endsWith", target)?;
    let suffix = arg("endsWith", "string", args, 0)?.to_string();
    Ok(Value::Bool(s.ends_with(suffix.as_str())))
}

/// `substring(begin[, end])` over characters, end exclusive.
fn str_substring(target: &Value, args: &[Value]) -> RenderResult<Value> {
    let s = as_str("substring", target)?;
    let len = s.chars().count();
    let begin = index_arg("substring", "string", arg("substring", "string", args, 0)?)?;
    let end = match args.get(1) {
        Some(end) => index_arg("substring", "string", end)?,
        None => len,
    };
    if begin > end || end > len {
        return Err(method_failed(
            "substring",
            "string",
            format!("range {begin}..{end} out of bounds for length {len}"),
        ));
    }
    Ok(Value::from(
        s.chars().take(end).skip(begin).collect::<String>(),
    ))
}

// Lists

fn list_size(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(len_value(as_list("size", target)?.len()))
}

fn list_is_empty(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(Value::Bool(as_list("isEmpty", target)?.is_empty()))
}

fn list_get(target: &Value, args: &[Value]) -> RenderResult<Value> {
    let items = as_list("get", target)?;
    let index = index_arg("get", "list", arg("get", "list", args, 0)?)?;
    items.get(index).cloned().ok_or_else(|| {
        method_failed(
            "get",
            "list",
            format!("index {index} out of bounds for length {}", items.len()),
        )
    })
}

fn list_contains(target: &Value, args: &[Value]) -> RenderResult<Value> {
    let items = as_list("contains", target)?;
    let needle = arg("contains", "list", args, 0)?;
    Ok(Value::Bool(items.contains(needle)))
}

// Maps

fn map_size(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(len_value(as_map("size", target)?.len()))
}

fn map_is_empty(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(Value::Bool(as_map("isEmpty", target)?.is_empty()))
}

/// Missing keys yield `null`, not an error.
fn map_get(target: &Value, args: &[Value]) -> RenderResult<Value> {
    let entries = as_map("get", target)?;
    let key = arg("get", "map", args, 0)?.to_string();
    Ok(entries.get(&key).cloned().unwrap_or_default())
}

fn map_contains_key(target: &Value, args: &[Value]) -> RenderResult<Value> {
    let entries = as_map("containsKey", target)?;
    let key = arg("containsKey", "map", args, 0)?.to_string();
    Ok(Value::Bool(entries.contains_key(&key)))
}

fn map_keys(target: &Value, _: &[Value]) -> RenderResult<Value> {
    let entries = as_map("keySet", target)?;
    Ok(Value::list(entries.keys().map(|k| Value::from(k.as_str()))))
}

fn map_values(target: &Value, _: &[Value]) -> RenderResult<Value> {
    let entries = as_map("values", target)?;
    Ok(Value::List(Arc::new(entries.values().cloned().collect())))
}

// Any type

fn to_string(target: &Value, _: &[Value]) -> RenderResult<Value> {
    Ok(Value::from(target.to_string()))
}
