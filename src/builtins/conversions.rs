// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::value::Value;

use std::collections::HashMap;

use anyhow::Result;

// Conversion failures surface as `EvalError::TypeCoercion`. `null` passes
// through every conversion unchanged.
pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("tobool", (tobool, 1));
    m.insert("tolist", (tolist, 1));
    m.insert("tomap", (tomap, 1));
    m.insert("tonumber", (tonumber, 1));
    m.insert("tostring", (tostring, 1));
    m.insert("type", (type_name, 1));
}

fn tobool(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        v => Ok(Value::Bool(v.coerce_to_bool()?)),
    }
}

fn tolist(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        v => Ok(Value::Array(v.coerce_to_list()?)),
    }
}

fn tomap(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        v => Ok(Value::Object(v.coerce_to_map()?)),
    }
}

fn tonumber(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        v => Ok(Value::Number(v.coerce_to_number()?)),
    }
}

fn tostring(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        v => Ok(Value::String(v.coerce_to_string()?)),
    }
}

fn type_name(args: &[Value]) -> Result<Value> {
    Ok(Value::from(args[0].type_name()))
}
