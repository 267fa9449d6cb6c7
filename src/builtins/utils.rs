// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::EvalError;
use crate::number::Number;
use crate::value::{Map, Value};
use crate::Rc;

use anyhow::{bail, Result};

pub fn ensure_args_range(fcn: &str, args: &[Value], min: usize, max: Option<usize>) -> Result<()> {
    let ok = args.len() >= min && max.is_none_or(|max| args.len() <= max);
    if !ok {
        let expected = match max {
            Some(max) if max == min => format!("{min} arguments"),
            Some(max) => format!("{min} to {max} arguments"),
            None => format!("at least {min} arguments"),
        };
        return Err(EvalError::Arity {
            function: fcn.to_string(),
            expected,
            actual: args.len(),
        }
        .into());
    }
    Ok(())
}

pub fn ensure_present<'a>(fcn: &str, v: &'a Value) -> Result<&'a Value> {
    match v {
        Value::Undefined => Err(EvalError::Absent(format!("`{fcn}` argument is absent")).into()),
        _ => Ok(v),
    }
}

/// Strings, plus numbers and bools which convert automatically.
pub fn ensure_string(fcn: &str, v: &Value) -> Result<Rc<str>> {
    Ok(match ensure_present(fcn, v)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.format_decimal().into(),
        Value::Bool(b) => b.to_string().into(),
        _ => bail!("`{fcn}` expects string argument. Got `{v}` instead"),
    })
}

/// Numbers, plus strings that spell a number.
pub fn ensure_numeric(fcn: &str, v: &Value) -> Result<Number> {
    match ensure_present(fcn, v)? {
        Value::Number(n) => Ok(n.clone()),
        Value::String(_) => Ok(v.coerce_to_number()?),
        _ => bail!("`{fcn}` expects numeric argument. Got `{v}` instead"),
    }
}

pub fn ensure_integer(fcn: &str, v: &Value) -> Result<i64> {
    let n = ensure_numeric(fcn, v)?;
    match n.as_i64() {
        Some(i) if n.is_integer() => Ok(i),
        _ => bail!("`{fcn}` expects integer argument. Got `{v}` instead"),
    }
}

pub fn ensure_bool(fcn: &str, v: &Value) -> Result<bool> {
    match ensure_present(fcn, v)? {
        Value::Bool(b) => Ok(*b),
        Value::String(_) => Ok(v.coerce_to_bool()?),
        _ => bail!("`{fcn}` expects bool argument. Got `{v}` instead"),
    }
}

pub fn ensure_array(fcn: &str, v: &Value) -> Result<Rc<Vec<Value>>> {
    match ensure_present(fcn, v)? {
        Value::Array(a) => Ok(a.clone()),
        _ => bail!("`{fcn}` expects list argument. Got `{v}` instead"),
    }
}

pub fn ensure_object(fcn: &str, v: &Value) -> Result<Rc<Map>> {
    match ensure_present(fcn, v)? {
        Value::Object(o) => Ok(o.clone()),
        _ => bail!("`{fcn}` expects map argument. Got `{v}` instead"),
    }
}

pub fn ensure_string_collection(fcn: &str, v: &Value) -> Result<Vec<Rc<str>>> {
    let mut collection = vec![];
    for (idx, elem) in ensure_array(fcn, v)?.iter().enumerate() {
        match elem {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                collection.push(ensure_string(fcn, elem)?)
            }
            _ => bail!("`{fcn}` expects list of strings. Element {idx} is not a string."),
        }
    }
    Ok(collection)
}

/// Sort and deduplicate. Sets are represented as sorted lists so that their
/// iteration order is deterministic.
pub fn to_set(mut items: Vec<Value>) -> Vec<Value> {
    items.sort();
    items.dedup();
    items
}
