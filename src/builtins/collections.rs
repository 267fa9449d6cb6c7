// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::builtins::utils::{
    ensure_args_range, ensure_array, ensure_bool, ensure_integer, ensure_numeric, ensure_object,
    ensure_present, ensure_string, ensure_string_collection, to_set,
};
use crate::builtins::VARIADIC;
use crate::number::Number;
use crate::value::{Map, Value};

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};

/// Largest list `range` will produce.
const MAX_RANGE_LEN: usize = 1024;

pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("alltrue", (alltrue, 1));
    m.insert("anytrue", (anytrue, 1));
    m.insert("coalesce", (coalesce, VARIADIC));
    m.insert("coalescelist", (coalescelist, VARIADIC));
    m.insert("compact", (compact, 1));
    m.insert("concat", (concat, VARIADIC));
    m.insert("contains", (contains, 2));
    m.insert("distinct", (distinct, 1));
    m.insert("element", (element, 2));
    m.insert("flatten", (flatten, 1));
    m.insert("has", (has, 2));
    m.insert("index", (index, 2));
    m.insert("keys", (keys, 1));
    m.insert("length", (length, 1));
    m.insert("lookup", (lookup, VARIADIC));
    m.insert("merge", (merge, VARIADIC));
    m.insert("one", (one, 1));
    m.insert("range", (range, VARIADIC));
    m.insert("reverse", (reverse, 1));
    m.insert("setintersection", (setintersection, VARIADIC));
    m.insert("setsubtract", (setsubtract, 2));
    m.insert("setunion", (setunion, VARIADIC));
    m.insert("slice", (slice, 3));
    m.insert("sort", (sort, 1));
    m.insert("sum", (sum, 1));
    m.insert("toset", (toset, 1));
    m.insert("transpose", (transpose, 1));
    m.insert("values", (values, 1));
    m.insert("zipmap", (zipmap, 2));
}

fn alltrue(args: &[Value]) -> Result<Value> {
    let name = "alltrue";
    for v in ensure_array(name, &args[0])?.iter() {
        if !ensure_bool(name, v)? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn anytrue(args: &[Value]) -> Result<Value> {
    let name = "anytrue";
    for v in ensure_array(name, &args[0])?.iter() {
        if ensure_bool(name, v)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn coalesce(args: &[Value]) -> Result<Value> {
    let name = "coalesce";
    ensure_args_range(name, args, 1, None)?;
    for a in args {
        match a {
            Value::Null | Value::Undefined => continue,
            Value::String(s) if s.is_empty() => continue,
            _ => return Ok(a.clone()),
        }
    }
    bail!("`{name}` no non-null, non-empty-string arguments")
}

fn coalescelist(args: &[Value]) -> Result<Value> {
    let name = "coalescelist";
    ensure_args_range(name, args, 1, None)?;
    for a in args {
        if !ensure_array(name, a)?.is_empty() {
            return Ok(a.clone());
        }
    }
    bail!("`{name}` no non-empty list arguments")
}

fn compact(args: &[Value]) -> Result<Value> {
    let items = ensure_array("compact", &args[0])?;
    Ok(Value::from(
        items
            .iter()
            .filter(|v| match v {
                Value::Null | Value::Undefined => false,
                Value::String(s) => !s.is_empty(),
                _ => true,
            })
            .cloned()
            .collect::<Vec<Value>>(),
    ))
}

fn concat(args: &[Value]) -> Result<Value> {
    let name = "concat";
    let mut result = vec![];
    for a in args {
        result.extend(ensure_array(name, a)?.iter().cloned());
    }
    Ok(Value::from(result))
}

fn contains(args: &[Value]) -> Result<Value> {
    let name = "contains";
    let items = ensure_array(name, &args[0])?;
    let v = ensure_present(name, &args[1])?;
    Ok(Value::Bool(items.contains(v)))
}

fn distinct(args: &[Value]) -> Result<Value> {
    let items = ensure_array("distinct", &args[0])?;
    let mut result: Vec<Value> = vec![];
    for v in items.iter() {
        if !result.contains(v) {
            result.push(v.clone());
        }
    }
    Ok(Value::from(result))
}

fn element(args: &[Value]) -> Result<Value> {
    let name = "element";
    let items = ensure_array(name, &args[0])?;
    let idx = ensure_integer(name, &args[1])?;
    if items.is_empty() {
        bail!("`{name}` cannot use element function with an empty list");
    }
    if idx < 0 {
        bail!("`{name}` index must not be negative");
    }
    Ok(items[idx as usize % items.len()].clone())
}

fn flatten_into(v: &Value, out: &mut Vec<Value>) {
    match v {
        Value::Array(items) => items.iter().for_each(|i| flatten_into(i, out)),
        _ => out.push(v.clone()),
    }
}

fn flatten(args: &[Value]) -> Result<Value> {
    let items = ensure_array("flatten", &args[0])?;
    let mut out = vec![];
    items.iter().for_each(|i| flatten_into(i, &mut out));
    Ok(Value::from(out))
}

// A member explicitly set to `null` is present.
fn has(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].has(&args[1])))
}

fn index(args: &[Value]) -> Result<Value> {
    let name = "index";
    let items = ensure_array(name, &args[0])?;
    let v = ensure_present(name, &args[1])?;
    match items.iter().position(|i| i == v) {
        Some(p) => Ok(Value::from(p)),
        None => bail!("`{name}` item `{v}` not found"),
    }
}

fn keys(args: &[Value]) -> Result<Value> {
    let obj = ensure_object("keys", &args[0])?;
    let mut keys: Vec<&str> = obj.keys().map(|k| k.as_ref()).collect();
    keys.sort_unstable();
    Ok(Value::from(
        keys.into_iter().map(Value::from).collect::<Vec<Value>>(),
    ))
}

fn values(args: &[Value]) -> Result<Value> {
    let obj = ensure_object("values", &args[0])?;
    let mut entries: Vec<_> = obj.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    Ok(Value::from(
        entries
            .into_iter()
            .map(|(_, v)| v.clone())
            .collect::<Vec<Value>>(),
    ))
}

fn length(args: &[Value]) -> Result<Value> {
    let name = "length";
    Ok(Value::from(match ensure_present(name, &args[0])? {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        v => bail!("`{name}` expects string, list or map argument. Got `{v}` instead"),
    }))
}

fn lookup(args: &[Value]) -> Result<Value> {
    let name = "lookup";
    ensure_args_range(name, args, 2, Some(3))?;
    let obj = ensure_object(name, &args[0])?;
    let key = ensure_string(name, &args[1])?;
    match (obj.get(key.as_ref()), args.get(2)) {
        (Some(v), _) => Ok(v.clone()),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => bail!("`{name}` key `{key}` not found and no default given"),
    }
}

fn merge(args: &[Value]) -> Result<Value> {
    let name = "merge";
    let mut result = Map::new();
    for a in args {
        if a.is_null() {
            continue;
        }
        for (k, v) in ensure_object(name, a)?.iter() {
            result.insert(k.clone(), v.clone());
        }
    }
    Ok(Value::from(result))
}

fn one(args: &[Value]) -> Result<Value> {
    let name = "one";
    let items = ensure_array(name, &args[0])?;
    match items.len() {
        0 => Ok(Value::Null),
        1 => Ok(items[0].clone()),
        n => bail!("`{name}` must have zero or one elements. Got {n}"),
    }
}

fn range(args: &[Value]) -> Result<Value> {
    let name = "range";
    ensure_args_range(name, args, 1, Some(3))?;
    let nums = args
        .iter()
        .map(|a| ensure_numeric(name, a))
        .collect::<Result<Vec<Number>>>()?;
    let (start, limit, step) = match nums.as_slice() {
        [limit] => (Number::from(0i64), limit.clone(), Number::from(1i64)),
        [start, limit] => {
            let step = if limit < start { -1i64 } else { 1i64 };
            (start.clone(), limit.clone(), Number::from(step))
        }
        [start, limit, step] => (start.clone(), limit.clone(), step.clone()),
        _ => bail!("`{name}` expects 1 to 3 arguments"),
    };

    if step.is_zero() {
        bail!("`{name}` step must not be zero");
    }
    if (step.is_negative() && start < limit) || (!step.is_negative() && start > limit) {
        bail!("`{name}` step direction does not reach the limit");
    }

    let mut result = vec![];
    let mut cur = start;
    while (step.is_negative() && cur > limit) || (!step.is_negative() && cur < limit) {
        if result.len() >= MAX_RANGE_LEN {
            bail!("`{name}` more than {MAX_RANGE_LEN} values were generated");
        }
        result.push(Value::from(cur.clone()));
        cur = cur.add(&step)?;
    }
    Ok(Value::from(result))
}

fn reverse(args: &[Value]) -> Result<Value> {
    let items = ensure_array("reverse", &args[0])?;
    Ok(Value::from(items.iter().rev().cloned().collect::<Vec<Value>>()))
}

fn set_args(name: &str, args: &[Value]) -> Result<Vec<Vec<Value>>> {
    args.iter()
        .map(|a| Ok(to_set(ensure_array(name, a)?.to_vec())))
        .collect()
}

fn setintersection(args: &[Value]) -> Result<Value> {
    let name = "setintersection";
    ensure_args_range(name, args, 1, None)?;
    let mut sets = set_args(name, args)?.into_iter();
    let mut result = sets.next().unwrap_or_default();
    for s in sets {
        result.retain(|v| s.contains(v));
    }
    Ok(Value::from(result))
}

fn setsubtract(args: &[Value]) -> Result<Value> {
    let name = "setsubtract";
    let sets = set_args(name, args)?;
    let result = sets[0]
        .iter()
        .filter(|v| !sets[1].contains(v))
        .cloned()
        .collect::<Vec<Value>>();
    Ok(Value::from(result))
}

fn setunion(args: &[Value]) -> Result<Value> {
    let name = "setunion";
    ensure_args_range(name, args, 1, None)?;
    Ok(Value::from(to_set(
        set_args(name, args)?.into_iter().flatten().collect(),
    )))
}

fn slice(args: &[Value]) -> Result<Value> {
    let name = "slice";
    let items = ensure_array(name, &args[0])?;
    let start = ensure_integer(name, &args[1])?;
    let end = ensure_integer(name, &args[2])?;
    if start < 0 || end < start || end as usize > items.len() {
        bail!(
            "`{name}` invalid range [{start}, {end}) for a list of length {}",
            items.len()
        );
    }
    Ok(Value::from(items[start as usize..end as usize].to_vec()))
}

// Elements are converted to strings and sorted lexicographically.
fn sort(args: &[Value]) -> Result<Value> {
    let mut items = ensure_string_collection("sort", &args[0])?;
    items.sort();
    Ok(Value::from(
        items.into_iter().map(Value::String).collect::<Vec<Value>>(),
    ))
}

fn sum(args: &[Value]) -> Result<Value> {
    let name = "sum";
    let items = ensure_array(name, &args[0])?;
    if items.is_empty() {
        bail!("`{name}` cannot sum an empty list");
    }
    let mut total = Number::from(0i64);
    for v in items.iter() {
        total = total.add(&ensure_numeric(name, v)?)?;
    }
    Ok(Value::from(total))
}

fn toset(args: &[Value]) -> Result<Value> {
    let items = ensure_array("toset", &args[0])?;
    Ok(Value::from(to_set(items.to_vec())))
}

fn transpose(args: &[Value]) -> Result<Value> {
    let name = "transpose";
    let obj = ensure_object(name, &args[0])?;
    let mut result: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (k, v) in obj.iter() {
        for s in ensure_string_collection(name, v)? {
            result
                .entry(s.to_string())
                .or_default()
                .push(Value::String(k.clone()));
        }
    }
    let mut map = Map::new();
    for (k, v) in result {
        map.insert(k.into(), Value::from(to_set(v)));
    }
    Ok(Value::from(map))
}

fn zipmap(args: &[Value]) -> Result<Value> {
    let name = "zipmap";
    let keys = ensure_string_collection(name, &args[0])?;
    let values = ensure_array(name, &args[1])?;
    if keys.len() != values.len() {
        bail!(
            "`{name}` number of keys ({}) does not match number of values ({})",
            keys.len(),
            values.len()
        );
    }
    let mut map = Map::new();
    for (k, v) in keys.into_iter().zip(values.iter()) {
        map.insert(k, v.clone());
    }
    Ok(Value::from(map))
}
