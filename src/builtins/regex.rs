// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::builtins::utils::ensure_string;
use crate::value::{Map, Value};

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};
use regex::{Captures, Regex};

pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("regex", (regex, 2));
    m.insert("regexall", (regexall, 2));
    m.insert("regex_match", (regex_match, 2));
}

pub fn compile(fcn: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| anyhow!("`{fcn}` invalid regex `{pattern}`: {e}"))
}

// A match without capture groups yields the matched text, named groups
// yield a map and unnamed groups a list.
fn match_value(re: &Regex, captures: &Captures) -> Value {
    let group = |m: Option<regex::Match>| match m {
        Some(m) => Value::from(m.as_str()),
        None => Value::Null,
    };

    if re.captures_len() == 1 {
        return group(captures.get(0));
    }

    if re.capture_names().flatten().next().is_some() {
        let mut map = Map::new();
        for name in re.capture_names().flatten() {
            map.insert(name.into(), group(captures.name(name)));
        }
        return Value::from(map);
    }

    Value::from(
        (1..re.captures_len())
            .map(|i| group(captures.get(i)))
            .collect::<Vec<Value>>(),
    )
}

fn regex(args: &[Value]) -> Result<Value> {
    let name = "regex";
    let pattern = ensure_string(name, &args[0])?;
    let s = ensure_string(name, &args[1])?;
    let re = compile(name, &pattern)?;
    match re.captures(&s) {
        Some(captures) => Ok(match_value(&re, &captures)),
        None => bail!("`{name}` pattern `{pattern}` did not match `{s}`"),
    }
}

fn regexall(args: &[Value]) -> Result<Value> {
    let name = "regexall";
    let pattern = ensure_string(name, &args[0])?;
    let s = ensure_string(name, &args[1])?;
    let re = compile(name, &pattern)?;
    Ok(Value::from(
        re.captures_iter(&s)
            .map(|c| match_value(&re, &c))
            .collect::<Vec<Value>>(),
    ))
}

fn regex_match(args: &[Value]) -> Result<Value> {
    let name = "regex_match";
    let pattern = ensure_string(name, &args[0])?;
    let s = ensure_string(name, &args[1])?;
    Ok(Value::Bool(compile(name, &pattern)?.is_match(&s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_shapes() -> Result<()> {
        let s = Value::from("arn:aws:s3:::bucket");
        assert_eq!(
            regex(&[Value::from("s3"), s.clone()])?,
            Value::from("s3")
        );
        assert_eq!(
            regex(&[Value::from("^arn:(\\w+):(\\w+)"), s.clone()])?,
            Value::from(vec![Value::from("aws"), Value::from("s3")])
        );
        let named = regex(&[Value::from("^arn:(?P<partition>\\w+)"), s.clone()])?;
        assert_eq!(named["partition"], Value::from("aws"));
        assert!(regex(&[Value::from("gcp"), s]).is_err());
        Ok(())
    }

    #[test]
    fn all_matches() -> Result<()> {
        let found = regexall(&[Value::from("[0-9]+"), Value::from("a1b22c333")])?;
        assert_eq!(
            found,
            Value::from(vec![Value::from("1"), Value::from("22"), Value::from("333")])
        );
        Ok(())
    }
}
