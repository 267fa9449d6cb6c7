// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::builtins::utils::{ensure_args_range, ensure_integer, ensure_numeric, ensure_string};
use crate::builtins::VARIADIC;
use crate::number::{BigInt, Number};
use crate::value::Value;

use std::collections::HashMap;

use anyhow::{bail, Result};
use num_traits::Num;

pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("abs", (abs, 1));
    m.insert("ceil", (ceil, 1));
    m.insert("floor", (floor, 1));
    m.insert("log", (log, 2));
    m.insert("max", (max, VARIADIC));
    m.insert("min", (min, VARIADIC));
    m.insert("parseint", (parseint, 2));
    m.insert("pow", (pow, 2));
    m.insert("signum", (signum, 1));
}

fn abs(args: &[Value]) -> Result<Value> {
    Ok(Value::from(ensure_numeric("abs", &args[0])?.abs()))
}

fn ceil(args: &[Value]) -> Result<Value> {
    Ok(Value::from(ensure_numeric("ceil", &args[0])?.ceil()))
}

fn floor(args: &[Value]) -> Result<Value> {
    Ok(Value::from(ensure_numeric("floor", &args[0])?.floor()))
}

fn log(args: &[Value]) -> Result<Value> {
    let name = "log";
    let n = ensure_numeric(name, &args[0])?.as_f64();
    let base = ensure_numeric(name, &args[1])?.as_f64();
    let v = n.log(base);
    if !v.is_finite() {
        bail!("`{name}` result is not a finite number");
    }
    Ok(Value::from(v))
}

fn extremum(name: &str, args: &[Value], pick_max: bool) -> Result<Value> {
    ensure_args_range(name, args, 1, None)?;
    let mut best = ensure_numeric(name, &args[0])?;
    for a in &args[1..] {
        let n = ensure_numeric(name, a)?;
        if (pick_max && n > best) || (!pick_max && n < best) {
            best = n;
        }
    }
    Ok(Value::from(best))
}

fn max(args: &[Value]) -> Result<Value> {
    extremum("max", args, true)
}

fn min(args: &[Value]) -> Result<Value> {
    extremum("min", args, false)
}

fn parseint(args: &[Value]) -> Result<Value> {
    let name = "parseint";
    let s = ensure_string(name, &args[0])?;
    let base = ensure_integer(name, &args[1])?;
    if !(2..=36).contains(&base) {
        bail!("`{name}` base must be between 2 and 36. Got {base}");
    }
    match BigInt::from_str_radix(&s, base as u32) {
        Ok(n) => Ok(Value::from(Number::from(n))),
        Err(_) => bail!("`{name}` cannot parse `{s}` as a base {base} integer"),
    }
}

fn pow(args: &[Value]) -> Result<Value> {
    let name = "pow";
    let base = ensure_numeric(name, &args[0])?;
    let exponent = ensure_numeric(name, &args[1])?;
    Ok(Value::from(base.pow(&exponent)?))
}

fn signum(args: &[Value]) -> Result<Value> {
    let n = ensure_numeric("signum", &args[0])?;
    let s: i64 = if n.is_zero() {
        0
    } else if n.is_negative() {
        -1
    } else {
        1
    };
    Ok(Value::from(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parseint_bases() -> Result<()> {
        assert_eq!(
            parseint(&[Value::from("ff"), Value::from(16i64)])?,
            Value::from(255i64)
        );
        assert_eq!(
            parseint(&[Value::from("-101"), Value::from(2i64)])?,
            Value::from(-5i64)
        );
        assert!(parseint(&[Value::from("12"), Value::from(1i64)]).is_err());
        assert!(parseint(&[Value::from("zz"), Value::from(10i64)]).is_err());
        Ok(())
    }

    #[test]
    fn extremes_accept_numeric_strings() -> Result<()> {
        let args = [Value::from(3i64), Value::from("12"), Value::from(-1.5)];
        assert_eq!(max(&args)?, Value::from(12i64));
        assert_eq!(min(&args)?, Value::from(-1.5));
        Ok(())
    }
}
