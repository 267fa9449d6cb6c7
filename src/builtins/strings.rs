// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::builtins::utils::{
    ensure_args_range, ensure_bool, ensure_integer, ensure_numeric, ensure_present,
    ensure_string, ensure_string_collection,
};
use crate::builtins::VARIADIC;
use crate::value::Value;

use std::collections::HashMap;

use anyhow::{bail, Result};

/// Largest padding `indent` and format verbs will generate.
const MAX_PADDING: usize = 1024;

pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("chomp", (chomp, 1));
    m.insert("endswith", (endswith, 2));
    m.insert("format", (format, VARIADIC));
    m.insert("formatlist", (formatlist, VARIADIC));
    m.insert("indent", (indent, 2));
    m.insert("join", (join, VARIADIC));
    m.insert("lower", (lower, 1));
    m.insert("replace", (replace, 3));
    m.insert("split", (split, 2));
    m.insert("startswith", (startswith, 2));
    m.insert("strcontains", (strcontains, 2));
    m.insert("strlen", (strlen, 1));
    m.insert("strrev", (strrev, 1));
    m.insert("substr", (substr, 3));
    m.insert("title", (title, 1));
    m.insert("trim", (trim, 2));
    m.insert("trimprefix", (trimprefix, 2));
    m.insert("trimspace", (trimspace, 1));
    m.insert("trimsuffix", (trimsuffix, 2));
    m.insert("upper", (upper, 1));
}

fn chomp(args: &[Value]) -> Result<Value> {
    let s = ensure_string("chomp", &args[0])?;
    Ok(Value::from(s.trim_end_matches(['\n', '\r'])))
}

fn endswith(args: &[Value]) -> Result<Value> {
    let name = "endswith";
    let s = ensure_string(name, &args[0])?;
    let suffix = ensure_string(name, &args[1])?;
    Ok(Value::Bool(s.ends_with(suffix.as_ref())))
}

fn startswith(args: &[Value]) -> Result<Value> {
    let name = "startswith";
    let s = ensure_string(name, &args[0])?;
    let prefix = ensure_string(name, &args[1])?;
    Ok(Value::Bool(s.starts_with(prefix.as_ref())))
}

fn strcontains(args: &[Value]) -> Result<Value> {
    let name = "strcontains";
    let s = ensure_string(name, &args[0])?;
    let substr = ensure_string(name, &args[1])?;
    Ok(Value::Bool(s.contains(substr.as_ref())))
}

fn indent(args: &[Value]) -> Result<Value> {
    let name = "indent";
    let n = ensure_integer(name, &args[0])?;
    let s = ensure_string(name, &args[1])?;
    if n < 0 {
        bail!("`{name}` expects a non-negative number of spaces");
    }
    if n as u64 > MAX_PADDING as u64 {
        bail!("`{name}` cannot indent by more than {MAX_PADDING} spaces");
    }
    let pad = format!("\n{}", " ".repeat(n as usize));
    Ok(Value::from(s.replace('\n', &pad)))
}

fn join(args: &[Value]) -> Result<Value> {
    let name = "join";
    ensure_args_range(name, args, 2, None)?;
    let sep = ensure_string(name, &args[0])?;
    let mut parts = vec![];
    for a in &args[1..] {
        parts.extend(ensure_string_collection(name, a)?);
    }
    let parts: Vec<&str> = parts.iter().map(|s| s.as_ref()).collect();
    Ok(Value::from(parts.join(sep.as_ref())))
}

fn lower(args: &[Value]) -> Result<Value> {
    let s = ensure_string("lower", &args[0])?;
    Ok(Value::from(s.to_lowercase()))
}

fn upper(args: &[Value]) -> Result<Value> {
    let s = ensure_string("upper", &args[0])?;
    Ok(Value::from(s.to_uppercase()))
}

fn title(args: &[Value]) -> Result<Value> {
    let s = ensure_string("title", &args[0])?;
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    Ok(Value::from(out))
}

fn replace(args: &[Value]) -> Result<Value> {
    let name = "replace";
    let s = ensure_string(name, &args[0])?;
    let substr = ensure_string(name, &args[1])?;
    let replacement = ensure_string(name, &args[2])?;

    // `/.../` denotes a regular expression.
    if substr.len() > 1 && substr.starts_with('/') && substr.ends_with('/') {
        let re = builtins::regex::compile(name, &substr[1..substr.len() - 1])?;
        return Ok(Value::from(
            re.replace_all(&s, replacement.as_ref()).into_owned(),
        ));
    }
    Ok(Value::from(s.replace(substr.as_ref(), &replacement)))
}

fn split(args: &[Value]) -> Result<Value> {
    let name = "split";
    let sep = ensure_string(name, &args[0])?;
    let s = ensure_string(name, &args[1])?;
    Ok(Value::from(
        s.split(sep.as_ref())
            .map(Value::from)
            .collect::<Vec<Value>>(),
    ))
}

fn strlen(args: &[Value]) -> Result<Value> {
    let s = ensure_string("strlen", &args[0])?;
    Ok(Value::from(s.chars().count()))
}

fn strrev(args: &[Value]) -> Result<Value> {
    let s = ensure_string("strrev", &args[0])?;
    Ok(Value::from(s.chars().rev().collect::<String>()))
}

fn substr(args: &[Value]) -> Result<Value> {
    let name = "substr";
    let s = ensure_string(name, &args[0])?;
    let offset = ensure_integer(name, &args[1])?;
    let length = ensure_integer(name, &args[2])?;

    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let start = if offset < 0 { len + offset } else { offset };
    if start < 0 || start > len {
        bail!("`{name}` offset {offset} is out of range for a string of length {len}");
    }
    let end = match length {
        -1 => len,
        l if l < -1 => bail!("`{name}` length must be non-negative, or -1"),
        l => start.saturating_add(l).min(len),
    };
    Ok(Value::from(
        chars[start as usize..end as usize].iter().collect::<String>(),
    ))
}

fn trim(args: &[Value]) -> Result<Value> {
    let name = "trim";
    let s = ensure_string(name, &args[0])?;
    let cutset = ensure_string(name, &args[1])?;
    Ok(Value::from(s.trim_matches(|c| cutset.contains(c))))
}

fn trimprefix(args: &[Value]) -> Result<Value> {
    let name = "trimprefix";
    let s = ensure_string(name, &args[0])?;
    let prefix = ensure_string(name, &args[1])?;
    Ok(Value::from(s.strip_prefix(prefix.as_ref()).unwrap_or(s.as_ref())))
}

fn trimsuffix(args: &[Value]) -> Result<Value> {
    let name = "trimsuffix";
    let s = ensure_string(name, &args[0])?;
    let suffix = ensure_string(name, &args[1])?;
    Ok(Value::from(s.strip_suffix(suffix.as_ref()).unwrap_or(s.as_ref())))
}

fn trimspace(args: &[Value]) -> Result<Value> {
    let s = ensure_string("trimspace", &args[0])?;
    Ok(Value::from(s.trim()))
}

fn format(args: &[Value]) -> Result<Value> {
    let name = "format";
    ensure_args_range(name, args, 1, None)?;
    let spec = ensure_string(name, &args[0])?;
    Ok(Value::from(render(name, &spec, &args[1..])?))
}

fn formatlist(args: &[Value]) -> Result<Value> {
    let name = "formatlist";
    ensure_args_range(name, args, 1, None)?;
    let spec = ensure_string(name, &args[0])?;

    let mut len = None;
    for a in &args[1..] {
        if let Value::Array(items) = a {
            match len {
                Some(l) if l != items.len() => {
                    bail!("`{name}` expects all list arguments to have the same length")
                }
                _ => len = Some(items.len()),
            }
        }
    }

    let mut results = vec![];
    for i in 0..len.unwrap_or(1) {
        let row: Vec<Value> = args[1..]
            .iter()
            .map(|a| match a {
                Value::Array(items) => items[i].clone(),
                _ => a.clone(),
            })
            .collect();
        results.push(Value::from(render(name, &spec, &row)?));
    }
    Ok(Value::from(results))
}

struct Verb {
    left_align: bool,
    zero_pad: bool,
    plus: bool,
    width: usize,
    precision: Option<usize>,
}

impl Verb {
    fn pad(&self, s: String, numeric: bool) -> String {
        let len = s.chars().count();
        if len >= self.width {
            return s;
        }
        let fill = self.width - len;
        if self.left_align {
            format!("{s}{}", " ".repeat(fill))
        } else if self.zero_pad && numeric {
            match s.strip_prefix('-') {
                Some(digits) => format!("-{}{digits}", "0".repeat(fill)),
                None => format!("{}{s}", "0".repeat(fill)),
            }
        } else {
            format!("{}{s}", " ".repeat(fill))
        }
    }

    fn sign(&self, s: String) -> String {
        if self.plus && !s.starts_with('-') {
            format!("+{s}")
        } else {
            s
        }
    }
}

fn read_count(fcn: &str, chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<usize> {
    let mut n: usize = 0;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(d as usize))
            .filter(|n| *n <= MAX_PADDING)
            .ok_or_else(|| {
                anyhow::anyhow!("`{fcn}` width and precision cannot exceed {MAX_PADDING}")
            })?;
        chars.next();
    }
    Ok(n)
}

/// Render a printf-style format string. Supports `%v %s %d %f %t %q %x %X %%`
/// with flags, width and precision.
pub fn render(fcn: &str, spec: &str, args: &[Value]) -> Result<String> {
    let mut out = String::new();
    let mut chars = spec.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut verb = Verb {
            left_align: false,
            zero_pad: false,
            plus: false,
            width: 0,
            precision: None,
        };
        while let Some(&f) = chars.peek() {
            match f {
                '-' => verb.left_align = true,
                '0' => verb.zero_pad = true,
                '+' => verb.plus = true,
                ' ' | '#' => (),
                _ => break,
            }
            chars.next();
        }
        verb.width = read_count(fcn, &mut chars)?;
        if chars.peek() == Some(&'.') {
            chars.next();
            verb.precision = Some(read_count(fcn, &mut chars)?);
        }

        let Some(kind) = chars.next() else {
            bail!("`{fcn}` format string ends with an incomplete verb");
        };
        let Some(arg) = args.get(next_arg) else {
            bail!("`{fcn}` has too few arguments for format string");
        };
        next_arg += 1;
        let arg = ensure_present(fcn, arg)?;

        let s = match kind {
            'v' => {
                let s = match arg {
                    Value::String(s) => s.to_string(),
                    Value::Number(n) => verb.sign(n.format_decimal()),
                    _ => arg.to_string(),
                };
                verb.pad(s, matches!(arg, Value::Number(_)))
            }
            's' => {
                let s = ensure_string(fcn, arg)?;
                let s = match verb.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.to_string(),
                };
                verb.pad(s, false)
            }
            'd' => {
                let n = ensure_numeric(fcn, arg)?;
                if !n.is_integer() {
                    bail!("`{fcn}` %d requires an integer. Got `{arg}` instead");
                }
                verb.pad(verb.sign(n.format_decimal()), true)
            }
            'f' => {
                let f = ensure_numeric(fcn, arg)?.as_f64();
                let s = format!("{:.*}", verb.precision.unwrap_or(6), f);
                verb.pad(verb.sign(s), true)
            }
            'x' | 'X' => {
                let i = ensure_integer(fcn, arg)?;
                let s = match kind {
                    'x' => format!("{i:x}"),
                    _ => format!("{i:X}"),
                };
                verb.pad(s, true)
            }
            't' => verb.pad(ensure_bool(fcn, arg)?.to_string(), false),
            'q' => {
                let s = ensure_string(fcn, arg)?;
                verb.pad(serde_json::to_string(s.as_ref())?, false)
            }
            _ => bail!("`{fcn}` does not support verb `%{kind}`"),
        };
        out.push_str(&s);
    }

    if next_arg < args.len() {
        bail!("`{fcn}` has too many arguments for format string");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_verbs() -> Result<()> {
        let args = [
            Value::from("web"),
            Value::from(7i64),
            Value::from(3.14159),
            Value::Bool(true),
        ];
        assert_eq!(
            render("format", "%s-%03d %.2f %t 100%%", &args)?,
            "web-007 3.14 true 100%"
        );
        assert_eq!(render("format", "%q", &[Value::from("a\"b")])?, "\"a\\\"b\"");
        assert_eq!(render("format", "%-5s|", &[Value::from("ab")])?, "ab   |");
        Ok(())
    }

    #[test]
    fn render_argument_mismatch() {
        assert!(render("format", "%s %s", &[Value::from("a")]).is_err());
        assert!(render("format", "%s", &[Value::from("a"), Value::from("b")]).is_err());
        assert!(render("format", "%d", &[Value::from(1.5)]).is_err());
    }

    #[test]
    fn substr_bounds() -> Result<()> {
        let s = Value::from("hello world");
        assert_eq!(
            substr(&[s.clone(), Value::from(0i64), Value::from(5i64)])?,
            Value::from("hello")
        );
        assert_eq!(
            substr(&[s.clone(), Value::from(-5i64), Value::from(-1i64)])?,
            Value::from("world")
        );
        assert_eq!(
            substr(&[s.clone(), Value::from(6i64), Value::from(100i64)])?,
            Value::from("world")
        );
        assert!(substr(&[s.clone(), Value::from(20i64), Value::from(1i64)]).is_err());
        assert_eq!(
            substr(&[s, Value::from(6i64), Value::from(i64::MAX)])?,
            Value::from("world")
        );
        Ok(())
    }

    #[test]
    fn render_width_is_bounded() -> Result<()> {
        let one = [Value::from(1i64)];
        assert_eq!(render("format", "%1024d", &one)?.len(), 1024);
        assert!(render("format", "%1025d", &one).is_err());
        assert!(render("format", "%99999999999999999999999d", &one).is_err());
        assert!(render("format", "%.99999999999f", &[Value::from(1.5)]).is_err());
        Ok(())
    }

    #[test]
    fn indent_is_bounded() -> Result<()> {
        assert_eq!(
            indent(&[Value::from(2i64), Value::from("a\nb")])?,
            Value::from("a\n  b")
        );
        assert!(indent(&[Value::from(i64::MAX), Value::from("a\nb")]).is_err());
        assert!(indent(&[Value::from(-1i64), Value::from("a")]).is_err());
        Ok(())
    }
}
