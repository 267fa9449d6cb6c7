// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::builtins::utils::ensure_string;
use crate::value::Value;

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use globset::{Glob, GlobBuilder, GlobMatcher};

pub fn register(m: &mut HashMap<&'static str, builtins::BuiltinFcn>) {
    m.insert("glob_match", (glob_match, 2));
}

/// Compile a path glob. `*` and `?` stay within one path segment while `**`
/// crosses separators.
pub fn compile(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(glob(pattern)?.compile_matcher())
}

pub fn glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
}

/// Forward slashes and no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut p = path.as_str();
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p.to_string()
}

fn glob_match(args: &[Value]) -> Result<Value> {
    let name = "glob_match";
    let pattern = ensure_string(name, &args[0])?;
    let s = ensure_string(name, &args[1])?;
    let matcher = compile(&pattern).map_err(|e| anyhow!("`{name}` invalid glob: {e}"))?;
    Ok(Value::Bool(matcher.is_match(normalize_path(&s))))
}
