// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod collections;
pub mod conversions;
pub mod crypto;
pub mod encoding;
pub mod glob;
pub mod net;
pub mod numbers;
pub mod regex;
pub mod strings;
pub mod utils;

use crate::value::Value;

use std::collections::HashMap;

use anyhow::Result;
use lazy_static::lazy_static;

/// A builtin and its argument count. `VARIADIC` functions check their own
/// arguments.
pub type BuiltinFcn = (fn(&[Value]) -> Result<Value>, i8);

pub const VARIADIC: i8 = -1;

/// Functions evaluated by the interpreter itself because they need the
/// scope, the scan context or unevaluated arguments.
pub const DOMAIN_FUNCTIONS: [&str; 8] = [
    "resources",
    "resources_in_file",
    "try",
    "can",
    "day_of_week",
    "git_branch",
    "raw_expression",
    "calls_function",
];

#[rustfmt::skip]
lazy_static! {
    pub static ref BUILTINS: HashMap<&'static str, BuiltinFcn> = {
	let mut m : HashMap<&'static str, BuiltinFcn>  = HashMap::new();

	strings::register(&mut m);
	collections::register(&mut m);
	numbers::register(&mut m);
	conversions::register(&mut m);
	encoding::register(&mut m);
	crypto::register(&mut m);
	net::register(&mut m);
	glob::register(&mut m);
	regex::register(&mut m);

	m
    };
}

/// Whether `name` is provided by the engine, either as a builtin or as a
/// domain function.
pub fn is_reserved(name: &str) -> bool {
    BUILTINS.contains_key(name) || DOMAIN_FUNCTIONS.contains(&name)
}
