// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod ast;
mod builtins;
mod config;
mod context;
mod engine;
mod environment;
mod error;
mod exceptions;
mod functions;
mod interpreter;
mod lexer;
mod number;
mod parser;
mod report;
mod resource;
mod rules;
mod value;

#[cfg(feature = "arc")]
pub(crate) use std::sync::Arc as Rc;

#[cfg(not(feature = "arc"))]
pub(crate) use std::rc::Rc;

pub use ast::Expression;
pub use config::{
    Config, ExceptionConfig, ExcludePaths, ExpressionBlock, FunctionConfig, RuleConfig, Settings,
};
pub use context::{ResourceIndex, ScanContext, TypePattern};
pub use engine::Engine;
pub use environment::{ScanEnvironment, BRANCH_VARIABLES};
pub use error::{EvalError, LoadError, ParseError};
pub use exceptions::{filter, parse_expiry, Exception, ExceptionEngine, FilteredViolation};
pub use functions::{FunctionTable, UserFunction};
pub use interpreter::{evaluate, Scope, MAX_CALL_DEPTH, MAX_FUNCTION_CALLS, MAX_ITERATIONS};
pub use number::Number;
pub use report::{ScanReport, Summary};
pub use resource::{RawExpr, Resource};
pub use rules::{EvaluationError, Outcome, Rule, RuleEngine, Severity, Stage, Violation};
pub use value::{Map, Value};

/// Whether `name` is a built-in or domain function.
pub fn is_builtin(name: &str) -> bool {
    builtins::is_reserved(name)
}

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::ast::*;
    pub use crate::lexer::*;
    pub use crate::parser::*;
}
