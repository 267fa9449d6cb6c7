// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::lexer::Span;

/// A malformed expression. Raised while rules and functions are loaded, never
/// while resources are scanned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure evaluating an expression against one resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("{0}")]
    Message(String),

    #[error("call to unknown function `{0}`")]
    UnknownFunction(String),

    #[error("`{function}` expects {expected}, got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    /// An explicit or automatic type conversion failed.
    #[error("cannot convert {from} to {to}: {detail}")]
    TypeCoercion {
        from: String,
        to: &'static str,
        detail: String,
    },

    /// An operator was applied to a missing attribute or index.
    #[error("{0}")]
    Absent(String),

    #[error("evaluation limit exceeded: {0}")]
    Limit(String),
}

impl EvalError {
    pub(crate) fn at(span: &Span, msg: &str) -> Self {
        EvalError::Message(span.message("error", msg))
    }

    pub(crate) fn absent_at(span: &Span, msg: &str) -> Self {
        EvalError::Absent(span.message("error", msg))
    }

    pub fn is_type_coercion(&self) -> bool {
        matches!(self, EvalError::TypeCoercion { .. })
    }

    /// Recover the typed error from a builtin failure, or wrap its message.
    pub(crate) fn from_builtin(span: &Span, fcn: &str, err: anyhow::Error) -> Self {
        match err.downcast::<EvalError>() {
            Ok(e) => e,
            Err(e) => EvalError::at(span, format!("`{fcn}` failed: {e}").as_str()),
        }
    }
}

/// Configuration problems detected before any resource is scanned.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("rule `{rule_id}`: {source}")]
    Parse {
        rule_id: String,
        #[source]
        source: ParseError,
    },

    #[error("duplicate rule id `{0}`")]
    DuplicateRule(String),

    #[error("rule `{rule_id}`: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    /// An exception is missing audit fields or carries invalid patterns.
    #[error("exception #{index}: {reason}")]
    ExceptionValidation { index: usize, reason: String },

    #[error("function `{name}`: {reason}")]
    InvalidFunction { name: String, reason: String },

    #[error("settings: {0}")]
    InvalidSettings(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "yaml")]
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
