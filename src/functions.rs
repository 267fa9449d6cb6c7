// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::Expression;
use crate::builtins;
use crate::error::LoadError;
use crate::Rc;

use std::collections::{BTreeSet, HashMap};

/// A function declared in configuration: named parameters and a single
/// expression body.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<Rc<str>>,
    pub body: Expression,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl UserFunction {
    pub fn new(name: &str, params: &[String], expression: &str) -> Result<Self, LoadError> {
        let invalid = |reason: String| LoadError::InvalidFunction {
            name: name.to_string(),
            reason,
        };

        if !is_identifier(name) {
            return Err(invalid("name is not a valid identifier".to_string()));
        }
        if builtins::is_reserved(name) {
            return Err(invalid("shadows a built-in function".to_string()));
        }

        let mut seen = BTreeSet::new();
        for p in params {
            if !is_identifier(p) {
                return Err(invalid(format!("parameter `{p}` is not a valid identifier")));
            }
            if p == "self" {
                return Err(invalid("parameter may not be named `self`".to_string()));
            }
            if !seen.insert(p.as_str()) {
                return Err(invalid(format!("duplicate parameter `{p}`")));
            }
        }

        let body = Expression::parse(&format!("function.{name}"), expression)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            params: params.iter().map(|p| Rc::from(p.as_str())).collect(),
            body,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, UserFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, function: UserFunction) -> Result<(), LoadError> {
        if self.functions.contains_key(&function.name) {
            return Err(LoadError::InvalidFunction {
                name: function.name,
                reason: "declared more than once".to_string(),
            });
        }
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        let params = vec!["a".to_string(), "b".to_string()];
        assert!(UserFunction::new("add", &params, "a + b").is_ok());
        assert!(UserFunction::new("lower", &params, "a").is_err());
        assert!(UserFunction::new("try", &params, "a").is_err());
        assert!(UserFunction::new("f", &["a".to_string(), "a".to_string()], "a").is_err());
        assert!(UserFunction::new("f", &params, "a +").is_err());
        assert!(UserFunction::new("1f", &params, "a").is_err());
    }

    #[test]
    fn duplicates_are_rejected() -> Result<(), LoadError> {
        let mut table = FunctionTable::new();
        table.add(UserFunction::new("f", &[], "1")?)?;
        assert!(table.add(UserFunction::new("f", &[], "2")?).is_err());
        assert_eq!(table.len(), 1);
        Ok(())
    }
}
