// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::Expression;
use crate::value::{Map, Value};
use crate::Rc;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Source text of one attribute as written, before evaluation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub struct RawExpr {
    text: String,
    parsed: Option<Expression>,
}

impl RawExpr {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        // Attribute text may use syntax outside the rule language; such text
        // is kept for textual checks only.
        let parsed = Expression::parse("<attribute>", &text).ok();
        Self { text, parsed }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parsed(&self) -> Option<&Expression> {
        self.parsed.as_ref()
    }

    /// Whether the attribute's source contains a call to `fcn`.
    pub fn calls_function(&self, fcn: &str) -> bool {
        match &self.parsed {
            Some(expr) => expr.calls_function(fcn),
            None => contains_call_text(&self.text, fcn),
        }
    }
}

// `fcn(` not preceded by an identifier character.
fn contains_call_text(text: &str, fcn: &str) -> bool {
    let needle = format!("{fcn}(");
    text.match_indices(&needle).any(|(i, _)| {
        !text[..i]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}

impl From<String> for RawExpr {
    fn from(text: String) -> Self {
        RawExpr::new(text)
    }
}

impl From<RawExpr> for String {
    fn from(raw: RawExpr) -> Self {
        raw.text
    }
}

/// One declared infrastructure object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Rc<Map>,
    #[serde(default)]
    pub raw_expressions: BTreeMap<String, RawExpr>,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl Resource {
    pub fn new(resource_type: &str, name: &str, attributes: Map) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            attributes: Rc::new(attributes),
            raw_expressions: BTreeMap::new(),
            file: String::new(),
            line: 0,
            column: 0,
        }
    }

    pub fn at(mut self, file: &str, line: u32, column: u32) -> Self {
        self.file = file.to_string();
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_raw_expression(mut self, attribute: &str, text: &str) -> Self {
        self.raw_expressions
            .insert(attribute.to_string(), RawExpr::new(text));
        self
    }

    /// `type.name`
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// The attribute map as bound to `self` in expressions.
    pub fn attributes_value(&self) -> Value {
        Value::Object(self.attributes.clone())
    }

    pub fn raw_expression(&self, attribute: &str) -> Option<&RawExpr> {
        self.raw_expressions.get(attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntactic_call_detection() {
        let raw = RawExpr::new("jsonencode({ Statement = [] })");
        assert!(raw.parsed().is_some());
        assert!(raw.calls_function("jsonencode"));
        assert!(!raw.calls_function("encode"));

        // Not valid expression syntax, falls back to text search.
        let raw = RawExpr::new("file(\"policy.json\") %{ if x }");
        assert!(raw.parsed().is_none());
        assert!(raw.calls_function("file"));
        assert!(!raw.calls_function("ile"));
    }

    #[test]
    fn deserialize_resource() -> anyhow::Result<()> {
        let r: Resource = serde_json::from_str(
            r#"{
                "type": "aws_s3_bucket",
                "name": "logs",
                "attributes": { "acl": "private" },
                "raw_expressions": { "acl": "var.acl" },
                "file": "main.tf",
                "line": 3,
                "column": 1
            }"#,
        )?;
        assert_eq!(r.address(), "aws_s3_bucket.logs");
        assert_eq!(r.attributes_value()["acl"], Value::from("private"));
        assert_eq!(r.raw_expression("acl").map(|r| r.text()), Some("var.acl"));
        Ok(())
    }
}
