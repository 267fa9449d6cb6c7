// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::Expression;
use crate::config::RuleConfig;
use crate::context::{ScanContext, TypePattern};
use crate::environment::ScanEnvironment;
use crate::error::{EvalError, LoadError};
use crate::functions::FunctionTable;
use crate::interpreter::{evaluate, Scope};
use crate::resource::Resource;
use crate::value::Value;

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

/// Ordered `info < warning < error`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(format!(
                "invalid severity `{s}`: expected `error`, `warning` or `info`"
            )),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// A rule with its guard and conditions parsed.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub pattern: TypePattern,
    pub when: Option<Expression>,
    pub conditions: Vec<Expression>,
    pub message: String,
    pub remediation: Option<String>,
    pub references: Vec<String>,
}

impl Rule {
    pub fn compile(config: &RuleConfig) -> Result<Rule, LoadError> {
        let id = config.id.trim();
        if id.is_empty() {
            return Err(LoadError::InvalidRule {
                rule_id: config.id.clone(),
                reason: "rule id is empty".to_string(),
            });
        }
        let invalid = |reason: String| LoadError::InvalidRule {
            rule_id: id.to_string(),
            reason,
        };
        let parse = |field: String, text: &str| {
            Expression::parse(&format!("rule.{id}.{field}"), text).map_err(|source| {
                LoadError::Parse {
                    rule_id: id.to_string(),
                    source,
                }
            })
        };

        let pattern = config.resource_type.parse::<TypePattern>().map_err(invalid)?;
        if config.condition.is_empty() {
            return Err(invalid("rule has no conditions".to_string()));
        }

        let when = match &config.when {
            Some(w) => Some(parse("when".to_string(), w.text())?),
            None => None,
        };
        let conditions = config
            .condition
            .iter()
            .enumerate()
            .map(|(idx, c)| parse(format!("condition[{idx}]"), c.text()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Rule {
            id: id.to_string(),
            name: match config.name.as_str() {
                "" => id.to_string(),
                name => name.to_string(),
            },
            severity: config.severity,
            pattern,
            when,
            conditions,
            message: config.message.clone(),
            remediation: config.remediation.clone(),
            references: config.references.clone(),
        })
    }
}

/// A rule whose conditions all held for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub resource_type: String,
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Violation {
    fn new(rule: &Rule, resource: &Resource) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            message: rule.message.clone(),
            file: resource.file.clone(),
            line: resource.line,
            column: resource.column,
            resource_type: resource.resource_type.clone(),
            resource_name: resource.name.clone(),
            remediation: rule.remediation.clone(),
        }
    }

    fn sort_key(&self) -> (&str, u32, &str, u32, &str, &str) {
        (
            &self.file,
            self.line,
            &self.rule_id,
            self.column,
            &self.resource_type,
            &self.resource_name,
        )
    }
}

/// Which part of a rule failed to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    When,
    Condition,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::When => "when",
            Stage::Condition => "condition",
        })
    }
}

/// A rule that could not be evaluated against a resource. Reported apart
/// from violations so that a broken rule never reads as a clean result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationError {
    pub rule_id: String,
    pub stage: Stage,
    /// Index of the failing condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<usize>,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub resource_type: String,
    pub resource_name: String,
    pub message: String,
}

impl EvaluationError {
    fn sort_key(&self) -> (&str, u32, &str, u32, &str, &str) {
        (
            &self.file,
            self.line,
            &self.rule_id,
            self.column,
            &self.resource_type,
            &self.resource_name,
        )
    }
}

/// Terminal state of one (rule, resource) evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    TypeMismatch,
    GuardFailed,
    Clean,
    Violated(Violation),
    Error(EvaluationError),
}

/// Evaluates compiled rules against every resource of a scan.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    functions: FunctionTable,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>, functions: FunctionTable) -> Result<Self, LoadError> {
        let mut ids = BTreeSet::new();
        for r in &rules {
            if !ids.insert(r.id.as_str()) {
                return Err(LoadError::DuplicateRule(r.id.clone()));
            }
        }
        Ok(Self { rules, functions })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Run one rule against one resource.
    pub fn evaluate_rule(
        &self,
        rule: &Rule,
        resource: &Resource,
        context: &ScanContext,
        environment: &ScanEnvironment,
    ) -> Outcome {
        if !rule.pattern.matches(&resource.resource_type) {
            return Outcome::TypeMismatch;
        }

        let scope = Scope::new()
            .with_resource(resource)
            .with_index(context)
            .with_environment(environment)
            .with_functions(&self.functions);

        let error = |stage: Stage, condition: Option<usize>, e: EvalError| {
            Outcome::Error(EvaluationError {
                rule_id: rule.id.clone(),
                stage,
                condition,
                file: resource.file.clone(),
                line: resource.line,
                column: resource.column,
                resource_type: resource.resource_type.clone(),
                resource_name: resource.name.clone(),
                message: e.to_string(),
            })
        };

        if let Some(when) = &rule.when {
            match evaluate_isolated(when, &scope) {
                Ok(Value::Bool(true)) => (),
                Ok(_) => return Outcome::GuardFailed,
                Err(e) => return error(Stage::When, None, e),
            }
        }

        // Conditions are a conjunction; the first one that does not hold
        // ends evaluation.
        for (idx, condition) in rule.conditions.iter().enumerate() {
            match evaluate_isolated(condition, &scope) {
                Ok(Value::Bool(true)) => (),
                Ok(_) => return Outcome::Clean,
                Err(e) => return error(Stage::Condition, Some(idx), e),
            }
        }

        Outcome::Violated(Violation::new(rule, resource))
    }

    fn evaluate_resource(
        &self,
        rule: &Rule,
        resource: &Resource,
        context: &ScanContext,
        environment: &ScanEnvironment,
    ) -> Outcome {
        let outcome = self.evaluate_rule(rule, resource, context, environment);
        match &outcome {
            Outcome::TypeMismatch => (),
            Outcome::Error(e) => log::warn!(
                "rule {} failed on {} ({}:{}): {}",
                rule.id,
                resource.address(),
                resource.file,
                resource.line,
                e.message
            ),
            _ => log::debug!(
                "rule {} on {}: {:?}",
                rule.id,
                resource.address(),
                OutcomeKind::from(&outcome)
            ),
        }
        outcome
    }

    #[cfg(feature = "parallel")]
    fn outcomes(&self, context: &ScanContext, environment: &ScanEnvironment) -> Vec<Outcome> {
        use rayon::prelude::*;
        self.rules
            .par_iter()
            .flat_map_iter(|rule| {
                context
                    .resources()
                    .iter()
                    .map(move |r| self.evaluate_resource(rule, r, context, environment))
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn outcomes(&self, context: &ScanContext, environment: &ScanEnvironment) -> Vec<Outcome> {
        self.rules
            .iter()
            .flat_map(|rule| {
                context
                    .resources()
                    .iter()
                    .map(move |r| self.evaluate_resource(rule, r, context, environment))
            })
            .collect()
    }

    /// Evaluate every rule against every resource. Both lists are sorted by
    /// file, line and rule id, with column, resource type and resource name
    /// breaking the remaining ties.
    pub fn evaluate(
        &self,
        context: &ScanContext,
        environment: &ScanEnvironment,
    ) -> (Vec<Violation>, Vec<EvaluationError>) {
        let mut violations = vec![];
        let mut errors = vec![];
        for outcome in self.outcomes(context, environment) {
            match outcome {
                Outcome::Violated(v) => violations.push(v),
                Outcome::Error(e) => errors.push(e),
                _ => (),
            }
        }
        violations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        errors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        (violations, errors)
    }
}

/// Evaluate `expr`, turning a panic into an evaluation error so that one
/// faulty (rule, resource) pair cannot abort the scan.
fn evaluate_isolated(expr: &Expression, scope: &Scope) -> Result<Value, EvalError> {
    match panic::catch_unwind(AssertUnwindSafe(|| evaluate(expr, scope))) {
        Ok(result) => result,
        Err(payload) => {
            let detail = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(EvalError::Message(format!("evaluation panicked: {detail}")))
        }
    }
}

#[derive(Debug)]
enum OutcomeKind {
    TypeMismatch,
    GuardFailed,
    Clean,
    Violated,
    Error,
}

impl From<&Outcome> for OutcomeKind {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::TypeMismatch => OutcomeKind::TypeMismatch,
            Outcome::GuardFailed => OutcomeKind::GuardFailed,
            Outcome::Clean => OutcomeKind::Clean,
            Outcome::Violated(_) => OutcomeKind::Violated,
            Outcome::Error(_) => OutcomeKind::Error,
        }
    }
}
