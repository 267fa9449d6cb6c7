// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::glob::{compile, normalize_path};
use crate::config::ExceptionConfig;
use crate::error::LoadError;
use crate::rules::Violation;

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate};
use globset::GlobMatcher;
use serde::Serialize;

/// An audited suppression of violations.
///
/// Without path or resource-name patterns an exception applies to every
/// resource for its rule ids. An exception whose `expires_at` is `D` applies
/// up to and including `D`.
#[derive(Debug, Clone, Serialize)]
pub struct Exception {
    pub rule_ids: BTreeSet<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_name_patterns: Vec<String>,
    pub reason: String,
    pub approved_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDate>,

    #[serde(skip)]
    paths: Vec<GlobMatcher>,
    #[serde(skip)]
    resource_names: Vec<GlobMatcher>,
}

impl PartialEq for Exception {
    fn eq(&self, other: &Self) -> bool {
        self.rule_ids == other.rule_ids
            && self.path_patterns == other.path_patterns
            && self.resource_name_patterns == other.resource_name_patterns
            && self.reason == other.reason
            && self.approved_by == other.approved_by
            && self.ticket == other.ticket
            && self.expires_at == other.expires_at
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp, whose date (in its own
/// offset) is used.
pub fn parse_expiry(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
        .map_err(|_| format!("invalid expires_at `{s}`: expected YYYY-MM-DD or RFC 3339"))
}

fn compile_all(
    index: usize,
    field: &str,
    patterns: &[String],
) -> Result<Vec<GlobMatcher>, LoadError> {
    patterns
        .iter()
        .map(|p| {
            compile(&normalize_path(p)).map_err(|e| LoadError::ExceptionValidation {
                index,
                reason: format!("invalid {field} pattern `{p}`: {e}"),
            })
        })
        .collect()
}

impl Exception {
    /// Validate the `index`th exception of a configuration.
    pub fn new(index: usize, config: &ExceptionConfig) -> Result<Exception, LoadError> {
        let invalid = |reason: &str| LoadError::ExceptionValidation {
            index,
            reason: reason.to_string(),
        };

        if config.reason.trim().is_empty() {
            return Err(invalid("`reason` is required"));
        }
        if config.approved_by.trim().is_empty() {
            return Err(invalid("`approved_by` is required"));
        }
        let rule_ids: BTreeSet<String> = config
            .rules
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect();
        if rule_ids.is_empty() {
            return Err(invalid("at least one rule id is required"));
        }

        let expires_at = match &config.expires_at {
            Some(s) => Some(parse_expiry(s).map_err(|e| invalid(e.as_str()))?),
            None => None,
        };

        Ok(Exception {
            rule_ids,
            paths: compile_all(index, "path", &config.paths)?,
            resource_names: compile_all(index, "resource name", &config.resource_names)?,
            path_patterns: config.paths.clone(),
            resource_name_patterns: config.resource_names.clone(),
            reason: config.reason.clone(),
            approved_by: config.approved_by.clone(),
            ticket: config.ticket.clone(),
            expires_at,
        })
    }

    pub fn is_expired(&self, now: NaiveDate) -> bool {
        self.expires_at.is_some_and(|d| now > d)
    }

    pub fn applies_to(&self, violation: &Violation, now: NaiveDate) -> bool {
        if !self.rule_ids.contains(&violation.rule_id) || self.is_expired(now) {
            return false;
        }
        let file = normalize_path(&violation.file);
        (self.paths.is_empty() || self.paths.iter().any(|m| m.is_match(&file)))
            && (self.resource_names.is_empty()
                || self
                    .resource_names
                    .iter()
                    .any(|m| m.is_match(&violation.resource_name)))
    }
}

/// A violation suppressed by an exception. Both records are kept verbatim
/// for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredViolation {
    pub violation: Violation,
    pub exception: Exception,
}

/// Split `violations` into those still active and those suppressed by the
/// first applicable exception in declaration order.
pub fn filter(
    violations: Vec<Violation>,
    exceptions: &[Exception],
    now: NaiveDate,
) -> (Vec<Violation>, Vec<FilteredViolation>) {
    let mut active = vec![];
    let mut filtered = vec![];
    for violation in violations {
        match exceptions.iter().find(|e| e.applies_to(&violation, now)) {
            Some(exception) => {
                log::debug!(
                    "{} on {}.{} suppressed: {}",
                    violation.rule_id,
                    violation.resource_type,
                    violation.resource_name,
                    exception.reason
                );
                filtered.push(FilteredViolation {
                    violation,
                    exception: exception.clone(),
                })
            }
            None => active.push(violation),
        }
    }
    (active, filtered)
}

#[derive(Debug, Clone, Default)]
pub struct ExceptionEngine {
    exceptions: Vec<Exception>,
}

impl ExceptionEngine {
    pub fn new(configs: &[ExceptionConfig]) -> Result<Self, LoadError> {
        let exceptions = configs
            .iter()
            .enumerate()
            .map(|(idx, c)| Exception::new(idx, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { exceptions })
    }

    pub fn exceptions(&self) -> &[Exception] {
        &self.exceptions
    }

    pub fn filter(
        &self,
        violations: Vec<Violation>,
        now: NaiveDate,
    ) -> (Vec<Violation>, Vec<FilteredViolation>) {
        for e in self.exceptions.iter().filter(|e| e.is_expired(now)) {
            log::warn!(
                "exception for {:?} approved by {} expired on {}",
                e.rule_ids,
                e.approved_by,
                e.expires_at.map(|d| d.to_string()).unwrap_or_default()
            );
        }
        filter(violations, &self.exceptions, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Severity;

    fn violation(rule_id: &str, file: &str, name: &str) -> Violation {
        Violation {
            rule_id: rule_id.to_string(),
            rule_name: rule_id.to_string(),
            severity: Severity::Error,
            message: String::new(),
            file: file.to_string(),
            line: 1,
            column: 1,
            resource_type: "aws_s3_bucket".to_string(),
            resource_name: name.to_string(),
            remediation: None,
        }
    }

    fn config(rules: &[&str]) -> ExceptionConfig {
        ExceptionConfig {
            rules: rules.iter().map(|r| r.to_string()).collect(),
            reason: "accepted risk".to_string(),
            approved_by: "security-team".to_string(),
            ..Default::default()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn audit_fields_are_required() {
        let mut c = config(&["r"]);
        c.reason = " ".to_string();
        assert!(Exception::new(0, &c).is_err());

        let mut c = config(&["r"]);
        c.approved_by.clear();
        assert!(Exception::new(0, &c).is_err());

        assert!(Exception::new(0, &config(&[])).is_err());

        let mut c = config(&["r"]);
        c.expires_at = Some("next week".to_string());
        assert!(Exception::new(0, &c).is_err());

        let mut c = config(&["r"]);
        c.paths = vec!["a/[".to_string()];
        assert!(matches!(
            Exception::new(3, &c),
            Err(LoadError::ExceptionValidation { index: 3, .. })
        ));
    }

    #[test]
    fn expiry_boundary() -> Result<(), LoadError> {
        let mut c = config(&["r"]);
        c.expires_at = Some("2024-06-30".to_string());
        let e = Exception::new(0, &c)?;
        let v = violation("r", "main.tf", "b");
        assert!(e.applies_to(&v, date(2024, 6, 29)));
        assert!(e.applies_to(&v, date(2024, 6, 30)));
        assert!(!e.applies_to(&v, date(2024, 7, 1)));
        Ok(())
    }

    #[test]
    fn rfc3339_expiry() {
        assert_eq!(
            parse_expiry("2024-06-30T23:00:00-05:00"),
            Ok(date(2024, 6, 30))
        );
        assert_eq!(parse_expiry("2024-06-30"), Ok(date(2024, 6, 30)));
    }

    #[test]
    fn patterns() -> Result<(), LoadError> {
        let mut c = config(&["r"]);
        c.paths = vec!["modules/legacy/**".to_string()];
        c.resource_names = vec!["public_*".to_string()];
        let e = Exception::new(0, &c)?;
        let now = date(2024, 1, 1);

        assert!(e.applies_to(&violation("r", "./modules/legacy/sub/db.tf", "public_b"), now));
        assert!(!e.applies_to(&violation("r", "modules/other/db.tf", "public_b"), now));
        assert!(!e.applies_to(&violation("r", "modules/legacy/db.tf", "private_b"), now));
        assert!(!e.applies_to(&violation("other", "modules/legacy/db.tf", "public_b"), now));
        Ok(())
    }

    #[test]
    fn relative_path_patterns() -> Result<(), LoadError> {
        let mut c = config(&["r"]);
        c.paths = vec!["./modules/**".to_string()];
        let e = Exception::new(0, &c)?;
        let now = date(2024, 1, 1);

        assert!(e.applies_to(&violation("r", "modules/vpc/main.tf", "b"), now));
        assert!(e.applies_to(&violation("r", "./modules/main.tf", "b"), now));
        assert!(!e.applies_to(&violation("r", "envs/modules/main.tf", "b"), now));
        assert_eq!(e.path_patterns, vec!["./modules/**".to_string()]);
        Ok(())
    }

    #[test]
    fn first_match_wins() -> Result<(), LoadError> {
        let mut first = config(&["r"]);
        first.reason = "first".to_string();
        let mut second = config(&["r"]);
        second.reason = "second".to_string();
        let engine = ExceptionEngine::new(&[first, second])?;

        let v = violation("r", "main.tf", "b");
        let (active, filtered) = engine.filter(
            vec![v.clone(), violation("x", "main.tf", "b")],
            date(2024, 1, 1),
        );
        assert_eq!(active.len(), 1);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].exception.reason, "first");
        assert_eq!(filtered[0].violation, v);
        Ok(())
    }
}
