// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::exceptions::FilteredViolation;
use crate::rules::{EvaluationError, Severity, Violation};

use anyhow::Result;
use serde::Serialize;

/// Everything one scan produced, handed to reporters as a single batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub violations: Vec<Violation>,
    pub filtered_violations: Vec<FilteredViolation>,
    pub evaluation_errors: Vec<EvaluationError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub filtered: usize,
    pub evaluation_errors: usize,
}

impl ScanReport {
    /// Highest severity among active violations.
    pub fn max_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max()
    }

    /// Whether an active violation reaches `fail_on`. Suppressed violations
    /// and evaluation errors never fail a scan on their own.
    pub fn should_fail(&self, fail_on: Severity) -> bool {
        self.max_severity().is_some_and(|s| s >= fail_on)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            filtered: self.filtered_violations.len(),
            evaluation_errors: self.evaluation_errors.len(),
            ..Summary::default()
        };
        for v in &self.violations {
            match v.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.infos += 1,
            }
        }
        summary
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
