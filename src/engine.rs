// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::config::*;
use crate::context::ScanContext;
use crate::environment::ScanEnvironment;
use crate::error::LoadError;
use crate::exceptions::ExceptionEngine;
use crate::functions::{FunctionTable, UserFunction};
use crate::report::ScanReport;
use crate::rules::{Rule, RuleEngine, Severity};

use chrono::{Local, NaiveDate};

/// The planguard policy engine.
///
/// Rules, user functions and exceptions are compiled once by [`Engine::new`];
/// any problem with them is reported there and no scan runs. A compiled engine
/// can scan any number of resource sets.
#[derive(Debug, Clone)]
pub struct Engine {
    settings: Settings,
    excludes: ExcludePaths,
    rules: RuleEngine,
    exceptions: ExceptionEngine,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, LoadError> {
        let excludes = config.settings.exclude_matcher()?;

        let mut functions = FunctionTable::new();
        for f in &config.functions {
            functions.add(UserFunction::new(&f.name, &f.params, &f.expression)?)?;
        }

        let rules = config
            .rules
            .iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        let engine = Self {
            rules: RuleEngine::new(rules, functions)?,
            exceptions: ExceptionEngine::new(&config.exceptions)?,
            settings: config.settings,
            excludes,
        };
        log::debug!(
            "loaded {} rules, {} functions, {} exceptions",
            engine.rules.rules().len(),
            engine.rules.functions().len(),
            engine.exceptions.exceptions().len()
        );
        Ok(engine)
    }

    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        Self::new(Config::from_json_str(json)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self, LoadError> {
        Self::new(Config::from_yaml_str(yaml)?)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether `path` matches one of the exclude-path globs. File discovery
    /// calls this before resources reach a scan.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excludes.is_match(path)
    }

    pub fn rules(&self) -> &[Rule] {
        self.rules.rules()
    }

    /// Evaluate every rule against every resource of `context`, then filter
    /// the violations through the exceptions as of `now`.
    pub fn scan(
        &self,
        context: &ScanContext,
        environment: &ScanEnvironment,
        now: NaiveDate,
    ) -> ScanReport {
        let (violations, evaluation_errors) = self.rules.evaluate(context, environment);
        let (violations, filtered_violations) = self.exceptions.filter(violations, now);

        let report = ScanReport {
            violations,
            filtered_violations,
            evaluation_errors,
        };
        log::info!(
            "scanned {} resources with {} rules: {} violations, {} filtered, {} evaluation errors",
            context.len(),
            self.rules.rules().len(),
            report.violations.len(),
            report.filtered_violations.len(),
            report.evaluation_errors.len()
        );
        report
    }

    /// Scan with the environment and date captured now.
    pub fn scan_now(&self, context: &ScanContext) -> ScanReport {
        let environment = ScanEnvironment::capture();
        self.scan(context, &environment, Local::now().date_naive())
    }

    /// The configured failure threshold.
    pub fn fail_on(&self) -> Severity {
        self.settings.fail_on()
    }

    pub fn should_fail(&self, report: &ScanReport) -> bool {
        report.should_fail(self.fail_on())
    }
}
