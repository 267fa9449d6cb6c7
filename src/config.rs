// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::glob::{glob, normalize_path};
use crate::error::LoadError;
use crate::rules::Severity;

use std::path::Path;

use globset::{GlobSet, GlobSetBuilder};
use serde::{Deserialize, Deserializer, Serialize};

/// Rules, exceptions, user functions and global settings.
///
/// Block names may be given singular, as in the HCL schema (`rule`,
/// `exception`, `function`), or plural.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default, alias = "rule", deserialize_with = "one_or_many")]
    pub rules: Vec<RuleConfig>,

    #[serde(default, alias = "exception", deserialize_with = "one_or_many")]
    pub exceptions: Vec<ExceptionConfig>,

    #[serde(default, alias = "function", deserialize_with = "one_or_many")]
    pub functions: Vec<FunctionConfig>,
}

fn default_exclude_paths() -> Vec<String> {
    vec![
        "**/.terraform/**".to_string(),
        "**/node_modules/**".to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Lowest severity among active violations that fails a scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on: Option<Severity>,

    /// Legacy switch: `true` means `fail_on = "warning"`.
    #[serde(default)]
    pub fail_on_warning: bool,

    #[serde(default = "default_exclude_paths")]
    pub exclude_paths: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fail_on: None,
            fail_on_warning: false,
            exclude_paths: default_exclude_paths(),
        }
    }
}

impl Settings {
    /// The effective failure threshold. An explicit `fail_on` wins over the
    /// legacy flag.
    pub fn fail_on(&self) -> Severity {
        match (self.fail_on, self.fail_on_warning) {
            (Some(s), _) => s,
            (None, true) => Severity::Warning,
            (None, false) => Severity::Error,
        }
    }

    /// Compile `exclude_paths` into one matcher.
    pub fn exclude_matcher(&self) -> Result<ExcludePaths, LoadError> {
        let mut builder = GlobSetBuilder::new();
        for p in &self.exclude_paths {
            builder.add(glob(&normalize_path(p)).map_err(|e| {
                LoadError::InvalidSettings(format!("invalid exclude path `{p}`: {e}"))
            })?);
        }
        builder
            .build()
            .map(ExcludePaths)
            .map_err(|e| LoadError::InvalidSettings(e.to_string()))
    }
}

/// Compiled exclude-path globs.
#[derive(Debug, Clone, Default)]
pub struct ExcludePaths(GlobSet);

impl ExcludePaths {
    pub fn is_match(&self, path: &str) -> bool {
        self.0.is_match(normalize_path(path))
    }
}

/// An expression given either as `{ expression = "..." }` or as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpressionBlock {
    Block { expression: String },
    Text(String),
}

impl ExpressionBlock {
    pub fn text(&self) -> &str {
        match self {
            ExpressionBlock::Block { expression } => expression,
            ExpressionBlock::Text(t) => t,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub severity: Severity,

    #[serde(alias = "resource_type_pattern")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<ExpressionBlock>,

    #[serde(default, alias = "conditions", deserialize_with = "one_or_many")]
    pub condition: Vec<ExpressionBlock>,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,

    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionConfig {
    #[serde(alias = "rule_ids", deserialize_with = "one_or_many")]
    pub rules: Vec<String>,

    #[serde(default, alias = "path_patterns", deserialize_with = "one_or_many")]
    pub paths: Vec<String>,

    #[serde(
        default,
        alias = "resource_name_patterns",
        deserialize_with = "one_or_many"
    )]
    pub resource_names: Vec<String>,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub approved_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,

    #[serde(default)]
    pub params: Vec<String>,

    pub expression: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(v) => v,
        OneOrMany::One(v) => vec![v],
    })
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Config, LoadError> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Config, LoadError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read a configuration file. `.yaml` and `.yml` files are read as YAML
    /// and everything else as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, LoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => Self::from_yaml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }
}
