// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::glob::normalize_path;
use crate::resource::Resource;
use crate::value::Value;

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

/// Which resource types a rule or a `resources()` query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
    /// `*`
    Any,
    /// `aws_*`
    Prefix(String),
    Exact(String),
}

impl TypePattern {
    pub fn matches(&self, resource_type: &str) -> bool {
        match self {
            TypePattern::Any => true,
            TypePattern::Prefix(p) => resource_type.starts_with(p.as_str()),
            TypePattern::Exact(t) => resource_type == t,
        }
    }
}

impl FromStr for TypePattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("resource type pattern is empty".to_string());
        }
        match s.find('*') {
            None => Ok(TypePattern::Exact(s.to_string())),
            Some(i) if i == s.len() - 1 => match &s[..i] {
                "" => Ok(TypePattern::Any),
                prefix => Ok(TypePattern::Prefix(prefix.to_string())),
            },
            Some(_) => Err(format!(
                "invalid resource type pattern `{s}`: `*` is only allowed at the end"
            )),
        }
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypePattern::Any => f.write_str("*"),
            TypePattern::Prefix(p) => write!(f, "{p}*"),
            TypePattern::Exact(t) => f.write_str(t),
        }
    }
}

/// Cross-resource queries available to expressions. Results are attribute
/// maps in declaration order.
pub trait ResourceIndex {
    fn resources_by_type_pattern(&self, pattern: &TypePattern) -> Vec<Value>;

    fn resources_by_file(&self, file: &str) -> Vec<Value>;
}

/// All resources of one scan, indexed by type and by file.
#[derive(Debug, Default)]
pub struct ScanContext {
    resources: Vec<Resource>,
    by_type: HashMap<String, Vec<usize>>,
    by_file: HashMap<String, Vec<usize>>,
}

impl ScanContext {
    pub fn new(resources: Vec<Resource>) -> Self {
        let mut by_type: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_file: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, r) in resources.iter().enumerate() {
            by_type.entry(r.resource_type.clone()).or_default().push(idx);
            by_file.entry(normalize_path(&r.file)).or_default().push(idx);
        }
        Self {
            resources,
            by_type,
            by_file,
        }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources whose type matches `pattern`, in declaration order.
    pub fn resources_of_type(&self, pattern: &TypePattern) -> Vec<&Resource> {
        match pattern {
            TypePattern::Exact(t) => self
                .by_type
                .get(t)
                .map(|ids| ids.iter().map(|i| &self.resources[*i]).collect())
                .unwrap_or_default(),
            _ => self
                .resources
                .iter()
                .filter(|r| pattern.matches(&r.resource_type))
                .collect(),
        }
    }

    pub fn resources_in_file(&self, file: &str) -> Vec<&Resource> {
        self.by_file
            .get(&normalize_path(file))
            .map(|ids| ids.iter().map(|i| &self.resources[*i]).collect())
            .unwrap_or_default()
    }
}

impl ResourceIndex for ScanContext {
    fn resources_by_type_pattern(&self, pattern: &TypePattern) -> Vec<Value> {
        self.resources_of_type(pattern)
            .into_iter()
            .map(Resource::attributes_value)
            .collect()
    }

    fn resources_by_file(&self, file: &str) -> Vec<Value> {
        self.resources_in_file(file)
            .into_iter()
            .map(Resource::attributes_value)
            .collect()
    }
}
