// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::collections::BTreeMap;
use std::env;

use anyhow::{bail, Result};
use planguard::*;
use serde::{Deserialize, Serialize};
use test_generator::test_resources;

// Interpret special encodings in expected values.
pub fn process_value(v: &Value) -> Result<Value> {
    match v {
        // Handle the absent signal encoded as the string "#absent"
        Value::String(s) if s.as_ref() == "#absent" => Ok(Value::Undefined),

        // An expected `null` is written "#null" since a bare null reads as a
        // missing want_result.
        Value::String(s) if s.as_ref() == "#null" => Ok(Value::Null),

        Value::Array(items) => Ok(Value::from(
            items
                .iter()
                .map(process_value)
                .collect::<Result<Vec<_>>>()?,
        )),

        Value::Object(fields) => {
            let mut map = Map::new();
            for (k, v) in fields.iter() {
                map.insert(k.clone(), process_value(v)?);
            }
            Ok(Value::from(map))
        }

        _ => Ok(v.clone()),
    }
}

fn display_values(c: &Value, e: &Value) -> Result<String> {
    Ok(format!(
        "\nleft  = {}\nright = {}\n",
        serde_json::to_string_pretty(c)?,
        serde_json::to_string_pretty(e)?
    ))
}

// On mismatch, report the failing sub-value instead of the whole value.
fn match_values_impl(computed: &Value, expected: &Value) -> Result<()> {
    match (computed, expected) {
        (Value::Array(a1), Value::Array(a2)) => {
            if a1.len() != a2.len() {
                bail!(
                    "array length mismatch: {} != {}{}",
                    a1.len(),
                    a2.len(),
                    display_values(computed, expected)?
                );
            }
            for (v1, v2) in a1.iter().zip(a2.iter()) {
                match_values_impl(v1, v2)?;
            }
            Ok(())
        }

        (Value::Object(o1), Value::Object(o2)) => {
            if o1.len() != o2.len() {
                bail!(
                    "object length mismatch: {} != {}{}",
                    o1.len(),
                    o2.len(),
                    display_values(computed, expected)?
                );
            }
            for (k, v1) in o1.iter() {
                match o2.get(k) {
                    Some(v2) => match_values_impl(v1, v2)?,
                    None => bail!("missing key `{k}`{}", display_values(computed, expected)?),
                }
            }
            Ok(())
        }

        (Value::Undefined, Value::Undefined) => Ok(()),
        (Value::Undefined, _) | (_, Value::Undefined) => {
            bail!("value mismatch: {}", display_values(computed, expected)?)
        }
        (c, e) if c == e => Ok(()),
        _ => bail!("value mismatch: {}", display_values(computed, expected)?),
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct TestResource {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    file: String,
    #[serde(default)]
    attributes: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct TestCase {
    note: String,
    expression: String,
    #[serde(rename = "self")]
    self_value: Option<Value>,
    #[serde(default)]
    raw_expressions: BTreeMap<String, String>,
    #[serde(default)]
    resources: Vec<TestResource>,
    environment: Option<ScanEnvironment>,
    #[serde(default)]
    functions: Vec<FunctionConfig>,
    want_result: Option<Value>,
    error: Option<String>,
    skip: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn attributes(v: Option<Value>) -> Result<Map> {
    match v {
        Some(Value::Object(m)) => Ok(m.as_ref().clone()),
        None => Ok(Map::new()),
        Some(v) => bail!("attributes must be a map, got {v}"),
    }
}

fn eval_case(case: &TestCase) -> Result<Value> {
    let mut functions = FunctionTable::new();
    for f in &case.functions {
        functions.add(UserFunction::new(&f.name, &f.params, &f.expression)?)?;
    }

    let mut resources = vec![];
    for r in &case.resources {
        resources.push(
            Resource::new(&r.resource_type, &r.name, attributes(r.attributes.clone())?)
                .at(&r.file, 1, 1),
        );
    }
    let context = ScanContext::new(resources);

    let mut current = Resource::new("test_resource", "self", attributes(case.self_value.clone())?);
    for (attr, text) in &case.raw_expressions {
        current = current.with_raw_expression(attr, text);
    }

    let mut scope = Scope::new()
        .with_resource(&current)
        .with_index(&context)
        .with_functions(&functions);
    if let Some(environment) = &case.environment {
        scope = scope.with_environment(environment);
    }

    let expr = Expression::parse("<test>", &case.expression)?;
    Ok(evaluate(&expr, &scope)?)
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in &test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }

        match (&case.want_result, &case.error) {
            (Some(_), None) | (None, Some(_)) => (),
            _ => panic!("either want_result or error must be specified in test case."),
        }

        match eval_case(case) {
            Ok(computed) => match &case.want_result {
                Some(want_result) => {
                    let expected = process_value(want_result)?;
                    if let Err(e) = match_values_impl(&computed, &expected) {
                        bail!("case `{}`: {e}", case.note);
                    }
                }
                None => bail!(
                    "case `{}`: eval succeeded with {computed} and did not produce any errors",
                    case.note
                ),
            },
            Err(actual) => match &case.error {
                Some(expected) => {
                    let actual = actual.to_string();
                    if !actual.contains(expected.as_str()) {
                        bail!(
                            "case `{}`: error message\n`{}\n`\ndoes not contain `{}`",
                            case.note,
                            actual,
                            expected
                        );
                    }
                    println!("{actual}");
                }
                None => bail!("case `{}`: {actual}", case.note),
            },
        }

        println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test_resources("tests/evaluator/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}

#[test]
#[ignore = "intended for running a single yaml file"]
fn one_yaml() -> Result<()> {
    let file = env::args().find(|a| a.ends_with(".yaml"));
    match file {
        Some(f) => yaml_test(&f),
        None => bail!("missing <yaml-file>"),
    }
}
