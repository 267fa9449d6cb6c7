// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use chrono::NaiveDate;
use planguard::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn attrs(json: &str) -> Result<Map> {
    Ok(Value::from_json_str(json)?.as_object()?.clone())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn environment() -> ScanEnvironment {
    ScanEnvironment::new("Tuesday", "main")
}

const PUBLIC_BUCKET: &str = r#"{
  "rules": [{
    "id": "s3_public_acl",
    "name": "S3 bucket is publicly readable",
    "resource_type": "aws_s3_bucket",
    "severity": "error",
    "condition": [{"expression": "self.acl == \"public-read\""}],
    "message": "bucket ACL grants public read access",
    "remediation": "set acl to private"
  }]
}"#;

fn public_bucket() -> Result<ScanContext> {
    Ok(ScanContext::new(vec![Resource::new(
        "aws_s3_bucket",
        "public_bucket",
        attrs(r#"{"acl": "public-read"}"#)?,
    )
    .at("storage.tf", 3, 1)]))
}

#[test]
fn public_bucket_is_reported() -> Result<()> {
    init_logger();
    let engine = Engine::from_json_str(PUBLIC_BUCKET)?;
    let report = engine.scan(&public_bucket()?, &environment(), date(2024, 1, 1));

    assert_eq!(report.violations.len(), 1);
    assert!(report.filtered_violations.is_empty());
    assert!(report.evaluation_errors.is_empty());

    let v = &report.violations[0];
    assert_eq!(v.rule_id, "s3_public_acl");
    assert_eq!(v.severity, Severity::Error);
    assert_eq!(v.resource_name, "public_bucket");
    assert_eq!((v.file.as_str(), v.line), ("storage.tf", 3));
    assert_eq!(v.remediation.as_deref(), Some("set acl to private"));
    assert!(engine.should_fail(&report));
    Ok(())
}

#[test]
fn exception_suppresses_violation() -> Result<()> {
    init_logger();
    let mut config = Config::from_json_str(PUBLIC_BUCKET)?;
    config.exceptions.push(ExceptionConfig {
        rules: vec!["s3_public_acl".to_string()],
        resource_names: vec!["public_*".to_string()],
        reason: "static website".to_string(),
        approved_by: "security-team".to_string(),
        ticket: Some("SEC-42".to_string()),
        ..Default::default()
    });
    let engine = Engine::new(config)?;

    let context = public_bucket()?;
    let report = engine.scan(&context, &environment(), date(2024, 1, 1));
    assert!(report.violations.is_empty());
    assert_eq!(report.filtered_violations.len(), 1);

    // The audit trail keeps the violation as it was reported without the
    // exception.
    let unfiltered = Engine::from_json_str(PUBLIC_BUCKET)?.scan(
        &context,
        &environment(),
        date(2024, 1, 1),
    );
    let filtered = &report.filtered_violations[0];
    assert_eq!(filtered.violation, unfiltered.violations[0]);
    assert_eq!(filtered.exception.approved_by, "security-team");
    assert_eq!(filtered.exception.ticket.as_deref(), Some("SEC-42"));
    assert!(!engine.should_fail(&report));
    Ok(())
}

#[test]
fn expired_exception_no_longer_applies() -> Result<()> {
    let mut config = Config::from_json_str(PUBLIC_BUCKET)?;
    config.exceptions.push(ExceptionConfig {
        rules: vec!["s3_public_acl".to_string()],
        reason: "migration in progress".to_string(),
        approved_by: "security-team".to_string(),
        expires_at: Some("2024-06-30".to_string()),
        ..Default::default()
    });
    let engine = Engine::new(config)?;
    let context = public_bucket()?;

    let report = engine.scan(&context, &environment(), date(2024, 6, 30));
    assert_eq!(report.filtered_violations.len(), 1);

    let report = engine.scan(&context, &environment(), date(2024, 7, 1));
    assert_eq!(report.violations.len(), 1);
    assert!(report.filtered_violations.is_empty());
    Ok(())
}

#[test]
fn vpc_without_flow_log() -> Result<()> {
    init_logger();
    let engine = Engine::from_json_str(
        r#"{
          "rules": [{
            "id": "vpc_flow_logs",
            "resource_type": "aws_vpc",
            "severity": "warning",
            "condition": "length([for f in resources(\"aws_flow_log\") : f if f.vpc_id == self.id]) == 0",
            "message": "VPC has no flow log"
          }]
        }"#,
    )?;
    let context = ScanContext::new(vec![
        Resource::new("aws_vpc", "logged", attrs(r#"{"id": "vpc-1"}"#)?).at("net.tf", 1, 1),
        Resource::new("aws_vpc", "unlogged", attrs(r#"{"id": "vpc-2"}"#)?).at("net.tf", 10, 1),
        Resource::new("aws_flow_log", "logs", attrs(r#"{"vpc_id": "vpc-1"}"#)?)
            .at("net.tf", 20, 1),
    ]);

    let report = engine.scan(&context, &environment(), date(2024, 1, 1));
    let names: Vec<&str> = report
        .violations
        .iter()
        .map(|v| v.resource_name.as_str())
        .collect();
    assert_eq!(names, vec!["unlogged"]);
    assert_eq!(report.violations[0].severity, Severity::Warning);
    assert!(!engine.should_fail(&report));
    Ok(())
}

#[test]
fn evaluation_error_does_not_stop_scan() -> Result<()> {
    init_logger();
    let engine = Engine::from_json_str(
        r#"{
          "rules": [
            {"id": "ratio", "resource_type": "aws_instance", "condition": "self.cpu / self.cores > 2"},
            {"id": "public_ip", "resource_type": "aws_instance", "condition": "self.associate_public_ip_address"}
          ]
        }"#,
    )?;
    let context = ScanContext::new(vec![
        Resource::new(
            "aws_instance",
            "web",
            attrs(r#"{"cpu": 8, "associate_public_ip_address": true}"#)?,
        )
        .at("compute.tf", 1, 1),
        Resource::new("aws_instance", "db", attrs(r#"{"cpu": 8, "cores": 2}"#)?)
            .at("compute.tf", 9, 1),
    ]);

    let report = engine.scan(&context, &environment(), date(2024, 1, 1));

    assert_eq!(report.evaluation_errors.len(), 1);
    let e = &report.evaluation_errors[0];
    assert_eq!(e.rule_id, "ratio");
    assert_eq!(e.resource_name, "web");
    assert_eq!(e.stage, Stage::Condition);
    assert_eq!(e.condition, Some(0));
    assert!(e.message.contains("arithmetic operand is absent"));

    // An absent condition result on `db` is neither a violation nor an error.
    let ids: Vec<(&str, &str)> = report
        .violations
        .iter()
        .map(|v| (v.rule_id.as_str(), v.resource_name.as_str()))
        .collect();
    assert_eq!(ids, vec![("public_ip", "web"), ("ratio", "db")]);
    Ok(())
}

#[test]
fn oversized_arguments_are_evaluation_errors() -> Result<()> {
    init_logger();
    let engine = Engine::from_json_str(
        r#"{
          "rules": [
            {"id": "wide", "resource_type": "*", "condition": "length(format(\"%99999999999999999999d\", 1)) > 0"},
            {"id": "subnet", "resource_type": "*", "condition": "cidrsubnet(\"10.0.0.0/8\", 9223372036854775807, 0) != \"\""},
            {"id": "substr", "resource_type": "*", "condition": "substr(\"abc\", 1, 9223372036854775807) == \"bc\""}
          ]
        }"#,
    )?;
    let context = ScanContext::new(vec![
        Resource::new("aws_vpc", "main", Map::new()).at("network.tf", 1, 1)
    ]);

    let report = engine.scan(&context, &environment(), date(2024, 1, 1));

    let failed: Vec<&str> = report
        .evaluation_errors
        .iter()
        .map(|e| e.rule_id.as_str())
        .collect();
    assert_eq!(failed, vec!["subnet", "wide"]);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].rule_id, "substr");
    Ok(())
}

#[test]
fn guards_and_type_patterns() -> Result<()> {
    let engine = Engine::from_json_str(
        r#"{
          "rules": [{
            "id": "prod_tags",
            "resource_type": "aws_*",
            "when": {"expression": "try(self.tags.env, null) == \"prod\" ? true : null"},
            "condition": "!contains(keys(self.tags), \"owner\")"
          }]
        }"#,
    )?;
    let context = ScanContext::new(vec![
        Resource::new("aws_s3_bucket", "prod", attrs(r#"{"tags": {"env": "prod"}}"#)?)
            .at("a.tf", 1, 1),
        Resource::new("aws_s3_bucket", "dev", attrs(r#"{"tags": {"env": "dev"}}"#)?)
            .at("a.tf", 5, 1),
        Resource::new(
            "google_storage_bucket",
            "prod",
            attrs(r#"{"tags": {"env": "prod"}}"#)?,
        )
        .at("a.tf", 9, 1),
    ]);

    let report = engine.scan(&context, &environment(), date(2024, 1, 1));
    assert!(report.evaluation_errors.is_empty());
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].resource_type, "aws_s3_bucket");
    assert_eq!(report.violations[0].resource_name, "prod");
    Ok(())
}

#[test]
fn conditions_are_a_conjunction() -> Result<()> {
    let engine = Engine::from_json_str(
        r#"{
          "rules": [{
            "id": "open_ssh",
            "resource_type": "aws_security_group_rule",
            "condition": [
              "self.from_port <= 22 && self.to_port >= 22",
              "contains(self.cidr_blocks, \"0.0.0.0/0\")"
            ]
          }]
        }"#,
    )?;
    let context = ScanContext::new(vec![
        Resource::new(
            "aws_security_group_rule",
            "open",
            attrs(r#"{"from_port": 22, "to_port": 22, "cidr_blocks": ["0.0.0.0/0"]}"#)?,
        ),
        Resource::new(
            "aws_security_group_rule",
            "internal",
            attrs(r#"{"from_port": 22, "to_port": 22, "cidr_blocks": ["10.0.0.0/8"]}"#)?,
        ),
        // The first condition fails so the second is never evaluated.
        Resource::new("aws_security_group_rule", "https", attrs(r#"{"from_port": 443, "to_port": 443}"#)?),
    ]);

    let report = engine.scan(&context, &environment(), date(2024, 1, 1));
    assert!(report.evaluation_errors.is_empty());
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].resource_name, "open");
    Ok(())
}

#[test]
fn environment_functions() -> Result<()> {
    let engine = Engine::from_json_str(
        r#"{
          "rules": [{
            "id": "weekend_prod_change",
            "resource_type": "*",
            "condition": "contains([\"Saturday\", \"Sunday\"], day_of_week()) && git_branch() == \"main\""
          }]
        }"#,
    )?;
    let context = public_bucket()?;
    let now = date(2024, 1, 1);

    let weekday = engine.scan(&context, &ScanEnvironment::new("Tuesday", "main"), now);
    assert!(weekday.violations.is_empty());

    let weekend = engine.scan(&context, &ScanEnvironment::new("Saturday", "main"), now);
    assert_eq!(weekend.violations.len(), 1);
    Ok(())
}

#[test]
fn user_functions_in_rules() -> Result<()> {
    let engine = Engine::from_json_str(
        r#"{
          "functions": [{
            "name": "is_world_open",
            "params": ["cidrs"],
            "expression": "contains(cidrs, \"0.0.0.0/0\") || contains(cidrs, \"::/0\")"
          }],
          "rules": [{
            "id": "world_open",
            "resource_type": "aws_security_group_rule",
            "condition": "is_world_open(self.cidr_blocks)"
          }]
        }"#,
    )?;
    let context = ScanContext::new(vec![Resource::new(
        "aws_security_group_rule",
        "v6",
        attrs(r#"{"cidr_blocks": ["::/0"]}"#)?,
    )]);
    let report = engine.scan(&context, &environment(), date(2024, 1, 1));
    assert_eq!(report.violations.len(), 1);
    Ok(())
}

#[test]
fn raw_expression_rules() -> Result<()> {
    let engine = Engine::from_json_str(
        r#"{
          "rules": [{
            "id": "inline_policy",
            "resource_type": "aws_iam_policy",
            "severity": "info",
            "condition": "calls_function(\"policy\", \"jsonencode\")"
          }]
        }"#,
    )?;
    let context = ScanContext::new(vec![
        Resource::new("aws_iam_policy", "inline", Map::new())
            .with_raw_expression("policy", "jsonencode({ Statement = [] })"),
        Resource::new("aws_iam_policy", "document", Map::new())
            .with_raw_expression("policy", "data.aws_iam_policy_document.x.json"),
    ]);
    let report = engine.scan(&context, &environment(), date(2024, 1, 1));
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].resource_name, "inline");
    assert_eq!(report.summary().infos, 1);
    Ok(())
}

#[test]
fn scans_are_idempotent_and_sorted() -> Result<()> {
    let engine = Engine::from_json_str(
        r#"{
          "rules": [
            {"id": "b_rule", "resource_type": "*", "condition": "true"},
            {"id": "a_rule", "resource_type": "*", "condition": "true"}
          ],
          "exceptions": [
            {"rules": "a_rule", "paths": "legacy/**", "reason": "legacy", "approved_by": "ops"}
          ]
        }"#,
    )?;
    let context = ScanContext::new(vec![
        Resource::new("aws_vpc", "z", Map::new()).at("net.tf", 30, 1),
        Resource::new("aws_vpc", "y", Map::new()).at("legacy/net.tf", 2, 1),
        Resource::new("aws_vpc", "x", Map::new()).at("net.tf", 4, 1),
    ]);
    let env = environment();
    let now = date(2024, 1, 1);

    let first = engine.scan(&context, &env, now);
    let second = engine.scan(&context, &env, now);
    assert_eq!(first, second);

    let order: Vec<(&str, u32, &str)> = first
        .violations
        .iter()
        .map(|v| (v.file.as_str(), v.line, v.rule_id.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("legacy/net.tf", 2, "b_rule"),
            ("net.tf", 4, "a_rule"),
            ("net.tf", 4, "b_rule"),
            ("net.tf", 30, "a_rule"),
            ("net.tf", 30, "b_rule"),
        ]
    );
    assert_eq!(first.filtered_violations.len(), 1);
    assert_eq!(first.summary().filtered, 1);
    Ok(())
}

#[test]
fn failure_threshold() -> Result<()> {
    let rules = r#""rules": [{"id": "r", "resource_type": "*", "severity": "warning", "condition": "true"}]"#;
    let context = public_bucket()?;
    let now = date(2024, 1, 1);

    let engine = Engine::from_json_str(&format!("{{{rules}}}"))?;
    let report = engine.scan(&context, &environment(), now);
    assert_eq!(report.max_severity(), Some(Severity::Warning));
    assert!(!engine.should_fail(&report));

    let engine = Engine::from_json_str(&format!(
        r#"{{"settings": {{"fail_on_warning": true}}, {rules}}}"#
    ))?;
    assert!(engine.should_fail(&report));

    let engine = Engine::from_json_str(&format!(
        r#"{{"settings": {{"fail_on": "info"}}, {rules}}}"#
    ))?;
    assert_eq!(engine.fail_on(), Severity::Info);
    assert!(engine.should_fail(&report));
    Ok(())
}

#[test]
fn load_errors() {
    let err = Engine::from_json_str(
        r#"{"rules": [
          {"id": "r", "resource_type": "*", "condition": "true"},
          {"id": "r", "resource_type": "*", "condition": "false"}
        ]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::DuplicateRule(ref id) if id == "r"));

    let err = Engine::from_json_str(
        r#"{"rules": [{"id": "broken", "resource_type": "*", "condition": "self.acl =="}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::Parse { ref rule_id, .. } if rule_id == "broken"));

    let err = Engine::from_json_str(
        r#"{"rules": [{"id": "empty", "resource_type": "*"}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::InvalidRule { .. }));

    let err = Engine::from_json_str(
        r#"{"rules": [{"id": "r", "resource_type": "aws_*_bucket", "condition": "true"}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::InvalidRule { .. }));

    let err = Engine::from_json_str(
        r#"{"exceptions": [{"rules": "r", "reason": "because"}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::ExceptionValidation { index: 0, .. }));
    assert!(err.to_string().contains("approved_by"));

    let err = Engine::from_json_str(
        r#"{"functions": [{"name": "upper", "expression": "1"}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, LoadError::InvalidFunction { .. }));

    assert!(matches!(
        Engine::from_json_str(r#"{"settings": {"exclude_paths": ["a/["]}}"#),
        Err(LoadError::InvalidSettings(_))
    ));
}

#[test]
fn yaml_config() -> Result<()> {
    let engine = Engine::from_yaml_str(
        r#"
settings:
  fail_on: warning
  exclude_paths: ["**/fixtures/**"]
rule:
  id: s3_versioning
  resource_type: aws_s3_bucket
  severity: warning
  when: 'can(self.versioning)'
  condition: 'self.versioning.enabled != true'
  message: versioning is disabled
exception:
  - rules: s3_versioning
    paths: "scratch/**"
    reason: scratch buckets
    approved_by: platform
    expires_at: "2030-01-01T00:00:00Z"
"#,
    )?;
    assert_eq!(engine.rules().len(), 1);
    assert_eq!(engine.rules()[0].name, "s3_versioning");
    assert!(engine.is_excluded("test/fixtures/main.tf"));
    assert!(engine.is_excluded("./test/fixtures/main.tf"));
    assert!(!engine.is_excluded("test/main.tf"));

    let context = ScanContext::new(vec![
        Resource::new(
            "aws_s3_bucket",
            "logs",
            attrs(r#"{"versioning": {"enabled": false}}"#)?,
        )
        .at("storage.tf", 1, 1),
        Resource::new(
            "aws_s3_bucket",
            "tmp",
            attrs(r#"{"versioning": {"enabled": false}}"#)?,
        )
        .at("scratch/storage.tf", 1, 1),
        Resource::new("aws_s3_bucket", "unset", Map::new()).at("storage.tf", 9, 1),
    ]);
    let report = engine.scan(&context, &environment(), date(2024, 1, 1));
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].resource_name, "logs");
    assert_eq!(report.filtered_violations.len(), 1);
    assert!(engine.should_fail(&report));

    let json = report.to_json_str()?;
    assert!(json.contains("\"filtered_violations\""));
    assert!(json.contains("\"approved_by\": \"platform\""));
    Ok(())
}
