//! Integration tests for replacement configs
//!
//! Loads TOML configs and applies them to files in a temporary workspace

use content_replace::config::{
    apply_rule_sets, build_failed, check_rule_sets, load_from_path, load_from_str, load_rule_sets,
    ApplicationError, ApplyOptions, ConfigError, FileResult,
};
use content_replace::{Environment, NullSink, TextFileError};
use std::fs;
use tempfile::TempDir;

const CHART_YAML: &str = "apiVersion: v2
name: my-service
description: A Helm chart for Kubernetes
type: application
version: 0.1.0
appVersion: \"1.16.0\"
dependencies:
- name: common
  version: ^1.x
  repository: https://dummy-artifactory/repository/my-repository";

fn workspace_with(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

#[test]
fn test_version_bump_with_build_variable() {
    let workspace = workspace_with(&[("version.properties", "Version=0.0.0")]);
    let config = load_from_str(
        r#"
[meta]
name = "version-bump"
workspace_relative = true

[[files]]
path = "version.properties"

[[files.rules]]
search = '(Version=)\d+\.\d+\.\d+'
replace = '$11.0.${BUILD_ID}'
match_count = 1
verbose = true
"#,
    )
    .unwrap();

    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let env = Environment::new().with("BUILD_ID", "42");
    let mut log: Vec<String> = Vec::new();
    let results = apply_rule_sets(&rule_sets, &env, &mut log, ApplyOptions::default());

    assert!(!build_failed(&results));
    assert_eq!(
        fs::read_to_string(workspace.path().join("version.properties")).unwrap(),
        "Version=1.0.42"
    );
    assert_eq!(
        log,
        vec![
            "   > replace : [Version=0.0.0] => [Version=1.0.42]".to_string(),
            r"   > replace times: 1, [(Version=)\d+\.\d+\.\d+] => [$11.0.42]".to_string(),
        ]
    );
}

#[test]
fn test_quiet_rule_with_windows_separator() {
    let workspace = workspace_with(&[("app.properties", "Version=0.0.0\nname=app\n")]);
    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[files]]
path = "app.properties"
line_separator = "Windows"

[[files.rules]]
search = '(Version=)\d+\.\d+\.\d+'
replace = '$11.0.${BUILD_ID}'
"#,
    )
    .unwrap();

    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let env = Environment::new().with("BUILD_ID", "7");
    let mut log: Vec<String> = Vec::new();
    let results = apply_rule_sets(&rule_sets, &env, &mut log, ApplyOptions::default());

    assert!(!build_failed(&results));
    assert!(log.is_empty());
    assert_eq!(
        fs::read_to_string(workspace.path().join("app.properties")).unwrap(),
        "Version=1.0.7\r\nname=app\r\n"
    );
}

#[test]
fn test_chart_yaml_only_targeted_line_changes() {
    let workspace = workspace_with(&[("chart/Chart.yaml", CHART_YAML)]);
    let config_path = workspace.path().join("replacements/chart.toml");
    fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    fs::write(
        &config_path,
        r#"
[meta]
name = "pin-common-chart"
workspace_relative = true

[[files]]
path = "chart/Chart.yaml"

[[files.rules]]
search = 'version: \^1.x'
replace = 'version: 1.10'
match_count = 1
"#,
    )
    .unwrap();

    let config = load_from_path(&config_path).unwrap();
    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let results = apply_rule_sets(
        &rule_sets,
        &Environment::new(),
        &mut NullSink,
        ApplyOptions::default(),
    );

    assert!(!build_failed(&results));
    let after = fs::read_to_string(workspace.path().join("chart/Chart.yaml")).unwrap();
    assert_eq!(after, CHART_YAML.replace("version: ^1.x", "version: 1.10"));

    let changed: Vec<_> = CHART_YAML
        .lines()
        .zip(after.lines())
        .filter(|(before, after)| before != after)
        .collect();
    assert_eq!(changed, vec![("  version: ^1.x", "  version: 1.10")]);
}

#[test]
fn test_failing_file_does_not_stop_the_next_one() {
    let workspace = workspace_with(&[("first.txt", "x x"), ("second.txt", "Version=0.0.0")]);
    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[files]]
path = "first.txt"

[[files.rules]]
search = "x"
replace = "y"
match_count = 1

[[files]]
path = "second.txt"

[[files.rules]]
search = '\d+\.\d+\.\d+'
replace = "2.0.0"
match_count = 1
"#,
    )
    .unwrap();

    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let results = apply_rule_sets(
        &rule_sets,
        &Environment::new(),
        &mut NullSink,
        ApplyOptions::default(),
    );

    assert!(build_failed(&results));
    assert!(matches!(
        results[0].1,
        Err(ApplicationError::MatchCountMismatch {
            expected: 1,
            actual: 2,
            ..
        })
    ));
    assert!(matches!(results[1].1, Ok(FileResult::Replaced { .. })));
    assert_eq!(
        fs::read_to_string(workspace.path().join("first.txt")).unwrap(),
        "x x"
    );
    assert_eq!(
        fs::read_to_string(workspace.path().join("second.txt")).unwrap(),
        "Version=2.0.0"
    );
}

#[test]
fn test_check_reports_without_writing() {
    let workspace = workspace_with(&[("version.txt", "v1")]);
    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[files]]
path = "version.txt"

[[files.rules]]
search = 'v\d'
replace = "v2"
"#,
    )
    .unwrap();

    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let results = check_rule_sets(&rule_sets, &Environment::new(), &mut NullSink, None);

    assert!(matches!(results[0].1, Ok(FileResult::Replaced { .. })));
    assert_eq!(
        fs::read_to_string(workspace.path().join("version.txt")).unwrap(),
        "v1"
    );
}

#[test]
fn test_latin1_file_round_trip() {
    let workspace = TempDir::new().unwrap();
    let path = workspace.path().join("legacy.properties");
    // "name=café\nversion=1" in ISO-8859-1
    let mut bytes = b"name=caf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"\nversion=1");
    fs::write(&path, &bytes).unwrap();

    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[files]]
path = "legacy.properties"
encoding = "ISO-8859-1"

[[files.rules]]
search = 'version=\d'
replace = "version=2"
match_count = 1
"#,
    )
    .unwrap();

    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let results = apply_rule_sets(
        &rule_sets,
        &Environment::new(),
        &mut NullSink,
        ApplyOptions::default(),
    );

    assert!(!build_failed(&results));
    let mut expected = b"name=caf".to_vec();
    expected.push(0xE9);
    expected.extend_from_slice(b"\nversion=2");
    assert_eq!(fs::read(&path).unwrap(), expected);
}

#[test]
fn test_utf16_file_with_byte_order_mark() {
    let workspace = TempDir::new().unwrap();
    let path = workspace.path().join("stamp.txt");
    fs::write(&path, [0xFE, 0xFF, 0x00, b'V', 0x00, b'=', 0x00, b'1']).unwrap();

    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[files]]
path = "stamp.txt"
encoding = "UTF-16"

[[files.rules]]
search = "V=1"
replace = "V=2"
match_count = 1
"#,
    )
    .unwrap();

    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let results = apply_rule_sets(
        &rule_sets,
        &Environment::new(),
        &mut NullSink,
        ApplyOptions::default(),
    );

    assert!(!build_failed(&results));
    assert!(matches!(results[0].1, Ok(FileResult::Replaced { .. })));
    assert_eq!(
        fs::read(&path).unwrap(),
        vec![0xFE, 0xFF, 0x00, b'V', 0x00, b'=', 0x00, b'2']
    );
}

#[test]
fn test_latin1_rejects_characters_outside_the_charset() {
    let workspace = workspace_with(&[("price.txt", "price=10")]);
    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[files]]
path = "price.txt"
encoding = "ISO-8859-1"

[[files.rules]]
search = "10"
replace = "10€"
"#,
    )
    .unwrap();

    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let results = apply_rule_sets(
        &rule_sets,
        &Environment::new(),
        &mut NullSink,
        ApplyOptions::default(),
    );

    assert!(build_failed(&results));
    assert!(matches!(
        results[0].1,
        Err(ApplicationError::File(TextFileError::Unmappable { .. }))
    ));
    assert_eq!(
        fs::read_to_string(workspace.path().join("price.txt")).unwrap(),
        "price=10"
    );
}

#[test]
fn test_missing_variable_fails_with_suggestion() {
    let workspace = workspace_with(&[("a.txt", "tag")]);
    let config = load_from_str(
        r#"
[meta]
workspace_relative = true

[[files]]
path = "a.txt"

[[files.rules]]
search = "tag"
replace = '${BUILD_ID}'
"#,
    )
    .unwrap();

    let rule_sets = config.rule_sets(workspace.path()).unwrap();
    let env = Environment::new().with("BUILD_IDS", "1");
    let results = apply_rule_sets(&rule_sets, &env, &mut NullSink, ApplyOptions::default());

    assert!(build_failed(&results));
    let message = results[0].1.as_ref().unwrap_err().to_string();
    assert!(message.contains("BUILD_ID"), "{message}");
    assert!(message.contains("BUILD_IDS"), "{message}");
    assert_eq!(
        fs::read_to_string(workspace.path().join("a.txt")).unwrap(),
        "tag"
    );
}

#[test]
fn test_invalid_config_reports_every_issue() {
    let err = load_from_str(
        r#"
[[files]]
path = "a.txt"

[[files]]
path = "b.txt"

[[files.rules]]
search = "(unclosed"
"#,
    )
    .unwrap_err();

    match &err {
        ConfigError::Invalid { source, .. } => assert_eq!(source.issues.len(), 2),
        other => panic!("expected validation error, got {other}"),
    }
    let message = err.to_string();
    assert!(message.starts_with("replace config has 2 problem(s):"), "{message}");
    assert_eq!(message.lines().filter(|line| line.starts_with("  - ")).count(), 2);
}

#[test]
fn test_load_rule_sets_from_disk() {
    let workspace = workspace_with(&[("build.txt", "build=0")]);
    let config_path = workspace.path().join("replacements/build.toml");
    fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    fs::write(
        &config_path,
        r#"
[meta]
workspace_relative = true

[[files]]
path = "build.txt"

[[files.rules]]
search = 'build=\d+'
replace = 'build=${BUILD_ID}'
match_count = 1
"#,
    )
    .unwrap();

    let rule_sets = load_rule_sets(&config_path, workspace.path()).unwrap();
    let env = Environment::new().with("BUILD_ID", "12");
    let results = apply_rule_sets(&rule_sets, &env, &mut NullSink, ApplyOptions::default());

    assert!(!build_failed(&results));
    assert_eq!(
        fs::read_to_string(workspace.path().join("build.txt")).unwrap(),
        "build=12"
    );
}
