//! Build step orchestration - applies rule sets to files on disk
//!
//! This module is the bridge between the pure substitution engine and the
//! filesystem:
//! - Reads each target fully and decodes it with its declared encoding
//! - Runs the engine, forwarding build log lines to the host sink
//! - Writes the result back atomically, or leaves the file untouched when a
//!   rule fails
//! - Reports a result per file
//!
//! Files are processed in declared order and independently: a failing file
//! does not stop the ones after it. The build as a whole fails if any file
//! failed (see [`build_failed`]).

use crate::engine::{self, EngineError, MatchOutcome};
use crate::env::Environment;
use crate::log::LogSink;
use crate::rule_set::FileRuleSet;
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::textfile::{TextFile, TextFileError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Result of processing a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[must_use = "FileResult should be checked for replaced/unchanged"]
pub enum FileResult {
    /// Content changed and was written (or would be, in a dry run)
    Replaced {
        file: PathBuf,
        outcomes: Vec<MatchOutcome>,
        #[serde(skip)]
        before: String,
        #[serde(skip)]
        after: String,
    },
    /// Rules ran but the encoded content is identical to the original
    Unchanged {
        file: PathBuf,
        outcomes: Vec<MatchOutcome>,
    },
}

impl FileResult {
    pub fn outcomes(&self) -> &[MatchOutcome] {
        match self {
            FileResult::Replaced { outcomes, .. } | FileResult::Unchanged { outcomes, .. } => {
                outcomes
            }
        }
    }
}

impl fmt::Display for FileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total: usize = self.outcomes().iter().map(|o| o.match_count).sum();
        match self {
            FileResult::Replaced { file, .. } => {
                write!(f, "Replaced {} match(es) in {}", total, file.display())
            }
            FileResult::Unchanged { file, .. } => {
                write!(f, "Unchanged {} ({} match(es))", file.display(), total)
            }
        }
    }
}

/// Errors that fail a single file, and with it the build
#[derive(Debug)]
pub enum ApplicationError {
    /// Target rejected by the workspace guard
    Safety(SafetyError),
    /// Reading, decoding, encoding or writing the file failed
    File(TextFileError),
    /// A rule could not be applied in this build environment
    Configuration { file: PathBuf, source: EngineError },
    /// A rule matched a different number of times than required
    MatchCountMismatch {
        file: PathBuf,
        rule_index: usize,
        pattern: String,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Safety(e) => write!(f, "unsafe target: {}", e),
            ApplicationError::File(e) => write!(f, "{}", e),
            ApplicationError::Configuration { file, source } => {
                write!(f, "configuration error in {}: {}", file.display(), source)
            }
            ApplicationError::MatchCountMismatch {
                file,
                rule_index,
                pattern,
                expected,
                actual,
            } => write!(
                f,
                "rule #{} [{}] matched {} time(s) in {}, expected {}",
                rule_index,
                pattern,
                actual,
                file.display(),
                expected
            ),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Safety(e) => Some(e),
            ApplicationError::File(e) => Some(e),
            ApplicationError::Configuration { source, .. } => Some(source),
            ApplicationError::MatchCountMismatch { .. } => None,
        }
    }
}

impl From<SafetyError> for ApplicationError {
    fn from(e: SafetyError) -> Self {
        ApplicationError::Safety(e)
    }
}

impl From<TextFileError> for ApplicationError {
    fn from(e: TextFileError) -> Self {
        ApplicationError::File(e)
    }
}

/// Knobs for a build step run
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions<'a> {
    /// Evaluate everything but never write
    pub dry_run: bool,
    /// Reject targets outside this workspace
    pub guard: Option<&'a WorkspaceGuard>,
}

/// Apply every rule set, in order, writing changed files back.
///
/// # Returns
///
/// One entry per rule set, keyed by its configured path.
pub fn apply_rule_sets(
    rule_sets: &[FileRuleSet],
    env: &Environment,
    sink: &mut dyn LogSink,
    options: ApplyOptions<'_>,
) -> Vec<(PathBuf, Result<FileResult, ApplicationError>)> {
    rule_sets
        .iter()
        .map(|rule_set| {
            let result = apply_rule_set(rule_set, env, sink, options);
            match &result {
                Ok(file_result) => tracing::info!(
                    file = %rule_set.path().display(),
                    dry_run = options.dry_run,
                    "{file_result}"
                ),
                Err(e) => tracing::error!(file = %rule_set.path().display(), "{e}"),
            }
            (rule_set.path().to_path_buf(), result)
        })
        .collect()
}

/// Evaluate every rule set without modifying any file.
///
/// Result semantics mirror [`apply_rule_sets`]; `Replaced` means "would be
/// replaced".
pub fn check_rule_sets(
    rule_sets: &[FileRuleSet],
    env: &Environment,
    sink: &mut dyn LogSink,
    guard: Option<&WorkspaceGuard>,
) -> Vec<(PathBuf, Result<FileResult, ApplicationError>)> {
    apply_rule_sets(
        rule_sets,
        env,
        sink,
        ApplyOptions {
            dry_run: true,
            guard,
        },
    )
}

/// Whether any file failed, which fails the build.
pub fn build_failed(results: &[(PathBuf, Result<FileResult, ApplicationError>)]) -> bool {
    results.iter().any(|(_, result)| result.is_err())
}

/// Process a single rule set.
///
/// The file is written only after every rule succeeded; on any error it is
/// left as it was.
pub fn apply_rule_set(
    rule_set: &FileRuleSet,
    env: &Environment,
    sink: &mut dyn LogSink,
    options: ApplyOptions<'_>,
) -> Result<FileResult, ApplicationError> {
    let target = match options.guard {
        Some(guard) => guard.validate_path(rule_set.path())?,
        None => rule_set.path().to_path_buf(),
    };

    let file = TextFile::read(&target, rule_set.encoding())?;

    let substitution = engine::apply(file.text(), rule_set, env, sink).map_err(|source| {
        ApplicationError::Configuration {
            file: rule_set.path().to_path_buf(),
            source,
        }
    })?;

    if let Some(failure) = substitution.failure() {
        return Err(ApplicationError::MatchCountMismatch {
            file: rule_set.path().to_path_buf(),
            rule_index: failure.rule_index,
            pattern: failure.pattern.clone(),
            expected: failure.expected_match_count,
            actual: failure.match_count,
        });
    }

    let encoded = file.encode(&substitution.text)?;
    if file.is_unchanged(&encoded) {
        return Ok(FileResult::Unchanged {
            file: rule_set.path().to_path_buf(),
            outcomes: substitution.outcomes,
        });
    }

    if !options.dry_run {
        let _ = file.write_encoded(&encoded)?;
    }

    Ok(FileResult::Replaced {
        file: rule_set.path().to_path_buf(),
        outcomes: substitution.outcomes,
        before: file.text().to_string(),
        after: substitution.text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::PatternRule;
    use crate::rule_set::{LineSeparator, TextEncoding};
    use std::fs;
    use std::path::Path;

    fn rule_set(path: &Path, rules: Vec<PatternRule>) -> FileRuleSet {
        FileRuleSet::new(path, TextEncoding::UTF_8, LineSeparator::Unix, rules).unwrap()
    }

    #[test]
    fn writes_replaced_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("version.txt");
        fs::write(&path, "Version=0.0.0").unwrap();

        let set = rule_set(&path, vec![PatternRule::new(r"\d+\.\d+\.\d+", "1.2.3").unwrap()]);
        let mut lines: Vec<String> = Vec::new();
        let result = apply_rule_set(&set, &Environment::new(), &mut lines, ApplyOptions::default())
            .unwrap();

        assert!(matches!(result, FileResult::Replaced { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "Version=1.2.3");
    }

    #[test]
    fn dry_run_leaves_file_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("version.txt");
        fs::write(&path, "Version=0.0.0").unwrap();

        let set = rule_set(&path, vec![PatternRule::new("0", "9").unwrap()]);
        let results = check_rule_sets(&[set], &Environment::new(), &mut Vec::new(), None);

        match &results[0].1 {
            Ok(FileResult::Replaced { after, .. }) => assert_eq!(after, "Version=9.9.9"),
            other => panic!("expected Replaced, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "Version=0.0.0");
    }

    #[test]
    fn mismatch_leaves_file_unmodified() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "a a a").unwrap();

        let set = rule_set(
            &path,
            vec![
                PatternRule::new("a", "b").unwrap(),
                PatternRule::new("b", "c").unwrap().expect_matches(2),
            ],
        );
        let err = apply_rule_set(&set, &Environment::new(), &mut Vec::new(), ApplyOptions::default())
            .unwrap_err();

        match &err {
            ApplicationError::MatchCountMismatch {
                rule_index,
                expected,
                actual,
                pattern,
                ..
            } => {
                assert_eq!(*rule_index, 1);
                assert_eq!(*expected, 2);
                assert_eq!(*actual, 3);
                assert_eq!(pattern, "b");
            }
            other => panic!("expected MatchCountMismatch, got {other:?}"),
        }
        assert!(err.to_string().contains("expected 2"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "a a a");
    }

    #[test]
    fn unchanged_when_nothing_matches() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "hello\n").unwrap();

        let set = rule_set(&path, vec![PatternRule::new("absent", "x").unwrap()]);
        let result = apply_rule_set(&set, &Environment::new(), &mut Vec::new(), ApplyOptions::default())
            .unwrap();
        assert!(matches!(result, FileResult::Unchanged { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let set = rule_set(
            &temp_dir.path().join("missing.txt"),
            vec![PatternRule::new("a", "b").unwrap()],
        );
        let err = apply_rule_set(&set, &Environment::new(), &mut Vec::new(), ApplyOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApplicationError::File(TextFileError::Read { .. })));
    }

    #[test]
    fn unresolved_variable_fails_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "a").unwrap();

        let set = rule_set(&path, vec![PatternRule::new("a", "${NOPE}").unwrap()]);
        let err = apply_rule_set(&set, &Environment::new(), &mut Vec::new(), ApplyOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Configuration { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "a");
    }

    #[test]
    fn guard_rejects_outside_targets() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("ws");
        fs::create_dir_all(&workspace).unwrap();
        let outside = temp_dir.path().join("outside.txt");
        fs::write(&outside, "a").unwrap();

        let guard = WorkspaceGuard::new(&workspace).unwrap();
        let set = rule_set(&outside, vec![PatternRule::new("a", "b").unwrap()]);
        let options = ApplyOptions {
            dry_run: false,
            guard: Some(&guard),
        };
        let err = apply_rule_set(&set, &Environment::new(), &mut Vec::new(), options).unwrap_err();

        assert!(matches!(
            err,
            ApplicationError::Safety(SafetyError::OutsideWorkspace { .. })
        ));
        assert_eq!(fs::read_to_string(&outside).unwrap(), "a");
    }

    #[test]
    fn build_fails_when_any_file_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        let good = temp_dir.path().join("good.txt");
        fs::write(&good, "x").unwrap();

        let sets = vec![
            rule_set(&temp_dir.path().join("gone.txt"), vec![PatternRule::new("x", "y").unwrap()]),
            rule_set(&good, vec![PatternRule::new("x", "y").unwrap()]),
        ];
        let results = apply_rule_sets(
            &sets,
            &Environment::new(),
            &mut Vec::new(),
            ApplyOptions::default(),
        );

        assert!(build_failed(&results));
        assert!(results[1].1.is_ok());
        assert_eq!(fs::read_to_string(&good).unwrap(), "y");
    }
}
