use crate::cache::get_or_compile_pattern;
use crate::interpolate::Template;
use crate::rule::PatternRule;
use crate::rule_set::{FileRuleSet, LineSeparator, RuleSetError, TextEncoding};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ReplaceConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub files: Vec<FileDefinition>,
}

impl ReplaceConfig {
    /// Check the configuration without touching any file.
    ///
    /// Every problem is collected so a single run reports all of them.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.files.is_empty() {
            issues.push(ValidationIssue::EmptyFileList);
        }

        for file in &self.files {
            if file.path.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    file: None,
                    rule: None,
                    field: "path",
                });
            }
            let file_id = Some(file.path.clone()).filter(|p| !p.trim().is_empty());

            if TextEncoding::for_label(&file.encoding).is_err() {
                issues.push(ValidationIssue::UnknownEncoding {
                    file: file_id.clone(),
                    encoding: file.encoding.clone(),
                });
            }

            if file.rules.is_empty() {
                issues.push(ValidationIssue::EmptyRuleList {
                    file: file_id.clone(),
                });
            }

            for (index, rule) in file.rules.iter().enumerate() {
                if rule.search.is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        file: file_id.clone(),
                        rule: Some(index),
                        field: "search",
                    });
                    continue;
                }

                let regex = match get_or_compile_pattern(&rule.search) {
                    Ok(regex) => regex,
                    Err(e) => {
                        issues.push(ValidationIssue::InvalidPattern {
                            file: file_id.clone(),
                            rule: index,
                            message: e.to_string(),
                        });
                        continue;
                    }
                };

                if let Err(e) = Template::parse(&rule.replace, regex.captures_len() - 1) {
                    issues.push(ValidationIssue::InvalidReplacement {
                        file: file_id.clone(),
                        rule: index,
                        message: e.to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Resolve the file entries into rule sets, in declared order.
    ///
    /// Relative paths are joined to `workspace_root` when
    /// `meta.workspace_relative` is set and left as given otherwise.
    pub fn rule_sets(&self, workspace_root: &Path) -> Result<Vec<FileRuleSet>, RuleSetError> {
        self.files
            .iter()
            .map(|file| file.to_rule_set(self.resolve_path(workspace_root, &file.path)))
            .collect()
    }

    pub fn resolve_path(&self, workspace_root: &Path, file: &str) -> PathBuf {
        let path = PathBuf::from(file);
        if self.meta.workspace_relative && path.is_relative() {
            workspace_root.join(path)
        } else {
            path
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workspace_relative: bool,
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

/// One `[[files]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct FileDefinition {
    pub path: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub line_separator: LineSeparator,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl FileDefinition {
    fn to_rule_set(&self, path: PathBuf) -> Result<FileRuleSet, RuleSetError> {
        let encoding = TextEncoding::for_label(&self.encoding)?;
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                rule.to_rule().map_err(|source| RuleSetError::Rule {
                    file: path.clone(),
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        FileRuleSet::new(path, encoding, self.line_separator, rules)
    }
}

/// One `[[files.rules]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct RuleDefinition {
    pub search: String,
    #[serde(default)]
    pub replace: String,
    /// Exact number of matches required; 0 disables the check.
    #[serde(default)]
    pub match_count: usize,
    #[serde(default)]
    pub verbose: bool,
}

impl RuleDefinition {
    fn to_rule(&self) -> Result<PatternRule, crate::rule::RuleError> {
        Ok(PatternRule::new(&self.search, &self.replace)?
            .expect_matches(self.match_count)
            .verbose(self.verbose))
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyFileList,
    EmptyRuleList {
        file: Option<String>,
    },
    MissingField {
        file: Option<String>,
        rule: Option<usize>,
        field: &'static str,
    },
    UnknownEncoding {
        file: Option<String>,
        encoding: String,
    },
    InvalidPattern {
        file: Option<String>,
        rule: usize,
        message: String,
    },
    InvalidReplacement {
        file: Option<String>,
        rule: usize,
        message: String,
    },
}

struct Location<'a>(&'a Option<String>, Option<usize>);

impl fmt::Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(file) => write!(f, "file '{file}'")?,
            None => write!(f, "file entry")?,
        }
        if let Some(rule) = self.1 {
            write!(f, " rule #{rule}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyFileList => write!(f, "replace config contains no files"),
            ValidationIssue::EmptyRuleList { file } => {
                write!(f, "{} has no rules", Location(file, None))
            }
            ValidationIssue::MissingField { file, rule, field } => {
                write!(
                    f,
                    "{} missing required field '{field}'",
                    Location(file, *rule)
                )
            }
            ValidationIssue::UnknownEncoding { file, encoding } => {
                write!(
                    f,
                    "{} uses unknown encoding '{encoding}'",
                    Location(file, None)
                )
            }
            ValidationIssue::InvalidPattern {
                file,
                rule,
                message,
            } => write!(
                f,
                "{} has an invalid search pattern: {message}",
                Location(file, Some(*rule))
            ),
            ValidationIssue::InvalidReplacement {
                file,
                rule,
                message,
            } => write!(
                f,
                "{} has an invalid replacement: {message}",
                Location(file, Some(*rule))
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, rules: Vec<RuleDefinition>) -> FileDefinition {
        FileDefinition {
            path: path.to_string(),
            encoding: default_encoding(),
            line_separator: LineSeparator::Unix,
            rules,
        }
    }

    fn rule(search: &str, replace: &str) -> RuleDefinition {
        RuleDefinition {
            search: search.to_string(),
            replace: replace.to_string(),
            match_count: 0,
            verbose: false,
        }
    }

    #[test]
    fn empty_config_is_invalid() {
        let err = ReplaceConfig::default().validate().unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue::EmptyFileList]);
    }

    #[test]
    fn collects_every_issue() {
        let mut bad_encoding = file("b.txt", vec![rule("x", "y")]);
        bad_encoding.encoding = "nope".into();

        let config = ReplaceConfig {
            meta: Metadata::default(),
            files: vec![
                file("a.txt", Vec::new()),
                bad_encoding,
                file("c.txt", vec![rule("", "y"), rule("(", "y"), rule("(a)", "$3")]),
            ],
        };

        let err = config.validate().unwrap_err();
        assert_eq!(err.issues.len(), 5);
        assert!(matches!(err.issues[0], ValidationIssue::EmptyRuleList { .. }));
        assert!(matches!(err.issues[1], ValidationIssue::UnknownEncoding { .. }));
        assert!(matches!(
            err.issues[2],
            ValidationIssue::MissingField { field: "search", rule: Some(0), .. }
        ));
        assert!(matches!(err.issues[3], ValidationIssue::InvalidPattern { rule: 1, .. }));
        assert!(matches!(
            err.issues[4],
            ValidationIssue::InvalidReplacement { rule: 2, .. }
        ));
    }

    #[test]
    fn issue_messages_name_the_location() {
        let issue = ValidationIssue::InvalidPattern {
            file: Some("chart.yaml".into()),
            rule: 2,
            message: "boom".into(),
        };
        assert_eq!(
            issue.to_string(),
            "file 'chart.yaml' rule #2 has an invalid search pattern: boom"
        );
    }

    #[test]
    fn relative_paths_join_workspace_when_requested() {
        let mut config = ReplaceConfig {
            meta: Metadata::default(),
            files: vec![file("chart/Chart.yaml", vec![rule("a", "b")])],
        };
        let root = Path::new("/work");

        let sets = config.rule_sets(root).unwrap();
        assert_eq!(sets[0].path(), Path::new("chart/Chart.yaml"));

        config.meta.workspace_relative = true;
        let sets = config.rule_sets(root).unwrap();
        assert_eq!(sets[0].path(), Path::new("/work/chart/Chart.yaml"));
    }

    #[test]
    fn rule_sets_carry_rule_options() {
        let mut r = rule(r"v\d+", "v2");
        r.match_count = 3;
        r.verbose = true;
        let config = ReplaceConfig {
            meta: Metadata::default(),
            files: vec![file("/abs/file.txt", vec![r])],
        };

        let sets = config.rule_sets(Path::new("/ignored")).unwrap();
        let built = &sets[0].rules()[0];
        assert_eq!(built.expected_matches(), 3);
        assert!(built.is_verbose());
        assert_eq!(sets[0].path(), Path::new("/abs/file.txt"));
    }

    #[test]
    fn rule_set_errors_carry_rule_index() {
        let config = ReplaceConfig {
            meta: Metadata::default(),
            files: vec![file("/f.txt", vec![rule("ok", "x"), rule("(", "x")])],
        };
        let err = config.rule_sets(Path::new("/")).unwrap_err();
        assert!(matches!(err, RuleSetError::Rule { index: 1, .. }));
    }
}
