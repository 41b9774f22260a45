//! Reading replacement configs and turning them into rule sets.

use crate::config::schema::{ReplaceConfig, ValidationError};
use crate::rule_set::{FileRuleSet, RuleSetError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Why a replacement config could not be used.
///
/// `origin` is the config file the problem came from, when it was loaded
/// from disk.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        origin: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Invalid {
        origin: Option<PathBuf>,
        source: ValidationError,
    },
    /// Valid TOML whose rules could not be built, e.g. a template that
    /// references a variable-length group after path resolution.
    RuleSet {
        origin: Option<PathBuf>,
        source: RuleSetError,
    },
}

impl ConfigError {
    fn located(self, path: &Path) -> Self {
        let origin = Some(path.to_path_buf());
        match self {
            ConfigError::Parse { source, .. } => ConfigError::Parse { origin, source },
            ConfigError::Invalid { source, .. } => ConfigError::Invalid { origin, source },
            ConfigError::RuleSet { source, .. } => ConfigError::RuleSet { origin, source },
            read @ ConfigError::Read { .. } => read,
        }
    }
}

struct Origin<'a>(&'a Option<PathBuf>);

impl fmt::Display for Origin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(path) => write!(f, " {}", path.display()),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read replace config {}: {}", path.display(), source)
            }
            ConfigError::Parse { origin, source } => {
                write!(f, "replace config{} is not valid TOML: {}", Origin(origin), source)
            }
            ConfigError::Invalid { origin, source } => {
                write!(
                    f,
                    "replace config{} has {} problem(s):",
                    Origin(origin),
                    source.issues.len()
                )?;
                for issue in &source.issues {
                    write!(f, "\n  - {issue}")?;
                }
                Ok(())
            }
            ConfigError::RuleSet { origin, source } => {
                write!(f, "replace config{}: {}", Origin(origin), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { source, .. } => Some(source),
            ConfigError::RuleSet { source, .. } => Some(source),
        }
    }
}

/// Parse and validate a config held in memory.
pub fn load_from_str(input: &str) -> Result<ReplaceConfig, ConfigError> {
    let config: ReplaceConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Parse { origin: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Invalid { origin: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ReplaceConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(config = %path.display(), "loading replace config");
    load_from_str(&contents).map_err(|error| error.located(path))
}

/// Load `path` and build its rule sets, resolving targets against
/// `workspace_root`.
pub fn load_rule_sets(
    path: impl AsRef<Path>,
    workspace_root: &Path,
) -> Result<Vec<FileRuleSet>, ConfigError> {
    let path = path.as_ref();
    let config = load_from_path(path)?;
    let rule_sets = config
        .rule_sets(workspace_root)
        .map_err(|source| ConfigError::RuleSet {
            origin: Some(path.to_path_buf()),
            source,
        })?;
    tracing::debug!(
        config = %path.display(),
        files = rule_sets.len(),
        "replace config ready"
    );
    Ok(rule_sets)
}
