//! Build environment handed to replacement templates.

use std::collections::BTreeMap;
use thiserror::Error;

/// Read-only mapping from variable name to value, supplied by the build host.
///
/// Lookups are exact and case-sensitive, matching how build servers expose
/// variables such as `BUILD_ID` or `GIT_COMMIT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

/// A `NAME=VALUE` argument that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid variable assignment '{input}': expected NAME=VALUE")]
pub struct AssignmentError {
    pub input: String,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Parse and apply a `NAME=VALUE` assignment. The value may be empty and
    /// may itself contain `=`.
    pub fn assign(&mut self, assignment: &str) -> Result<(), AssignmentError> {
        match assignment.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                self.set(name.trim(), value);
                Ok(())
            }
            _ => Err(AssignmentError {
                input: assignment.to_string(),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Closest defined variable name to `name`, if any is within a small edit
    /// distance. Used to point at likely typos in templates.
    pub fn suggest(&self, name: &str) -> Option<&str> {
        let threshold = (name.len() / 3).clamp(1, 3);
        self.names()
            .map(|candidate| (strsim::levenshtein(name, candidate), candidate))
            .filter(|(distance, _)| *distance > 0 && *distance <= threshold)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
