use crate::cache::get_or_compile_pattern;
use crate::interpolate::{InterpolationError, Template};
use regex::Regex;
use thiserror::Error;

/// Errors raised while building a [`PatternRule`].
#[derive(Error, Debug, Clone)]
pub enum RuleError {
    #[error("search pattern is empty")]
    EmptyPattern,

    #[error("invalid search pattern [{pattern}]: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid replacement [{template}]: {source}")]
    InvalidTemplate {
        template: String,
        #[source]
        source: InterpolationError,
    },
}

/// One search/replace step.
///
/// The pattern is compiled and the replacement template parsed on
/// construction, so a rule that exists is known to be applicable.
#[derive(Debug, Clone)]
#[must_use = "PatternRule does nothing until applied by the engine"]
pub struct PatternRule {
    regex: Regex,
    template: Template,
    expected_matches: usize,
    verbose: bool,
}

impl PatternRule {
    /// Build a rule with no match-count check and logging off.
    pub fn new(search: &str, replace: &str) -> Result<Self, RuleError> {
        if search.is_empty() {
            return Err(RuleError::EmptyPattern);
        }

        let regex = get_or_compile_pattern(search).map_err(|source| RuleError::InvalidPattern {
            pattern: search.to_string(),
            source,
        })?;

        let template = Template::parse(replace, regex.captures_len() - 1).map_err(|source| {
            RuleError::InvalidTemplate {
                template: replace.to_string(),
                source,
            }
        })?;

        Ok(Self {
            regex,
            template,
            expected_matches: 0,
            verbose: false,
        })
    }

    /// Require exactly `count` matches; 0 disables the check.
    pub fn expect_matches(mut self, count: usize) -> Self {
        self.expected_matches = count;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn expected_matches(&self) -> usize {
        self.expected_matches
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Whether `count` matches satisfy this rule's expectation.
    pub fn accepts(&self, count: usize) -> bool {
        self.expected_matches == 0 || self.expected_matches == count
    }
}
