//! Substitution engine: applies a [`FileRuleSet`] to in-memory text.
//!
//! Rules run strictly in order, each over the output of the previous one.
//! For every rule the engine scans for all non-overlapping matches
//! (leftmost-first), replaces them in a single pass, then checks the match
//! count against the rule's expectation. A count mismatch is fatal: the
//! failing rule's output is discarded and no later rule runs. Line
//! terminators are normalized once, on the final text.
//!
//! Build log lines are emitted only for verbose rules, on success and on
//! failure alike. A quiet rule produces no build log output at all.

use crate::env::Environment;
use crate::interpolate::InterpolationError;
use crate::log::LogSink;
use crate::rule::PatternRule;
use crate::rule_set::FileRuleSet;
use serde::Serialize;
use thiserror::Error;

/// Prefix shared by every build log line the engine emits.
const LOG_PREFIX: &str = "   > ";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("rule #{rule_index} [{pattern}]: {source}")]
    Interpolation {
        rule_index: usize,
        pattern: String,
        #[source]
        source: InterpolationError,
    },
}

/// What happened when one rule ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub rule_index: usize,
    pub pattern: String,
    pub match_count: usize,
    pub expected_match_count: usize,
    pub ok: bool,
    /// `(before, after)` for each match, recorded for verbose rules only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<(String, String)>,
}

/// Result of running a rule set over a text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Substitution should be checked for fatal outcomes"]
pub struct Substitution {
    /// Final text with line terminators normalized. When `fatal` is set this
    /// is the text as it stood before the failing rule.
    pub text: String,
    /// One outcome per rule that ran, in rule order.
    pub outcomes: Vec<MatchOutcome>,
    pub fatal: bool,
}

impl Substitution {
    /// The outcome that made this substitution fatal, if any.
    pub fn failure(&self) -> Option<&MatchOutcome> {
        self.outcomes.iter().find(|outcome| !outcome.ok)
    }

    pub fn total_matches(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.match_count).sum()
    }
}

/// Apply `rule_set` to `text`, writing build log lines to `sink` as they are
/// produced.
pub fn apply(
    text: &str,
    rule_set: &FileRuleSet,
    env: &Environment,
    sink: &mut dyn LogSink,
) -> Result<Substitution, EngineError> {
    let mut current = text.to_string();
    let mut outcomes = Vec::with_capacity(rule_set.rules().len());
    let mut fatal = false;

    for (rule_index, rule) in rule_set.rules().iter().enumerate() {
        let (output, outcome) = apply_rule(&current, rule_index, rule, env, sink)?;

        tracing::debug!(
            file = %rule_set.path().display(),
            rule_index,
            pattern = rule.pattern(),
            matches = outcome.match_count,
            expected = outcome.expected_match_count,
            "rule applied"
        );

        let ok = outcome.ok;
        outcomes.push(outcome);
        if !ok {
            tracing::warn!(
                file = %rule_set.path().display(),
                rule_index,
                pattern = rule.pattern(),
                "match count mismatch, skipping remaining rules"
            );
            fatal = true;
            break;
        }
        current = output;
    }

    Ok(Substitution {
        text: rule_set.line_separator().normalize(&current),
        outcomes,
        fatal,
    })
}

/// Apply `rule_set` to `text`, collecting build log lines in memory.
pub fn apply_collecting(
    text: &str,
    rule_set: &FileRuleSet,
    env: &Environment,
) -> Result<(Substitution, Vec<String>), EngineError> {
    let mut lines: Vec<String> = Vec::new();
    let substitution = apply(text, rule_set, env, &mut lines)?;
    Ok((substitution, lines))
}

fn apply_rule(
    text: &str,
    rule_index: usize,
    rule: &PatternRule,
    env: &Environment,
    sink: &mut dyn LogSink,
) -> Result<(String, MatchOutcome), EngineError> {
    let resolved = rule
        .template()
        .resolve(env)
        .map_err(|source| EngineError::Interpolation {
            rule_index,
            pattern: rule.pattern().to_string(),
            source,
        })?;

    let verbose = rule.is_verbose();
    let mut output = String::with_capacity(text.len());
    let mut replacements = Vec::new();
    let mut last = 0;
    let mut count = 0;

    for caps in rule.regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let replacement = resolved.expand(&caps);

        if verbose {
            sink.log(&format!(
                "{LOG_PREFIX}replace : [{}] => [{}]",
                whole.as_str(),
                replacement
            ));
            replacements.push((whole.as_str().to_string(), replacement.clone()));
        }

        output.push_str(&text[last..whole.start()]);
        output.push_str(&replacement);
        last = whole.end();
        count += 1;
    }
    output.push_str(&text[last..]);

    if verbose {
        sink.log(&format!(
            "{LOG_PREFIX}replace times: {count}, [{}] => [{}]",
            rule.pattern(),
            resolved.display()
        ));
    }

    let outcome = MatchOutcome {
        rule_index,
        pattern: rule.pattern().to_string(),
        match_count: count,
        expected_match_count: rule.expected_matches(),
        ok: rule.accepts(count),
        replacements,
    };
    Ok((output, outcome))
}
