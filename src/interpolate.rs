//! Replacement template interpolation.
//!
//! A template mixes literal text with two kinds of placeholders:
//!
//! - `${NAME}` is looked up in the build [`Environment`]. The value is the same
//!   for every match of a rule, so it is resolved once per rule application.
//! - `$N` is a back-reference to capture group `N` of the current match.
//!
//! Interpolation is therefore two-pass: [`Template::resolve`] substitutes
//! environment values and yields a [`ResolvedTemplate`], whose
//! [`expand`](ResolvedTemplate::expand) fills in the groups of one match.
//!
//! Parsing rules:
//!
//! - `\c` is a literal `c`; a trailing lone `\` is literal.
//! - `${NAME}` needs a name made of letters, digits, `_` and `.` (not
//!   starting with a digit) directly followed by `}`. Anything else after
//!   `${`, including an unclosed brace or `${}`, leaves the `$` literal.
//! - The first digit after `$` must be 1-9. Further digits are consumed while
//!   the number stays within the pattern's group count, so with a single group
//!   `$11` is group 1 followed by a literal `1`.
//! - `$0` and a `$` followed by anything else is literal.
//!
//! Environment values are inserted verbatim and never re-scanned.

use crate::env::Environment;
use regex::Captures;
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("replacement references group ${group}, but the pattern has {available} capture group(s)")]
    UnknownGroup { group: usize, available: usize },

    #[error("environment variable '{name}' is not defined{}", suggestion_suffix(.suggestion))]
    UnresolvedVariable {
        name: String,
        suggestion: Option<String>,
    },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Group(usize),
    Variable(String),
}

/// A parsed replacement template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    /// Each segment with the byte range of the raw text it was parsed from.
    segments: Vec<(Segment, Range<usize>)>,
}

impl Template {
    /// Parse `raw` for a pattern with `group_count` capture groups
    /// (not counting the implicit whole-match group).
    pub fn parse(raw: &str, group_count: usize) -> Result<Self, InterpolationError> {
        let mut segments: Vec<(Segment, Range<usize>)> = Vec::new();
        let bytes = raw.as_bytes();
        let mut i = 0;

        while i < raw.len() {
            let start = i;
            let (segment, end) = match bytes[i] {
                b'\\' => match raw[i + 1..].chars().next() {
                    Some(c) => (Segment::Literal(c.to_string()), i + 1 + c.len_utf8()),
                    None => (Segment::Literal("\\".to_string()), i + 1),
                },
                b'$' => parse_dollar(raw, i, group_count)?,
                _ => {
                    let next = raw[i..]
                        .find(['\\', '$'])
                        .map_or(raw.len(), |offset| i + offset);
                    (Segment::Literal(raw[i..next].to_string()), next)
                }
            };
            push_segment(&mut segments, segment, start..end);
            i = end;
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of all environment placeholders, in template order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|(segment, _)| match segment {
            Segment::Variable(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Resolve every environment placeholder against `env`.
    ///
    /// Fails on the first placeholder that is not defined.
    pub fn resolve(&self, env: &Environment) -> Result<ResolvedTemplate, InterpolationError> {
        let mut display = String::with_capacity(self.raw.len());
        let mut parts: Vec<Part> = Vec::with_capacity(self.segments.len());

        for (segment, range) in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    display.push_str(&self.raw[range.clone()]);
                    push_text(&mut parts, text);
                }
                Segment::Group(n) => {
                    display.push_str(&self.raw[range.clone()]);
                    parts.push(Part::Group(*n));
                }
                Segment::Variable(name) => {
                    let value =
                        env.get(name)
                            .ok_or_else(|| InterpolationError::UnresolvedVariable {
                                name: name.clone(),
                                suggestion: env.suggest(name).map(str::to_string),
                            })?;
                    display.push_str(value);
                    push_text(&mut parts, value);
                }
            }
        }

        Ok(ResolvedTemplate { display, parts })
    }
}

fn parse_dollar(
    raw: &str,
    at: usize,
    group_count: usize,
) -> Result<(Segment, usize), InterpolationError> {
    let bytes = raw.as_bytes();
    let literal = (Segment::Literal("$".to_string()), at + 1);

    match bytes.get(at + 1) {
        Some(b'{') => {
            let name_start = at + 2;
            let len = variable_name_len(&raw[name_start..]);
            if len > 0 && bytes.get(name_start + len) == Some(&b'}') {
                Ok((
                    Segment::Variable(raw[name_start..name_start + len].to_string()),
                    name_start + len + 1,
                ))
            } else {
                Ok(literal)
            }
        }
        Some(d @ b'1'..=b'9') => {
            let mut group = usize::from(d - b'0');
            if group > group_count {
                return Err(InterpolationError::UnknownGroup {
                    group,
                    available: group_count,
                });
            }
            let mut end = at + 2;
            while let Some(d @ b'0'..=b'9') = bytes.get(end) {
                let candidate = group * 10 + usize::from(d - b'0');
                if candidate > group_count {
                    break;
                }
                group = candidate;
                end += 1;
            }
            Ok((Segment::Group(group), end))
        }
        _ => Ok(literal),
    }
}

/// Length of the `[A-Za-z_][A-Za-z0-9_.]*` name at the start of `text`.
fn variable_name_len(text: &str) -> usize {
    let mut chars = text.bytes();
    match chars.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return 0,
    }
    1 + chars
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'.')
        .count()
}

fn push_segment(segments: &mut Vec<(Segment, Range<usize>)>, segment: Segment, range: Range<usize>) {
    if let (Segment::Literal(text), Some((Segment::Literal(prev), prev_range))) =
        (&segment, segments.last_mut())
    {
        prev.push_str(text);
        prev_range.end = range.end;
        return;
    }
    segments.push((segment, range));
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Group(usize),
}

fn push_text(parts: &mut Vec<Part>, text: &str) {
    if let Some(Part::Text(prev)) = parts.last_mut() {
        prev.push_str(text);
    } else {
        parts.push(Part::Text(text.to_string()));
    }
}

/// A template with environment placeholders already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    display: String,
    parts: Vec<Part>,
}

impl ResolvedTemplate {
    /// The raw template with environment values substituted and everything
    /// else (back-references, escapes) left as written.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Build the replacement for one match.
    pub fn expand(&self, caps: &Captures<'_>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Group(n) => {
                    if let Some(m) = caps.get(*n) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
        out
    }
}
