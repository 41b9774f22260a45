//! A target file bound to the rules applied to it.

use crate::rule::{PatternRule, RuleError};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RuleSetError {
    #[error("no replacement rules configured for {0}")]
    EmptyRules(PathBuf),

    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("rule #{index} for {file}: {source}")]
    Rule {
        file: PathBuf,
        index: usize,
        #[source]
        source: RuleError,
    },
}

/// Line terminator written back to the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSeparator {
    /// `\n`
    #[default]
    #[serde(alias = "Unix", alias = "UNIX", alias = "lf")]
    Unix,
    /// `\r\n`
    #[serde(alias = "Windows", alias = "WINDOWS", alias = "crlf")]
    Windows,
    /// `\r`
    #[serde(alias = "Mac", alias = "MAC", alias = "cr")]
    Mac,
    /// Platform default of the running binary.
    #[serde(alias = "System", alias = "SYSTEM", alias = "system-default")]
    System,
}

impl LineSeparator {
    pub fn as_str(self) -> &'static str {
        match self {
            LineSeparator::Unix => "\n",
            LineSeparator::Windows => "\r\n",
            LineSeparator::Mac => "\r",
            LineSeparator::System => {
                if cfg!(windows) {
                    "\r\n"
                } else {
                    "\n"
                }
            }
        }
    }

    /// Rewrite every `\r\n`, `\r` and `\n` in `text` to this separator.
    pub fn normalize(self, text: &str) -> String {
        let sep = self.as_str();
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(pos) = rest.find(['\r', '\n']) {
            out.push_str(&rest[..pos]);
            out.push_str(sep);
            let skip = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
            rest = &rest[pos + skip..];
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for LineSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineSeparator::Unix => "Unix",
            LineSeparator::Windows => "Windows",
            LineSeparator::Mac => "Mac",
            LineSeparator::System => "System",
        };
        f.write_str(name)
    }
}

/// Character encoding used to read and write a target file.
///
/// Labels follow Java charset names where they differ from the WHATWG
/// mapping: `ISO-8859-1` and `US-ASCII` are the strict charsets rather than
/// windows-1252, and `UTF-16` picks its byte order from the BOM.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding(Charset);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Charset {
    Utf8,
    /// Byte order from the BOM, big-endian without one.
    Utf16,
    /// Every byte is the code point of the same value.
    Latin1,
    /// 7-bit only.
    Ascii,
    Other(&'static Encoding),
}

impl TextEncoding {
    pub const UTF_8: TextEncoding = TextEncoding(Charset::Utf8);

    /// Look up an encoding by label (`UTF-8`, `ISO-8859-1`, `UTF-16`,
    /// `windows-1252`, `Shift_JIS`, ...). Labels are case-insensitive.
    pub fn for_label(label: &str) -> Result<Self, RuleSetError> {
        let label = label.trim();
        let charset = match label.to_ascii_uppercase().replace('_', "-").as_str() {
            "UTF-16" | "UTF16" | "UNICODE" => Charset::Utf16,
            "ISO-8859-1" | "ISO8859-1" | "ISO-LATIN-1" | "LATIN1" | "L1" | "8859-1"
            | "CP819" | "IBM819" | "ISO-IR-100" => Charset::Latin1,
            "US-ASCII" | "ASCII" | "ISO646-US" | "ASCII7" | "646" => Charset::Ascii,
            _ => {
                return Encoding::for_label(label.as_bytes())
                    .map(Self::from_encoding)
                    .ok_or_else(|| RuleSetError::UnknownEncoding(label.to_string()))
            }
        };
        Ok(TextEncoding(charset))
    }

    pub(crate) fn from_encoding(encoding: &'static Encoding) -> Self {
        if encoding == encoding_rs::UTF_8 {
            Self::UTF_8
        } else {
            TextEncoding(Charset::Other(encoding))
        }
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16 => "UTF-16",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Ascii => "US-ASCII",
            Charset::Other(encoding) => encoding.name(),
        }
    }

    pub(crate) fn charset(&self) -> Charset {
        self.0
    }
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::UTF_8
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextEncoding({})", self.name())
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file target with its ordered, non-empty list of rules.
///
/// Rule `i + 1` operates on the output of rule `i`.
#[derive(Debug, Clone)]
pub struct FileRuleSet {
    path: PathBuf,
    encoding: TextEncoding,
    line_separator: LineSeparator,
    rules: Vec<PatternRule>,
}

impl FileRuleSet {
    pub fn new(
        path: impl Into<PathBuf>,
        encoding: TextEncoding,
        line_separator: LineSeparator,
        rules: Vec<PatternRule>,
    ) -> Result<Self, RuleSetError> {
        let path = path.into();
        if rules.is_empty() {
            return Err(RuleSetError::EmptyRules(path));
        }
        Ok(Self {
            path,
            encoding,
            line_separator,
            rules,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn line_separator(&self) -> LineSeparator {
        self.line_separator
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }
}
