//! Content Replace: validated regex search/replace as a build step
//!
//! Rewrites text files in place by applying an ordered list of regular
//! expression rules to each one. Every rule can require an exact number of
//! matches, so a build fails loudly when a file no longer looks the way the
//! rules expect instead of silently shipping a half-updated artifact.
//!
//! # Architecture
//!
//! - [`PatternRule`] is one compiled search pattern plus a replacement
//!   [`Template`] (capture-group back-references and `${NAME}` build
//!   variables).
//! - [`FileRuleSet`] binds a target file to its rules, encoding and
//!   line-ending policy.
//! - [`engine::apply`] runs a rule set over in-memory text and reports a
//!   [`MatchOutcome`] per rule. It never touches the filesystem.
//! - [`config`] loads rule sets from TOML and applies them to files on disk.
//!
//! # Safety
//!
//! - A file is written only after every one of its rules succeeded
//! - Atomic file writes (tempfile + fsync + rename)
//! - Concurrent modification detection between read and write
//! - Optional workspace boundary enforcement
//!
//! # Example
//!
//! ```
//! use content_replace::{engine, Environment, FileRuleSet, LineSeparator, PatternRule, TextEncoding};
//!
//! let rule = PatternRule::new(r"(Version=)\d+\.\d+\.\d+", "$11.0.${BUILD_ID}")
//!     .unwrap()
//!     .expect_matches(1);
//! let rule_set = FileRuleSet::new(
//!     "version.properties",
//!     TextEncoding::UTF_8,
//!     LineSeparator::Unix,
//!     vec![rule],
//! )
//! .unwrap();
//! let env = Environment::new().with("BUILD_ID", "42");
//!
//! let (result, _log) = engine::apply_collecting("Version=0.0.0", &rule_set, &env).unwrap();
//! assert_eq!(result.text, "Version=1.0.42");
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod env;
pub mod interpolate;
pub mod log;
pub mod rule;
pub mod rule_set;
pub mod safety;
pub mod textfile;

// Re-exports
pub use config::{
    apply_rule_sets, build_failed, check_rule_sets, load_from_path, load_from_str, load_rule_sets,
    ApplicationError, ApplyOptions, ConfigError, FileResult, ReplaceConfig,
};
pub use engine::{EngineError, MatchOutcome, Substitution};
pub use env::Environment;
pub use interpolate::{InterpolationError, ResolvedTemplate, Template};
pub use log::{init_tracing, LogSink, NullSink, StdoutSink};
pub use rule::{PatternRule, RuleError};
pub use rule_set::{FileRuleSet, LineSeparator, RuleSetError, TextEncoding};
pub use safety::{SafetyError, WorkspaceGuard};
pub use textfile::{TextFile, TextFileError, WriteResult};
