pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_rule_set, apply_rule_sets, build_failed, check_rule_sets, ApplicationError,
    ApplyOptions, FileResult,
};
pub use loader::{load_from_path, load_from_str, load_rule_sets, ConfigError};
pub use schema::{
    FileDefinition, Metadata, ReplaceConfig, RuleDefinition, ValidationError, ValidationIssue,
};
