pub mod loader;
pub mod schema;

pub use loader::{
    find_config_file, find_in_ancestors, load_from_path, load_from_str, user_config_file,
    ConfigError, CONFIG_ENV_VAR, CONFIG_FILE_NAME,
};
pub use schema::{
    FmtConfig, MergeMode, ResolveError, ResolvedRule, RuleOverrides, ScopeRule, ValidationError,
    ValidationIssue,
};
