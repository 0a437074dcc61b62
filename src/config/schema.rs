use crate::guard::{CostModel, SizeLimit};
use crate::runner::CwdMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Built-in fallbacks used when neither a scope nor `[defaults]` sets a key.
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_MAX_OPERATIONS: usize = 100;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct FmtConfig {
    #[serde(default)]
    pub defaults: RuleOverrides,
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeRule>,
}

/// Per-scope settings: the formatter command plus any overrides of the
/// `[defaults]` table.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ScopeRule {
    /// Formatter argv. A scope without one is configured but disabled.
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    /// File extensions that select this scope (without the leading dot).
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(flatten)]
    pub overrides: RuleOverrides,
}

/// The overridable settings, every key optional. Resolution is per key:
/// scope value, else `[defaults]` value, else built-in.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RuleOverrides {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub merge: Option<MergeMode>,
    #[serde(default)]
    pub max_operations: Option<usize>,
    #[serde(default)]
    pub cost_model: Option<CostModel>,
    #[serde(default)]
    pub cwd_mode: Option<CwdMode>,
    #[serde(default)]
    pub on_save: Option<bool>,
}

/// How formatter output is carried into the buffer.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Diff against the current content and replay the edits.
    #[default]
    Diff,
    /// Replace the whole content outright.
    Replace,
}

/// A scope's settings after resolution against `[defaults]` and built-ins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRule {
    pub scope: String,
    pub cmd: Vec<String>,
    pub extensions: Vec<String>,
    pub timeout_ms: u64,
    pub merge: MergeMode,
    pub max_operations: usize,
    pub cost_model: CostModel,
    pub cwd_mode: CwdMode,
    pub on_save: bool,
}

impl ResolvedRule {
    /// Timeout as a duration; `timeout_ms = 0` disables the deadline.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn size_limit(&self) -> SizeLimit {
        SizeLimit {
            max: self.max_operations,
            model: self.cost_model,
        }
    }
}

impl FmtConfig {
    /// Resolve the rule for a scope, merging its overrides over the
    /// defaults.
    pub fn resolve(&self, scope: &str) -> Result<ResolvedRule, ResolveError> {
        let rule = self.scopes.get(scope).ok_or_else(|| ResolveError::UnknownScope {
            scope: scope.to_string(),
        })?;
        let cmd = match &rule.cmd {
            Some(cmd) if !cmd.is_empty() => cmd.clone(),
            _ => {
                return Err(ResolveError::MissingCommand {
                    scope: scope.to_string(),
                })
            }
        };

        let s = &rule.overrides;
        let d = &self.defaults;
        Ok(ResolvedRule {
            scope: scope.to_string(),
            cmd,
            extensions: rule.extensions.clone(),
            timeout_ms: s.timeout_ms.or(d.timeout_ms).unwrap_or(DEFAULT_TIMEOUT_MS),
            merge: s.merge.or(d.merge).unwrap_or_default(),
            max_operations: s
                .max_operations
                .or(d.max_operations)
                .unwrap_or(DEFAULT_MAX_OPERATIONS),
            cost_model: s.cost_model.or(d.cost_model).unwrap_or_default(),
            cwd_mode: s
                .cwd_mode
                .clone()
                .or_else(|| d.cwd_mode.clone())
                .unwrap_or_default(),
            on_save: s.on_save.or(d.on_save).unwrap_or(false),
        })
    }

    /// Find the scope responsible for a file, by extension.
    pub fn scope_for_path(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.scopes
            .iter()
            .find(|(_, rule)| rule.extensions.iter().any(|e| e == ext))
            .map(|(name, _)| name.as_str())
    }

    /// All scopes that have a formatter command, resolved.
    pub fn resolved_rules(&self) -> Vec<ResolvedRule> {
        self.scopes
            .keys()
            .filter_map(|scope| self.resolve(scope).ok())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for (name, rule) in &self.scopes {
            if let Some(cmd) = &rule.cmd {
                if cmd.is_empty() {
                    issues.push(ValidationIssue::EmptyCommand {
                        scope: name.clone(),
                    });
                } else if cmd[0].trim().is_empty() {
                    issues.push(ValidationIssue::EmptyCommand {
                        scope: name.clone(),
                    });
                }
            }
            for ext in &rule.extensions {
                if ext.starts_with('.') || ext.trim().is_empty() {
                    issues.push(ValidationIssue::InvalidExtension {
                        scope: name.clone(),
                        extension: ext.clone(),
                    });
                }
            }
        }

        // Each extension must select exactly one scope.
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (name, rule) in &self.scopes {
            for ext in &rule.extensions {
                if let Some(first) = seen.insert(ext.as_str(), name.as_str()) {
                    issues.push(ValidationIssue::DuplicateExtension {
                        extension: ext.clone(),
                        scopes: vec![first.to_string(), name.clone()],
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
}

/// Failure to resolve a scope into a usable rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    UnknownScope { scope: String },
    MissingCommand { scope: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::UnknownScope { scope } => {
                write!(f, "no configured scope {scope:?}")
            }
            ResolveError::MissingCommand { scope } => {
                write!(f, "missing setting \"cmd\" for scope {scope:?}")
            }
        }
    }
}

impl std::error::Error for ResolveError {}

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

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyCommand {
        scope: String,
    },
    InvalidExtension {
        scope: String,
        extension: String,
    },
    DuplicateExtension {
        extension: String,
        scopes: Vec<String>,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyCommand { scope } => {
                write!(f, "scope {scope:?} has an empty \"cmd\"")
            }
            ValidationIssue::InvalidExtension { scope, extension } => {
                write!(
                    f,
                    "scope {scope:?} lists invalid extension {extension:?} \
                     (expected a bare extension such as \"go\")"
                )
            }
            ValidationIssue::DuplicateExtension { extension, scopes } => {
                write!(
                    f,
                    "extension {extension:?} is claimed by multiple scopes: {}",
                    scopes.join(", ")
                )
            }
        }
    }
}
