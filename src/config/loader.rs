use crate::config::schema::{FmtConfig, ValidationError};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up when no config path is given.
pub const CONFIG_FILE_NAME: &str = "fmt-merge.toml";
/// Environment variable overriding config discovery.
pub const CONFIG_ENV_VAR: &str = "FMT_MERGE_CONFIG";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<FmtConfig, ConfigError> {
    let config: FmtConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<FmtConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Locate the config file to load.
///
/// Priority order:
/// 1. Explicit path (typically a `--config` flag).
/// 2. `FMT_MERGE_CONFIG` environment variable, when the path exists.
/// 3. `fmt-merge.toml` in the current directory or any ancestor.
/// 4. `~/.config/fmt-merge/fmt-merge.toml`.
pub fn find_config_file(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }

    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(found) = env::current_dir().ok().and_then(|cwd| find_in_ancestors(&cwd)) {
        return Some(found);
    }

    user_config_file().filter(|path| path.exists())
}

/// Walk `start` and its ancestors looking for `fmt-merge.toml`.
pub fn find_in_ancestors(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// The user-level config location, independent of whether it exists.
pub fn user_config_file() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".config").join("fmt-merge").join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_str_minimal() {
        let config = load_from_str(
            r#"
[scopes."source.go"]
cmd = ["gofmt"]
extensions = ["go"]
"#,
        )
        .unwrap();
        assert_eq!(config.scopes.len(), 1);
    }

    #[test]
    fn test_load_from_str_rejects_bad_toml() {
        let err = load_from_str("[scopes").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let err = load_from_path("/definitely/not/here/fmt-merge.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_path_annotates_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "not = [valid").unwrap();

        let err = load_from_path(&path).unwrap_err();
        match err {
            ConfigError::Toml { path: Some(p), .. } => assert_eq!(p, path),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_find_in_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "").unwrap();

        assert_eq!(find_in_ancestors(&nested), Some(config_path));
    }

    #[test]
    fn test_find_in_ancestors_none() {
        let dir = tempfile::tempdir().unwrap();
        // No config anywhere under the temp root; the walk may still find
        // one above it, so probe a directory we fully control.
        let nested = dir.path().join("x");
        fs::create_dir_all(&nested).unwrap();
        let found = find_in_ancestors(&nested);
        if let Some(found) = &found {
            assert!(!found.starts_with(dir.path()));
        }
    }
}
