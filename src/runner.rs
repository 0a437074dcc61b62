//! External formatter invocation.
//!
//! A formatter is an argv vector, never a shell string: the first element
//! is the program, the rest are arguments. The buffer travels over stdin
//! and the formatted result comes back on stdout. Policy follows the
//! strictest interpretation of formatter behavior: a non-zero exit is an
//! error carrying whatever the process said, and a zero exit that still
//! wrote to stderr is also an error, since half-formatted output with a
//! warning is not something to merge silently.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Poll interval while waiting on a child with a deadline.
const WAIT_POLL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("formatter command is empty")]
    EmptyCommand,

    #[error("failed to spawn formatter {program:?}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("formatter I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("formatter {program:?} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("formatter {program:?} exited with {status}{detail}")]
    NonZeroExit {
        program: String,
        status: ExitStatus,
        detail: String,
    },

    #[error("formatter {program:?} wrote to stderr:\n{stderr}")]
    Stderr { program: String, stderr: String },

    #[error("formatter output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Pipe `input` through the formatter described by `cmd` and return its
/// stdout.
///
/// `cwd` sets the child's working directory (see [`CwdMode`]). When
/// `timeout` elapses before the child exits, it is killed and
/// [`RunnerError::Timeout`] is reported.
pub fn run_formatter(
    cmd: &[String],
    input: &str,
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<String, RunnerError> {
    let (program, args) = cmd.split_first().ok_or(RunnerError::EmptyCommand)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Feed stdin from a separate thread so a formatter that emits output
    // before draining its input cannot deadlock the pipes. A formatter may
    // also exit without reading everything; the resulting broken pipe is
    // not an error.
    let stdin = child.stdin.take();
    let payload = input.as_bytes().to_vec();
    let writer = thread::spawn(move || {
        if let Some(mut stdin) = stdin {
            let _ = stdin.write_all(&payload);
        }
    });

    let stdout_reader = spawn_stdout_reader(child.stdout.take());
    let stderr_reader = spawn_stderr_reader(child.stderr.take());

    let status = match timeout {
        Some(limit) => wait_with_deadline(&mut child, limit).map_err(|err| match err {
            WaitError::Expired => RunnerError::Timeout {
                program: program.clone(),
                timeout: limit,
            },
            WaitError::Io(source) => RunnerError::Io(source),
        })?,
        None => child.wait()?,
    };

    let _ = writer.join();
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr_bytes = stderr_reader.join().unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

    if !status.success() {
        let stdout_text = String::from_utf8_lossy(&stdout);
        let detail = if !stderr.is_empty() {
            format!(":\n{stderr}")
        } else if !stdout_text.is_empty() {
            format!(":\n{stdout_text}")
        } else {
            String::new()
        };
        return Err(RunnerError::NonZeroExit {
            program: program.clone(),
            status,
            detail,
        });
    }

    if !stderr.is_empty() {
        return Err(RunnerError::Stderr {
            program: program.clone(),
            stderr,
        });
    }

    Ok(String::from_utf8(stdout)?)
}

fn spawn_stdout_reader(stdout: Option<ChildStdout>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stdout) = stdout {
            let _ = stdout.read_to_end(&mut buf);
        }
        buf
    })
}

fn spawn_stderr_reader(stderr: Option<ChildStderr>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf);
        }
        buf
    })
}

enum WaitError {
    Expired,
    Io(std::io::Error),
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> Result<ExitStatus, WaitError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(source) => return Err(WaitError::Io(source)),
        }
        if start.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WaitError::Expired);
        }
        thread::sleep(WAIT_POLL);
    }
}

/// Working-directory inference for the spawned formatter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CwdMode {
    /// Directory of the file being formatted, falling back to the project
    /// root.
    #[default]
    Auto,
    /// Always the project root.
    ProjectRoot,
    /// Inherit the parent's working directory.
    None,
    /// A fixed directory, written as `":<path>"` in configuration.
    Explicit(PathBuf),
}

impl CwdMode {
    /// Parse the configuration spelling; `None` for unknown values.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(path) = raw.strip_prefix(':') {
            return Some(CwdMode::Explicit(PathBuf::from(path)));
        }
        match raw {
            "auto" => Some(CwdMode::Auto),
            "project_root" => Some(CwdMode::ProjectRoot),
            "none" => Some(CwdMode::None),
            _ => Option::None,
        }
    }

    /// Pick the formatter's working directory for a given file and project
    /// root.
    pub fn resolve(&self, file: Option<&Path>, project_root: Option<&Path>) -> Option<PathBuf> {
        match self {
            CwdMode::Auto => file
                .and_then(Path::parent)
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .or_else(|| project_root.map(Path::to_path_buf)),
            CwdMode::ProjectRoot => project_root.map(Path::to_path_buf),
            CwdMode::None => Option::None,
            CwdMode::Explicit(path) => Some(path.clone()),
        }
    }
}

impl fmt::Display for CwdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CwdMode::Auto => write!(f, "auto"),
            CwdMode::ProjectRoot => write!(f, "project_root"),
            CwdMode::None => write!(f, "none"),
            CwdMode::Explicit(path) => write!(f, ":{}", path.display()),
        }
    }
}

impl Serialize for CwdMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CwdMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CwdMode::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown cwd_mode {raw:?} (expected \"auto\", \"project_root\", \"none\", or \":<path>\")"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_rejected() {
        let result = run_formatter(&[], "input", Option::None, Option::None);
        assert!(matches!(result, Err(RunnerError::EmptyCommand)));
    }

    #[test]
    fn test_spawn_failure_reported() {
        let cmd = vec!["definitely-not-a-real-formatter-binary".to_string()];
        let result = run_formatter(&cmd, "input", Option::None, Option::None);
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_identity_formatter() {
        let cmd = vec!["cat".to_string()];
        let out = run_formatter(&cmd, "unchanged\n", Option::None, Option::None).unwrap();
        assert_eq!(out, "unchanged\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_formatter_rewrites_input() {
        let cmd = vec!["tr".to_string(), "a-z".to_string(), "A-Z".to_string()];
        let out = run_formatter(&cmd, "shout\n", Option::None, Option::None).unwrap();
        assert_eq!(out, "SHOUT\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo broken >&2; exit 3".to_string(),
        ];
        let err = run_formatter(&cmd, "", Option::None, Option::None).unwrap_err();
        match err {
            RunnerError::NonZeroExit { detail, .. } => assert!(detail.contains("broken")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_zero_exit_with_stderr_is_error() {
        let cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat; echo grumble >&2".to_string(),
        ];
        let err = run_formatter(&cmd, "text", Option::None, Option::None).unwrap_err();
        assert!(matches!(err, RunnerError::Stderr { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let cmd = vec!["sleep".to_string(), "30".to_string()];
        let started = Instant::now();
        let err = run_formatter(
            &cmd,
            "",
            Option::None,
            Some(Duration::from_millis(100)),
        )
        .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_cwd_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = vec!["pwd".to_string()];
        let out = run_formatter(&cmd, "", Some(dir.path()), Option::None).unwrap();
        let reported = PathBuf::from(out.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_cwd_mode_parse() {
        assert_eq!(CwdMode::parse("auto"), Some(CwdMode::Auto));
        assert_eq!(CwdMode::parse("project_root"), Some(CwdMode::ProjectRoot));
        assert_eq!(CwdMode::parse("none"), Some(CwdMode::None));
        assert_eq!(
            CwdMode::parse(":/opt/tools"),
            Some(CwdMode::Explicit(PathBuf::from("/opt/tools")))
        );
        assert_eq!(CwdMode::parse("sideways"), Option::None);
    }

    #[test]
    fn test_cwd_mode_resolve() {
        let file = Path::new("/work/src/main.go");
        let root = Path::new("/work");

        assert_eq!(
            CwdMode::Auto.resolve(Some(file), Some(root)),
            Some(PathBuf::from("/work/src"))
        );
        assert_eq!(
            CwdMode::Auto.resolve(Option::None, Some(root)),
            Some(PathBuf::from("/work"))
        );
        assert_eq!(
            CwdMode::ProjectRoot.resolve(Some(file), Some(root)),
            Some(PathBuf::from("/work"))
        );
        assert_eq!(CwdMode::None.resolve(Some(file), Some(root)), Option::None);
        assert_eq!(
            CwdMode::Explicit(PathBuf::from("/elsewhere")).resolve(Some(file), Some(root)),
            Some(PathBuf::from("/elsewhere"))
        );
    }

    #[test]
    fn test_cwd_mode_display_round_trip() {
        for mode in [
            CwdMode::Auto,
            CwdMode::ProjectRoot,
            CwdMode::None,
            CwdMode::Explicit(PathBuf::from("/x/y")),
        ] {
            assert_eq!(CwdMode::parse(&mode.to_string()), Some(mode));
        }
    }
}
