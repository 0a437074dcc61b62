use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use fmt_merge::config::{
    find_config_file, load_from_path, user_config_file, FmtConfig, MergeMode, CONFIG_ENV_VAR,
    CONFIG_FILE_NAME,
};
use fmt_merge::merge::{merge, MergeOutcome};
use fmt_merge::runner::run_formatter;
use fmt_merge::TextBuffer;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "fmt-merge")]
#[command(about = "Runs external code formatters and merges their output as minimal edits", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file (discovered when not specified)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Format files or directories in place
    Format {
        /// Files or directories to format
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Force a scope instead of inferring one per file extension
        #[arg(short, long)]
        scope: Option<String>,

        /// Report files that would change without writing them
        #[arg(short = 'n', long)]
        check: bool,

        /// Show a unified diff of each pending change
        #[arg(short, long)]
        diff: bool,
    },

    /// Read stdin, write the formatted result to stdout
    Pipe {
        /// Scope whose formatter should run
        #[arg(short, long)]
        scope: String,
    },

    /// List configured scopes and their resolved rules
    Scopes {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = resolve_config(cli.config)?;

    match cli.command {
        Commands::Format {
            paths,
            scope,
            check,
            diff,
        } => cmd_format(&config, config_path.as_deref(), paths, scope, check, diff),

        Commands::Pipe { scope } => cmd_pipe(&config, config_path.as_deref(), &scope),

        Commands::Scopes { json } => cmd_scopes(&config, json),
    }
}

/// Locate and load the config file.
///
/// Priority order:
/// 1. Explicit --config flag
/// 2. FMT_MERGE_CONFIG environment variable
/// 3. fmt-merge.toml in the current directory or an ancestor
/// 4. ~/.config/fmt-merge/fmt-merge.toml
fn resolve_config(explicit: Option<PathBuf>) -> Result<(FmtConfig, Option<PathBuf>)> {
    if explicit.is_none() {
        if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
            if !Path::new(&env_path).exists() {
                eprintln!(
                    "{}",
                    format!(
                        "Warning: {} is set but path doesn't exist: {}",
                        CONFIG_ENV_VAR, env_path
                    )
                    .yellow()
                );
            }
        }
    }

    let Some(path) = find_config_file(explicit) else {
        anyhow::bail!(
            "{}\n{}\n  {}\n  {}\n  {}",
            "Could not find a fmt-merge config.".red(),
            "Try one of:".bold(),
            format!("1. Create {} in your project root", CONFIG_FILE_NAME),
            "2. Specify explicitly: fmt-merge format --config /path/to/fmt-merge.toml <files>",
            format!("3. Set environment variable: export {}=/path/to/fmt-merge.toml", CONFIG_ENV_VAR),
        )
    };

    let config = load_from_path(&path)?;
    Ok((config, Some(path)))
}

/// Project root used for working-directory inference: the directory holding
/// the project config, or the current directory when running off the
/// user-level config.
fn project_root(config_path: Option<&Path>) -> Option<PathBuf> {
    let user_level = user_config_file();
    match config_path {
        Some(path) if user_level.as_deref() != Some(path) => {
            path.parent().map(Path::to_path_buf)
        }
        _ => env::current_dir().ok(),
    }
}

/// Per-file result, for reporting.
enum FileOutcome {
    Formatted(String),
    WouldChange,
    Unchanged,
}

fn cmd_format(
    config: &FmtConfig,
    config_path: Option<&Path>,
    paths: Vec<PathBuf>,
    scope: Option<String>,
    check: bool,
    show_diff: bool,
) -> Result<()> {
    let root = project_root(config_path);

    // 1. Expand directories into formattable files
    let files = collect_files(config, &paths, scope.as_deref())?;
    if files.is_empty() {
        println!("{}", "No formattable files found".yellow());
        return Ok(());
    }

    // 2. Format each file, collecting counts for the summary
    let mut formatted = 0;
    let mut unchanged = 0;
    let mut needs_format = 0;
    let mut failed = 0;

    for file in &files {
        match format_file(config, file, scope.as_deref(), root.as_deref(), check, show_diff) {
            Ok(FileOutcome::Formatted(detail)) => {
                println!("{} {}: {}", "✓".green(), file.display(), detail);
                formatted += 1;
            }
            Ok(FileOutcome::Unchanged) => {
                println!("{} {}: already formatted", "⊙".yellow(), file.display());
                unchanged += 1;
            }
            Ok(FileOutcome::WouldChange) => {
                println!("{} {}: needs formatting", "✗".red(), file.display());
                needs_format += 1;
            }
            Err(e) => {
                eprintln!("{} {}: {:#}", "✗".red(), file.display(), e);
                failed += 1;
            }
        }
    }

    // 3. Summary
    println!();
    println!("{}", "Summary:".bold());
    println!("  {} formatted", format!("{}", formatted).green());
    println!("  {} already formatted", format!("{}", unchanged).yellow());
    if check {
        println!("  {} need formatting", format!("{}", needs_format).red());
    }
    println!("  {} failed", format!("{}", failed).red());

    if failed > 0 || needs_format > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn format_file(
    config: &FmtConfig,
    path: &Path,
    scope: Option<&str>,
    project_root: Option<&Path>,
    check: bool,
    show_diff: bool,
) -> Result<FileOutcome> {
    // 1. Pick the scope and resolve its rule
    let scope = match scope {
        Some(s) => s.to_string(),
        None => config
            .scope_for_path(path)
            .ok_or_else(|| anyhow::anyhow!("no configured scope for {}", path.display()))?
            .to_string(),
    };
    let rule = config.resolve(&scope)?;

    // 2. Run the formatter over the file content
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cwd = rule.cwd_mode.resolve(Some(path), project_root);
    let output = run_formatter(&rule.cmd, &content, cwd.as_deref(), rule.timeout())?;

    if output == content {
        return Ok(FileOutcome::Unchanged);
    }

    if show_diff {
        display_diff(path, &content, &output);
    }

    if check {
        return Ok(FileOutcome::WouldChange);
    }

    // 3. Carry the result into the content per the configured merge mode
    let (new_content, detail) = match rule.merge {
        MergeMode::Replace => (output, "replaced".to_string()),
        MergeMode::Diff => {
            let mut buffer = TextBuffer::new(content.clone());
            match merge(&mut buffer, &output, &rule.size_limit())? {
                MergeOutcome::Merged { operations } => {
                    (buffer.into_string(), format!("merged {} edits", operations))
                }
                MergeOutcome::Replaced { cost, limit } => (
                    buffer.into_string(),
                    format!("replaced (diff cost {} over limit {})", cost, limit),
                ),
                MergeOutcome::Unchanged => return Ok(FileOutcome::Unchanged),
            }
        }
    };

    // 4. Atomic in-place write
    atomic_write(path, new_content.as_bytes())?;

    Ok(FileOutcome::Formatted(detail))
}

fn cmd_pipe(config: &FmtConfig, config_path: Option<&Path>, scope: &str) -> Result<()> {
    let rule = config.resolve(scope)?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;

    let root = project_root(config_path);
    let cwd = rule.cwd_mode.resolve(None, root.as_deref());
    let output = run_formatter(&rule.cmd, &input, cwd.as_deref(), rule.timeout())?;

    std::io::stdout()
        .write_all(output.as_bytes())
        .context("failed to write stdout")?;
    Ok(())
}

fn cmd_scopes(config: &FmtConfig, json: bool) -> Result<()> {
    let rules = config.resolved_rules();

    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    if rules.is_empty() {
        println!("{}", "No scopes with a formatter command configured".yellow());
        return Ok(());
    }

    println!("{}", "Configured scopes".bold());
    for rule in rules {
        println!();
        println!("{}", rule.scope.bold());
        println!("  cmd: {}", rule.cmd.join(" "));
        if !rule.extensions.is_empty() {
            println!("  extensions: {}", rule.extensions.join(", "));
        }
        println!("  merge: {}", format!("{:?}", rule.merge).to_lowercase());
        println!(
            "  max_operations: {} ({:?})",
            rule.max_operations, rule.cost_model
        );
        println!("  timeout_ms: {}", rule.timeout_ms);
        println!("  cwd_mode: {}", rule.cwd_mode);
    }

    Ok(())
}

/// Expand the given paths into the list of files to format. Directories
/// recurse; only files with a configured scope are picked up, unless a
/// scope override forces everything.
fn collect_files(
    config: &FmtConfig,
    paths: &[PathBuf],
    scope: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry?;
                if entry.file_type().is_file()
                    && (scope.is_some() || config.scope_for_path(entry.path()).is_some())
                {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            files.push(path.clone());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Show a unified diff between the current and formatted content.
fn display_diff(file: &Path, current: &str, formatted: &str) {
    println!("\n{}", format!("--- {} (current)", file.display()).dimmed());
    println!("{}", format!("+++ {} (formatted)", file.display()).dimmed());

    let diff = TextDiff::from_lines(current, formatted);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the original file is untouched.
fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create tempfile next to {}", path.display()))?;

    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;

    Ok(())
}
