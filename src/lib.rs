//! Fmt Merge: external formatter runner with diff-based buffer merge
//!
//! Pipes text through an external code formatter and carries the result
//! back into the original content as a small set of verified edits instead
//! of a wholesale replace, so a live buffer keeps its undo granularity,
//! selections, and scroll position.
//!
//! # Architecture
//!
//! The core is a four-stage pipeline over two immutable strings:
//!
//! 1. [`diff()`] computes a minimal edit script (Myers greedy diagonal
//!    walk).
//! 2. [`cleanup()`] folds insignificant equal runs into neighboring edits,
//!    trading minimality for fewer discrete buffer mutations.
//! 3. [`check_size`] gates the script against a configured cost limit;
//!    tripping it means "do a full replace instead", not failure.
//! 4. [`apply()`] replays the script into a [`TextSink`], verifying every
//!    claimed span against live content before touching it.
//!
//! Everything around the pipeline is plumbing: [`runner`] spawns the
//! formatter process, [`config`] resolves per-scope commands and limits,
//! and [`mod@merge`] ties the stages together with snapshot verification.
//!
//! # Safety
//!
//! - Every EQUAL/DELETE span is compared against the live sink before any
//!   mutation of that span; divergence aborts with a mismatch report.
//! - Prepared merges re-verify the whole snapshot (exact or xxh3) before
//!   the first mutation.
//! - Pathologically large scripts fall back to whole-content replacement.
//! - File writes in the CLI are atomic (tempfile + fsync + rename).
//!
//! # Example
//!
//! ```
//! use fmt_merge::{apply, check_size, cleanup, diff, SizeLimit, TextBuffer};
//!
//! let before = "hello world";
//! let after = "hello there";
//!
//! let script = cleanup(&diff(before, after));
//! let script = check_size(script, &SizeLimit::edit_ops(100)).expect("small edit");
//!
//! let mut buffer = TextBuffer::new(before);
//! apply(&mut buffer, script, 0).expect("buffer unchanged since diff");
//! assert_eq!(buffer.as_str(), after);
//! ```

pub mod apply;
pub mod cleanup;
pub mod config;
pub mod diff;
pub mod guard;
pub mod merge;
pub mod runner;

// Re-exports
pub use apply::{apply, MergeError, TextBuffer, TextSink};
pub use cleanup::cleanup;
pub use config::{
    find_config_file, load_from_path, load_from_str, ConfigError, FmtConfig, MergeMode,
    ResolveError, ResolvedRule,
};
pub use diff::{diff, EditScript, Op, OpKind};
pub use guard::{check_size, CostModel, SizeLimit, TooManyOperations};
pub use merge::{
    merge, plan, replace_all, MergeOutcome, MergePlan, PreparedMerge, SourceVerification,
};
pub use runner::{run_formatter, CwdMode, RunnerError};
