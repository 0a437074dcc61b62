//! Format-and-merge orchestration.
//!
//! Ties the pure stages together: diff the buffer snapshot against the
//! formatter's output, shrink the script, gate it, then either replay it
//! incrementally or replace the whole content. The plan phase never touches
//! the sink and may run on any thread; only [`PreparedMerge::apply_to`] and
//! [`merge`] mutate, and they take the sink by exclusive borrow, so the
//! handoff to whatever context owns the live buffer is enforced by the type
//! system rather than by convention.

use crate::apply::{apply, MergeError, TextSink};
use crate::cleanup::cleanup;
use crate::diff::{diff, EditScript};
use crate::guard::{check_size, SizeLimit, TooManyOperations};
use xxhash_rust::xxh3::xxh3_64;

/// Spans longer than this are remembered by hash rather than by copy.
const VERIFY_COPY_MAX: usize = 1024;

/// Identity of the source snapshot a diff was computed against, checked
/// against the live sink immediately before replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceVerification {
    /// Exact text match required.
    ExactMatch(String),
    /// xxh3 hash of the expected text (cheaper to hold for large buffers).
    Hash { hash: u64, len: usize },
}

impl SourceVerification {
    /// Create verification from text, using a hash for text over 1 KiB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > VERIFY_COPY_MAX {
            SourceVerification::Hash {
                hash: xxh3_64(text.as_bytes()),
                len: text.len(),
            }
        } else {
            SourceVerification::ExactMatch(text.to_string())
        }
    }

    /// Check if the provided text matches the recorded snapshot.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            SourceVerification::ExactMatch(expected) => text == expected,
            SourceVerification::Hash { hash, len } => {
                text.len() == *len && xxh3_64(text.as_bytes()) == *hash
            }
        }
    }

    /// Byte length of the recorded snapshot.
    pub fn len(&self) -> usize {
        match self {
            SourceVerification::ExactMatch(expected) => expected.len(),
            SourceVerification::Hash { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a formatted result will be carried into the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePlan {
    /// Replay the script operation by operation.
    Incremental(EditScript),
    /// The script is too expensive; replace the whole content.
    Replace(TooManyOperations),
}

/// Compute the merge plan for carrying `target` into a buffer currently
/// holding `source`. Pure; safe to run off the buffer-owning thread.
pub fn plan(source: &str, target: &str, limit: &SizeLimit) -> MergePlan {
    let script = cleanup(&diff(source, target));
    match check_size(script, limit) {
        Ok(script) => MergePlan::Incremental(script),
        Err(too_many) => MergePlan::Replace(too_many),
    }
}

/// Result of a completed merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "MergeOutcome should be checked to report how the buffer was updated"]
pub enum MergeOutcome {
    /// The script replayed cleanly; `operations` buffer mutations ran.
    Merged { operations: usize },
    /// The size guard tripped and the whole content was replaced.
    Replaced { cost: usize, limit: usize },
    /// Formatter output was identical to the buffer; nothing was touched.
    Unchanged,
}

/// A merge computed against a snapshot, to be applied later on the context
/// that owns the sink.
///
/// The snapshot's identity travels with the plan; `apply_to` re-verifies it
/// against the live content before the first mutation, so a buffer that
/// changed between planning and replay is reported, not corrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMerge {
    source: SourceVerification,
    target: String,
    plan: MergePlan,
}

impl PreparedMerge {
    pub fn new(source: &str, target: &str, limit: &SizeLimit) -> Self {
        Self {
            source: SourceVerification::from_text(source),
            target: target.to_string(),
            plan: plan(source, target, limit),
        }
    }

    pub fn plan(&self) -> &MergePlan {
        &self.plan
    }

    /// Verify the sink still matches the snapshot, then carry out the plan.
    pub fn apply_to<S: TextSink + ?Sized>(self, sink: &mut S) -> Result<MergeOutcome, MergeError> {
        let len = sink.len();
        let live = sink.slice(0, len).ok_or(MergeError::SpanOutOfBounds {
            start: 0,
            end: len,
            len,
        })?;
        if !self.source.matches(live) {
            return Err(MergeError::SourceChanged {
                expected_len: self.source.len(),
                found_len: len,
            });
        }

        match self.plan {
            MergePlan::Incremental(script) if script.edit_count() == 0 => {
                Ok(MergeOutcome::Unchanged)
            }
            MergePlan::Incremental(script) => {
                let operations = script.edit_count();
                apply(sink, script, 0)?;
                Ok(MergeOutcome::Merged { operations })
            }
            MergePlan::Replace(too_many) => {
                replace_all(sink, &self.target);
                Ok(MergeOutcome::Replaced {
                    cost: too_many.cost,
                    limit: too_many.limit,
                })
            }
        }
    }
}

/// Merge `target` into `sink` in one step: snapshot, plan, replay (or
/// replace when the guard trips).
pub fn merge<S: TextSink + ?Sized>(
    sink: &mut S,
    target: &str,
    limit: &SizeLimit,
) -> Result<MergeOutcome, MergeError> {
    let len = sink.len();
    let source = match sink.slice(0, len) {
        Some(text) => text.to_string(),
        None => {
            return Err(MergeError::SpanOutOfBounds {
                start: 0,
                end: len,
                len,
            })
        }
    };

    if source == target {
        return Ok(MergeOutcome::Unchanged);
    }

    PreparedMerge::new(&source, target, limit).apply_to(sink)
}

/// Swap the sink's entire content for `text`.
pub fn replace_all<S: TextSink + ?Sized>(sink: &mut S, text: &str) {
    let len = sink.len();
    if len > 0 {
        sink.erase(0, len);
    }
    if !text.is_empty() {
        sink.insert(0, text);
    }
}
