//! Edit-script replay against a live text sink.
//!
//! The only stage that touches externally owned mutable state. Every span
//! the script claims to know (EQUAL context, DELETE victims) is verified
//! against the live content before any mutation of that span; a divergence
//! aborts the replay with [`MergeError`] instead of corrupting the buffer.
//! Operations applied before a detected mismatch are not rolled back —
//! callers needing atomicity snapshot the sink first, or treat a partial
//! apply plus a reported mismatch as cause to fall back to a full replace.

use crate::diff::{EditScript, OpKind};
use thiserror::Error;

/// A mutable text resource an edit script can be replayed into.
///
/// Offsets are byte positions. `slice` must return `None` for ranges that
/// are out of bounds or fall off a character boundary; the replay treats
/// that as a mismatch, never a panic. `insert` and `erase` are only called
/// with positions the replay has already validated through `slice`.
pub trait TextSink {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slice(&self, start: usize, end: usize) -> Option<&str>;

    fn insert(&mut self, at: usize, text: &str);

    fn erase(&mut self, start: usize, end: usize);
}

/// String-backed sink used by the CLI and tests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl TextSink for TextBuffer {
    fn len(&self) -> usize {
        self.text.len()
    }

    fn slice(&self, start: usize, end: usize) -> Option<&str> {
        self.text.get(start..end)
    }

    fn insert(&mut self, at: usize, text: &str) {
        self.text.insert_str(at, text);
    }

    fn erase(&mut self, start: usize, end: usize) {
        self.text.replace_range(start..end, "");
    }
}

/// Replay failure: the live sink no longer matches the content the script
/// was computed against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error(
        "mismatch between diff source and live content at offset {offset}: \
         expected {expected:?}, found {found:?}"
    )]
    SpanMismatch {
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("span [{start}, {end}) is outside the live content (length {len})")]
    SpanOutOfBounds { start: usize, end: usize, len: usize },

    #[error(
        "live content no longer matches the formatted snapshot \
         (expected {expected_len} bytes, found {found_len})"
    )]
    SourceChanged {
        expected_len: usize,
        found_len: usize,
    },
}

/// Replay `script` into `sink`, starting at `base_offset`.
///
/// The script is consumed: each operation is applied exactly once, in
/// order. A sub-region of the sink can be targeted by passing a non-zero
/// `base_offset`; content before the offset and after the script's span is
/// left untouched. On success the region starting at `base_offset` reads
/// exactly as the script's target text.
pub fn apply<S: TextSink + ?Sized>(
    sink: &mut S,
    script: EditScript,
    base_offset: usize,
) -> Result<(), MergeError> {
    let mut cursor = base_offset;

    for op in script.into_ops() {
        let span = op.text.len();
        match op.kind {
            OpKind::Equal => {
                check_span(sink, cursor, &op.text)?;
                cursor += span;
            }
            OpKind::Insert => {
                // An insertion point is a zero-width span; validating it
                // catches a sink that shrank or shifted under us.
                if sink.slice(cursor, cursor).is_none() {
                    return Err(MergeError::SpanOutOfBounds {
                        start: cursor,
                        end: cursor,
                        len: sink.len(),
                    });
                }
                sink.insert(cursor, &op.text);
                cursor += span;
            }
            OpKind::Delete => {
                check_span(sink, cursor, &op.text)?;
                sink.erase(cursor, cursor + span);
                // Cursor stays: following content shifts left into place.
            }
        }
    }

    Ok(())
}

fn check_span<S: TextSink + ?Sized>(
    sink: &S,
    start: usize,
    expected: &str,
) -> Result<(), MergeError> {
    let end = start + expected.len();
    match sink.slice(start, end) {
        Some(found) if found == expected => Ok(()),
        Some(found) => Err(MergeError::SpanMismatch {
            offset: start,
            expected: expected.to_string(),
            found: found.to_string(),
        }),
        None => Err(MergeError::SpanOutOfBounds {
            start,
            end,
            len: sink.len(),
        }),
    }
}
