//! Character-level shortest-edit-script diff.
//!
//! The fundamental merge primitive: [`diff`] compares the buffer's current
//! text against freshly formatted output and produces an [`EditScript`] of
//! EQUAL/INSERT/DELETE runs. Downstream stages shrink the script
//! ([`crate::cleanup()`]), gate it ([`crate::guard`]), and replay it against
//! a live buffer ([`crate::apply()`]).
//!
//! The search is the classic Myers greedy diagonal walk: for each candidate
//! edit distance `d`, track the furthest-reached point on every diagonal
//! `k`, sliding through matching runs ("snakes") for free. The first `d`
//! that reaches the end of both strings is the minimal edit distance. The
//! walk is iterative over explicit furthest-reach arrays, one snapshot per
//! `d`, so backtracking never recurses.

use std::fmt;

/// Kind of a single diff operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Text present in both source and target.
    Equal,
    /// Text present only in the target.
    Insert,
    /// Text present only in the source.
    Delete,
}

/// One operation of an edit script: a kind plus a non-empty text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub kind: OpKind,
    pub text: String,
}

impl Op {
    pub fn equal(text: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Equal,
            text: text.into(),
        }
    }

    pub fn insert(text: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Insert,
            text: text.into(),
        }
    }

    pub fn delete(text: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Delete,
            text: text.into(),
        }
    }

    /// True for operations that mutate a buffer when replayed.
    pub fn is_edit(&self) -> bool {
        self.kind != OpKind::Equal
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.kind {
            OpKind::Equal => '=',
            OpKind::Insert => '+',
            OpKind::Delete => '-',
        };
        write!(f, "{}{:?}", sign, self.text)
    }
}

/// An ordered sequence of operations transforming a source text into a
/// target text.
///
/// Scripts are immutable once built. [`EditScript::from_ops`] is the only
/// constructor and normalizes its input so that every script upholds:
///
/// - EQUAL and DELETE payloads concatenate, in order, to the source text;
///   EQUAL and INSERT payloads concatenate to the target text.
/// - No operation has an empty payload.
/// - No two adjacent operations share a kind.
/// - Within a run of edits between two EQUAL runs, deleted text precedes
///   inserted text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditScript {
    ops: Vec<Op>,
}

impl EditScript {
    /// Build a script from raw operations, coalescing them into canonical
    /// form: empty payloads are dropped, maximal same-kind runs are merged,
    /// and DELETE is ordered before INSERT within each edit run.
    pub fn from_ops(ops: Vec<Op>) -> Self {
        let mut merged: Vec<Op> = Vec::with_capacity(ops.len());
        let mut equal = String::new();
        let mut deleted = String::new();
        let mut inserted = String::new();

        for op in ops {
            if op.text.is_empty() {
                continue;
            }
            match op.kind {
                OpKind::Equal => {
                    flush_edits(&mut merged, &mut deleted, &mut inserted);
                    equal.push_str(&op.text);
                }
                OpKind::Delete => {
                    flush_equal(&mut merged, &mut equal);
                    deleted.push_str(&op.text);
                }
                OpKind::Insert => {
                    flush_equal(&mut merged, &mut equal);
                    inserted.push_str(&op.text);
                }
            }
        }
        flush_edits(&mut merged, &mut deleted, &mut inserted);
        flush_equal(&mut merged, &mut equal);

        Self { ops: merged }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    /// Number of operations in the script.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations that mutate a buffer (INSERT and DELETE).
    pub fn edit_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_edit()).count()
    }

    /// Total payload length across all operations, in characters.
    pub fn text_len(&self) -> usize {
        self.ops.iter().map(|op| op.text.chars().count()).sum()
    }

    /// Reconstruct the source text (EQUAL and DELETE payloads).
    pub fn source(&self) -> String {
        self.ops
            .iter()
            .filter(|op| op.kind != OpKind::Insert)
            .map(|op| op.text.as_str())
            .collect()
    }

    /// Reconstruct the target text (EQUAL and INSERT payloads).
    pub fn target(&self) -> String {
        self.ops
            .iter()
            .filter(|op| op.kind != OpKind::Delete)
            .map(|op| op.text.as_str())
            .collect()
    }
}

fn flush_equal(out: &mut Vec<Op>, equal: &mut String) {
    if !equal.is_empty() {
        out.push(Op::equal(std::mem::take(equal)));
    }
}

fn flush_edits(out: &mut Vec<Op>, deleted: &mut String, inserted: &mut String) {
    if !deleted.is_empty() {
        out.push(Op::delete(std::mem::take(deleted)));
    }
    if !inserted.is_empty() {
        out.push(Op::insert(std::mem::take(inserted)));
    }
}

/// Compute a minimal edit script turning `source` into `target`.
///
/// Deterministic: identical inputs always produce an identical script.
/// Identical texts yield a single EQUAL spanning the whole input (an empty
/// script when both are empty). Cost scales with the edit distance, not
/// just the input length; callers bound pathological cases through
/// [`crate::guard::check_size`] rather than here.
pub fn diff(source: &str, target: &str) -> EditScript {
    let src: Vec<char> = source.chars().collect();
    let dst: Vec<char> = target.chars().collect();

    // Matching head and tail are split off before the diagonal walk; the
    // walk cost depends on the differing middle only.
    let prefix = common_prefix(&src, &dst);
    let suffix = common_suffix(&src[prefix..], &dst[prefix..]);

    let mid_src = &src[prefix..src.len() - suffix];
    let mid_dst = &dst[prefix..dst.len() - suffix];

    let mut ops = Vec::new();
    if prefix > 0 {
        ops.push(Op::equal(src[..prefix].iter().collect::<String>()));
    }

    if mid_src.is_empty() {
        if !mid_dst.is_empty() {
            ops.push(Op::insert(mid_dst.iter().collect::<String>()));
        }
    } else if mid_dst.is_empty() {
        ops.push(Op::delete(mid_src.iter().collect::<String>()));
    } else {
        ops.extend(myers(mid_src, mid_dst));
    }

    if suffix > 0 {
        ops.push(Op::equal(src[src.len() - suffix..].iter().collect::<String>()));
    }

    EditScript::from_ops(ops)
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Greedy diagonal search over the edit graph of `a` against `b`.
///
/// Requires both slices non-empty. Records one furthest-reach snapshot per
/// edit distance so the path can be rebuilt without recursion.
fn myers(a: &[char], b: &[char]) -> Vec<Op> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    let offset = max;

    // v[k + offset] holds the furthest x reached on diagonal k = x - y.
    let mut v = vec![0isize; (2 * max + 1) as usize];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            // Step down (insert) when forced to, or when the diagonal below
            // has reached further; otherwise step right (delete).
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    backtrack(a, b, &trace)
}

/// Rebuild the operation sequence by walking the recorded furthest-reach
/// snapshots from (n, m) back to (0, 0).
fn backtrack(a: &[char], b: &[char], trace: &[Vec<isize>]) -> Vec<Op> {
    let offset = (a.len() + b.len()) as isize;
    let mut x = a.len() as isize;
    let mut y = b.len() as isize;

    // Steps are collected in reverse, then grouped into payload runs.
    let mut steps: Vec<(OpKind, char)> = Vec::new();

    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let idx = (k + offset) as usize;

        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            steps.push((OpKind::Equal, a[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }

        if d > 0 {
            if x == prev_x {
                steps.push((OpKind::Insert, b[prev_y as usize]));
            } else {
                steps.push((OpKind::Delete, a[prev_x as usize]));
            }
        }

        x = prev_x;
        y = prev_y;
    }

    let mut ops: Vec<Op> = Vec::new();
    for (kind, ch) in steps.into_iter().rev() {
        match ops.last_mut() {
            Some(op) if op.kind == kind => op.text.push(ch),
            _ => ops.push(Op {
                kind,
                text: ch.to_string(),
            }),
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(script: &EditScript, source: &str, target: &str) {
        assert_eq!(script.source(), source, "source reconstruction");
        assert_eq!(script.target(), target, "target reconstruction");
        for op in script.ops() {
            assert!(!op.text.is_empty(), "empty payload in {:?}", script);
        }
        for window in script.ops().windows(2) {
            assert_ne!(
                window[0].kind, window[1].kind,
                "adjacent ops share a kind in {:?}",
                script
            );
        }
    }

    #[test]
    fn test_identical_inputs_single_equal() {
        let script = diff("abc", "abc");
        assert_eq!(script.ops(), &[Op::equal("abc")]);
        assert_invariants(&script, "abc", "abc");
    }

    #[test]
    fn test_both_empty() {
        let script = diff("", "");
        assert!(script.is_empty());
    }

    #[test]
    fn test_insert_into_empty() {
        let script = diff("", "abc");
        assert_eq!(script.ops(), &[Op::insert("abc")]);
    }

    #[test]
    fn test_delete_to_empty() {
        let script = diff("abc", "");
        assert_eq!(script.ops(), &[Op::delete("abc")]);
    }

    #[test]
    fn test_disjoint_inputs_delete_before_insert() {
        let script = diff("foo", "bar");
        assert_eq!(script.ops(), &[Op::delete("foo"), Op::insert("bar")]);
        assert_invariants(&script, "foo", "bar");
    }

    #[test]
    fn test_common_prefix_and_suffix() {
        let script = diff("hello world", "hello there");
        assert_invariants(&script, "hello world", "hello there");
        assert_eq!(script.ops()[0], Op::equal("hello "));
        // The trailing common run ("l" of world/there is not shared; only
        // what actually matches may appear as a suffix EQUAL).
        assert!(script.edit_count() >= 2);
    }

    #[test]
    fn test_interleaved_small_edits() {
        let script = diff("a-b-c", "abc");
        assert_invariants(&script, "a-b-c", "abc");
        // Minimal distance: exactly two single-char deletions.
        assert_eq!(script.edit_count(), 2);
        assert_eq!(
            script.ops().iter().filter(|op| op.kind == OpKind::Delete).count(),
            2
        );
    }

    #[test]
    fn test_multibyte_payloads() {
        let script = diff("héllo wörld", "héllo wørld");
        assert_invariants(&script, "héllo wörld", "héllo wørld");
    }

    #[test]
    fn test_emoji_replacement() {
        let script = diff("a🚀b", "a👀b");
        assert_invariants(&script, "a🚀b", "a👀b");
        assert_eq!(script.edit_count(), 2);
    }

    #[test]
    fn test_deterministic() {
        let a = "fn main() {\n    println!(\"hi\");\n}\n";
        let b = "fn main() {\n\tprintln!(\"hi\");\n}\n";
        assert_eq!(diff(a, b), diff(a, b));
    }

    #[test]
    fn test_line_ending_churn() {
        let a = "one\ntwo\nthree\n";
        let b = "one\r\ntwo\r\nthree\r\n";
        let script = diff(a, b);
        assert_invariants(&script, a, b);
    }

    #[test]
    fn test_from_ops_drops_empty_payloads() {
        let script = EditScript::from_ops(vec![
            Op::equal(""),
            Op::delete("a"),
            Op::insert(""),
            Op::equal("b"),
        ]);
        assert_eq!(script.ops(), &[Op::delete("a"), Op::equal("b")]);
    }

    #[test]
    fn test_from_ops_merges_runs_and_orders_edits() {
        let script = EditScript::from_ops(vec![
            Op::insert("x"),
            Op::delete("a"),
            Op::delete("b"),
            Op::insert("y"),
            Op::equal("k"),
            Op::equal("l"),
        ]);
        assert_eq!(
            script.ops(),
            &[Op::delete("ab"), Op::insert("xy"), Op::equal("kl")]
        );
    }

    #[test]
    fn test_edit_count_and_text_len() {
        let script = EditScript::from_ops(vec![
            Op::equal("ab"),
            Op::delete("c"),
            Op::insert("de"),
        ]);
        assert_eq!(script.len(), 3);
        assert_eq!(script.edit_count(), 2);
        assert_eq!(script.text_len(), 5);
    }
}
